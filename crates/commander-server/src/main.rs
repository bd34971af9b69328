use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use commander_core::HostConfig;
use commander_server::{AuthConfig, CommanderServer, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "commander-server")]
#[command(author, version, about, long_about = None)]
struct ServerArgs {
    /// TCP address to listen on.
    #[arg(long, default_value = "127.0.0.1:8374")]
    listen: SocketAddr,

    /// Account name for HTTP basic auth on /auth.
    #[arg(long)]
    username: Option<String>,

    /// Password for HTTP basic auth on /auth.
    #[arg(long)]
    password: Option<String>,

    /// Pre-shared bearer token accepted on /auth.
    #[arg(long)]
    api_token: Option<String>,

    /// Docker binary to invoke (skips `which docker` discovery).
    #[arg(long)]
    docker_binary: Option<PathBuf>,

    /// Parent directory for per-session temp directories.
    #[arg(long)]
    temp_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "commander_server=info,commander_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = ServerArgs::parse();
    if args.username.is_some() != args.password.is_some() {
        anyhow::bail!("--username and --password must be given together");
    }

    let config = ServerConfig {
        listen: args.listen,
        auth: AuthConfig {
            username: args.username,
            password: args.password,
            api_token: args.api_token,
        },
        host: HostConfig {
            docker_binary: args.docker_binary,
            temp_root: args.temp_root,
        },
    };

    CommanderServer::new(config).run().await?;
    Ok(())
}
