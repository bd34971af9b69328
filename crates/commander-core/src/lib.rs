//! # commander-core
//!
//! Supervision of docker containers and the processes inside them, local
//! or remote, behind one capability trait.
//!
//! - [`LocalDockerHost`] shells out to the `docker` binary and pumps child
//!   stdio into bounded, ready-latched [`OutputStream`]s.
//! - [`RemoteDockerHost`] speaks a small GET/JSON dialect to a peer and
//!   replicates process output into local mirror streams by offset-based
//!   polling with adaptive back-off.
//!
//! A [`Runner`] is a supervised container; a [`Process`] is any supervised
//! command execution (a container's client process, a `docker exec`, or a
//! plain CLI invocation). Callers pick a readiness criterion — typically a
//! marker line on stdout or stderr — and `run`/`exec`/`command` resolve
//! once it is met.
//!
//! ```rust,no_run
//! use commander_core::{HostConfig, LocalDockerHost, OutputOptions, RunOptions};
//!
//! # async fn example() -> commander_core::Result<()> {
//! let host = LocalDockerHost::new(HostConfig::default())?;
//! host.initialize().await?;
//!
//! let mut options = RunOptions::image("postgres");
//! options.version = Some("latest".to_string());
//! options.env = vec![("POSTGRES_PASSWORD".to_string(), "p".to_string())];
//! options.output =
//!     OutputOptions::stdout_marker(|line| line.contains("ready to accept connections"));
//!
//! if let Some(runner) = host.run(options).await? {
//!     assert!(runner.is_running());
//!     runner.stop(None).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod local;
pub mod network;
pub mod ports;
pub mod process;
pub mod remote;
pub mod rpc;
pub mod runner;
pub mod stream;

pub use config::HostConfig;
pub use error::{CoreError, Result};
pub use host::{CreateOptions, DockerHost, HostMapping, RunOptions};
pub use local::LocalDockerHost;
pub use network::{NetworkPeer, NetworkRegistry};
pub use ports::normalize_ports;
pub use process::{LineReadyFn, OutputOptions, OutputReadyType, Process, ProcessOutput};
pub use remote::{Credentials, RemoteDockerHost, ACCESS_TOKEN_HEADER};
pub use runner::{ContainerInfo, Runner, DEFAULT_STOP_TIMEOUT};
pub use stream::{OutputStream, ReadyFn, ReadyLatch};
