//! End-to-end tests: a real TCP endpoint on one side, a
//! `RemoteDockerHost` on the other, with the stub docker underneath.
//! Exercises the credential exchange, offset-based output replication,
//! readiness on mirror streams, and exit propagation.

mod common;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use commander_core::{
    DockerHost, OutputOptions, ProcessOutput, RemoteDockerHost, RunOptions,
};
use commander_server::AuthConfig;

use common::{recorded, server_with_auth};

struct RemoteFixture {
    remote: RemoteDockerHost,
    state_dir: PathBuf,
    _dir: tempfile::TempDir,
}

async fn remote_fixture() -> RemoteFixture {
    let server = server_with_auth(AuthConfig {
        username: None,
        password: None,
        api_token: Some("secret".to_string()),
    })
    .await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr: SocketAddr = listener.local_addr().expect("addr");
    let app = server.app.clone();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    let remote = RemoteDockerHost::with_bearer(format!("http://{addr}"), "secret")
        .expect("remote host");

    RemoteFixture {
        remote,
        state_dir: server.state_dir.clone(),
        _dir: server._dir,
    }
}

#[tokio::test]
async fn initialize_and_check_daemon_round_trip() {
    let fx = remote_fixture().await;
    assert!(fx.remote.initialize().await.expect("initialize"));
    assert!(fx.remote.check_daemon().await.expect("check_daemon"));
}

#[tokio::test]
async fn wrong_bearer_is_rejected() {
    let server = server_with_auth(AuthConfig {
        username: None,
        password: None,
        api_token: Some("secret".to_string()),
    })
    .await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = server.app.clone();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    let remote =
        RemoteDockerHost::with_bearer(format!("http://{addr}"), "wrong").expect("remote host");
    let err = remote.initialize().await.expect_err("must be rejected");
    assert!(err.to_string().contains("authentication failed"));
}

#[tokio::test]
async fn command_output_replicates_with_matching_decomposition() {
    let fx = remote_fixture().await;

    let options = OutputOptions {
        limit: Some(3),
        ..OutputOptions::default()
    };
    let process = fx
        .remote
        .command("spam", &[], options)
        .await
        .expect("command")
        .expect("process");

    assert_eq!(process.wait_exit(None).await, Some(0));

    // Both sides held five lines in a three-entry window; the mirror's
    // decomposition matches the server's.
    let stdout = process.stdout_lines().expect("line mode");
    assert_eq!(stdout, vec!["line 3", "line 4", "line 5"]);
    match process.output() {
        ProcessOutput::Lines { stdout, .. } => {
            assert_eq!(stdout.entries_removed(), 2);
            assert_eq!(stdout.logical_length(), 5);
        }
        ProcessOutput::Bytes { .. } => panic!("expected line mode"),
    }
}

#[tokio::test]
async fn exec_inside_remote_container_captures_output() {
    let fx = remote_fixture().await;

    let process = fx
        .remote
        .exec(
            "known",
            "echo",
            &["hi".to_string()],
            OutputOptions::default(),
        )
        .await
        .expect("exec")
        .expect("process");

    assert_eq!(process.wait_exit(None).await, Some(0));
    assert_eq!(process.stdout_lines().expect("line mode"), vec!["hi"]);
    assert_eq!(process.container_name(), Some("known"));
}

#[tokio::test]
async fn exec_on_stopped_remote_container_is_none() {
    let fx = remote_fixture().await;

    let process = fx
        .remote
        .exec(
            "absent",
            "echo",
            &["hi".to_string()],
            OutputOptions::default(),
        )
        .await
        .expect("exec");
    assert!(process.is_none());
}

#[tokio::test]
async fn stderr_tail_is_drained_before_exit_resolves() {
    let fx = remote_fixture().await;

    let process = fx
        .remote
        .command("fail", &[], OutputOptions::default())
        .await
        .expect("command")
        .expect("process");

    assert_eq!(process.wait_exit(Some(0)).await, None);
    assert_eq!(process.wait_exit(None).await, Some(7));
    assert_eq!(process.stderr_lines().expect("line mode"), vec!["boom"]);
}

#[tokio::test]
async fn run_through_remote_resolves_on_marker() {
    let fx = remote_fixture().await;

    let mut options = RunOptions::image("svc");
    options.name = Some("c1".to_string());
    options.output = OutputOptions::stdout_marker(|line| line.contains("ready marker"));

    let runner = fx
        .remote
        .run(options)
        .await
        .expect("run")
        .expect("runner");

    assert!(runner.is_running());
    assert!(runner.exit_code().is_none());
    assert_eq!(runner.id(), Some("0123456789abcdef"));
    assert_eq!(runner.container_name(), "c1");
    assert!(fx
        .remote
        .runner_by_instance_id(runner.instance_id())
        .is_some());

    assert_eq!(runner.wait_exit(None).await, Some(0));
    let stdout = runner.process().stdout_lines().expect("line mode");
    assert!(stdout.contains(&"starting".to_string()));
}

#[tokio::test]
async fn failed_remote_run_is_none() {
    let fx = remote_fixture().await;

    let mut options = RunOptions::image("missing-image");
    options.name = Some("gone".to_string());
    let runner = fx.remote.run(options).await.expect("run");
    assert!(runner.is_none());
}

#[tokio::test]
async fn stop_through_remote_floors_grace_period() {
    let fx = remote_fixture().await;

    let stopped = fx
        .remote
        .stop_by_name("x", Some(Duration::from_secs(0)))
        .await
        .expect("stop");
    assert!(stopped);
    assert_eq!(
        recorded(&fx.state_dir, "stop-args").trim(),
        "stop --time 1 x"
    );
}

#[tokio::test]
async fn container_id_lookup_through_remote() {
    let fx = remote_fixture().await;

    assert_eq!(
        fx.remote
            .container_id_by_name("known")
            .await
            .expect("lookup"),
        Some("cafebabe1234".to_string())
    );
    assert_eq!(
        fx.remote.container_id_by_name("nope").await.expect("lookup"),
        None
    );
}
