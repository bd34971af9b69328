//! Integration tests for the local backend.
//!
//! A stub `docker` shell script stands in for the real CLI: it writes
//! cidfiles, emits output, records the argv it was called with, and plays
//! the roles of `ps`, `exec`, `stop` and `inspect`. This exercises the
//! whole supervision pipeline — spawn, stdio pumps, readiness, exit,
//! registries — without a docker daemon.

use std::path::{Path, PathBuf};
use std::time::Duration;

use commander_core::{
    CreateOptions, HostConfig, LocalDockerHost, OutputOptions, RunOptions,
};

const STUB_DOCKER: &str = r#"#!/bin/sh
STATE="$(dirname "$0")/state"
mkdir -p "$STATE"
cmd="$1"; shift
case "$cmd" in
  ps)
    filter=""
    for a in "$@"; do case "$a" in name=*) filter="${a#name=}";; esac; done
    case "$filter" in
      known*|c1*|c2*) echo "cafebabe1234" ;;
      *) : ;;
    esac
    exit 0
    ;;
  version) echo "docker version 99.9"; exit 0 ;;
  spam) for i in 1 2 3 4 5; do echo "line $i"; done; exit 0 ;;
  bytes) printf 'hi\n'; exit 0 ;;
  fail) echo "boom" >&2; exit 7 ;;
  exec)
    name="$1"; shift
    printf '%s\n' "exec $name $*" >> "$STATE/exec-args"
    case "$1" in
      /bin/sh) exit 0 ;;
      *) "$@"; exit $? ;;
    esac
    ;;
  stop) printf '%s\n' "stop $*" > "$STATE/stop-args"; exit 0 ;;
  inspect) echo "172.18.0.2"; exit 0 ;;
  run|create)
    cidfile=""
    prev=""
    for a in "$@"; do
      case "$prev" in
        --cidfile) cidfile="$a" ;;
      esac
      prev="$a"
    done
    printf '%s\n' "$cmd $*" >> "$STATE/${cmd}-args"
    case "$*" in
      *missing-image*) echo "no such image" >&2; exit 125 ;;
    esac
    [ -n "$cidfile" ] && echo "0123456789abcdef" > "$cidfile"
    if [ "$cmd" = "run" ]; then
      echo "starting"
      echo "service ready marker"
      sleep 1
    fi
    exit 0
    ;;
  *) echo "unknown subcommand: $cmd" >&2; exit 2 ;;
esac
"#;

struct Fixture {
    host: LocalDockerHost,
    state_dir: PathBuf,
    _dir: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let stub = dir.path().join("docker");
    std::fs::write(&stub, STUB_DOCKER).expect("write stub");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755))
            .expect("chmod stub");
    }

    let host = LocalDockerHost::new(HostConfig {
        docker_binary: Some(stub),
        temp_root: Some(dir.path().to_path_buf()),
    })
    .expect("host");
    assert!(host.initialize().await.expect("initialize"));

    Fixture {
        host,
        state_dir: dir.path().join("state"),
        _dir: dir,
    }
}

fn recorded(state_dir: &Path, file: &str) -> String {
    std::fs::read_to_string(state_dir.join(file)).unwrap_or_default()
}

#[tokio::test]
async fn check_daemon_answers() {
    let fx = fixture().await;
    assert!(fx.host.check_daemon().await.expect("check_daemon"));
}

#[tokio::test]
async fn plain_command_captures_stdout_and_exit() {
    let fx = fixture().await;

    let process = fx
        .host
        .command("version", &[], OutputOptions::default())
        .await
        .expect("command")
        .expect("process");

    assert_eq!(process.wait_exit(None).await, Some(0));
    assert_eq!(
        process.stdout_lines().expect("line mode"),
        vec!["docker version 99.9"]
    );
    assert!(process.stderr_lines().expect("line mode").is_empty());
    assert!(!process.is_running());
}

#[tokio::test]
async fn exec_captures_single_line() {
    let fx = fixture().await;

    let process = fx
        .host
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
}

#[tokio::test]
async fn exec_refuses_stopped_container() {
    let fx = fixture().await;

    let process = fx
        .host
        .exec("absent", "echo", &["hi".to_string()], OutputOptions::default())
        .await
        .expect("exec");
    assert!(process.is_none());
}

#[tokio::test]
async fn command_with_limit_evicts_from_front() {
    let fx = fixture().await;

    let options = OutputOptions {
        limit: Some(3),
        ..OutputOptions::default()
    };
    let process = fx
        .host
        .command("spam", &[], options)
        .await
        .expect("command")
        .expect("process");
    assert_eq!(process.wait_exit(None).await, Some(0));

    let stdout = process.stdout_lines().expect("line mode");
    assert_eq!(stdout, vec!["line 3", "line 4", "line 5"]);
    match process.output() {
        commander_core::ProcessOutput::Lines { stdout, .. } => {
            assert_eq!(stdout.entries_removed(), 2);
            assert_eq!(stdout.logical_length(), 5);
            assert_eq!(stdout.capacity(), 3);
        }
        commander_core::ProcessOutput::Bytes { .. } => panic!("expected line mode"),
    }
}

#[tokio::test]
async fn byte_mode_captures_raw_bytes() {
    let fx = fixture().await;

    let options = OutputOptions {
        as_bytes: true,
        ..OutputOptions::default()
    };
    let process = fx
        .host
        .command("bytes", &[], options)
        .await
        .expect("command")
        .expect("process");
    assert_eq!(process.wait_exit(None).await, Some(0));
    assert_eq!(process.stdout_bytes().expect("byte mode"), b"hi\n".to_vec());
    assert!(process.stdout_lines().is_none());
}

#[tokio::test]
async fn wait_exit_desired_mismatch_is_none() {
    let fx = fixture().await;

    let process = fx
        .host
        .command("fail", &[], OutputOptions::default())
        .await
        .expect("command")
        .expect("process");

    assert_eq!(process.wait_exit(Some(0)).await, None);
    assert_eq!(process.wait_exit(None).await, Some(7));
    assert_eq!(
        process.stderr_lines().expect("line mode"),
        vec!["boom"]
    );
}

#[tokio::test]
async fn run_resolves_after_marker_with_id_probed() {
    let fx = fixture().await;

    let mut options = RunOptions::image("postgres");
    options.version = Some("latest".to_string());
    options.env = vec![("POSTGRES_PASSWORD".to_string(), "p".to_string())];
    options.output = OutputOptions::stdout_marker(|line| line.contains("ready marker"));

    let runner = fx
        .host
        .run(options)
        .await
        .expect("run")
        .expect("runner");

    assert!(runner.is_running());
    assert!(runner.exit_code().is_none());
    assert!(runner.is_ready());
    assert_eq!(runner.id(), Some("0123456789abcdef"));
    assert_eq!(runner.image(), "postgres:latest");
    assert!(runner
        .container_name()
        .starts_with(&format!("docker_commander-{}-", fx.host.session_id())));

    let stdout = runner.process().stdout_lines().expect("line mode");
    assert!(stdout.contains(&"starting".to_string()));

    assert_eq!(runner.wait_exit(None).await, Some(0));
    assert!(!runner.is_running());
}

#[tokio::test]
async fn failed_run_resolves_none() {
    let fx = fixture().await;

    let mut options = RunOptions::image("missing-image");
    options.name = Some("gone".to_string());

    let runner = fx.host.run(options).await.expect("run");
    assert!(runner.is_none());
}

#[tokio::test]
async fn run_argv_layout_reaches_docker() {
    let fx = fixture().await;

    let mut options = RunOptions::image("web");
    options.name = Some("c1".to_string());
    options.ports = vec!["80".to_string(), "443:443".to_string(), "80".to_string()];
    options.hostname = Some("h1".to_string());
    options.image_args = vec!["--debug".to_string()];

    let runner = fx.host.run(options).await.expect("run").expect("runner");
    assert_eq!(runner.ports(), ["80:80", "443:443"]);

    let recorded_args = recorded(&fx.state_dir, "run-args");
    assert!(recorded_args.contains("run --name c1 -p 80:80 -p 443:443 -h h1 --rm --cidfile"));
    assert!(recorded_args.trim_end().ends_with("web --debug"));

    runner.wait_exit(None).await;
}

#[tokio::test]
async fn network_peers_get_add_host_flags_and_hosts_patch() {
    let fx = fixture().await;

    let mut first = RunOptions::image("svc");
    first.name = Some("c1".to_string());
    first.network = Some("backend".to_string());
    first.hostname = Some("h1".to_string());
    let r1 = fx.host.run(first).await.expect("run c1").expect("runner c1");
    assert_eq!(r1.ip(), Some("172.18.0.2"));

    let mut second = RunOptions::image("svc");
    second.name = Some("c2".to_string());
    second.network = Some("backend".to_string());
    second.hostname = Some("h2".to_string());
    let r2 = fx.host.run(second).await.expect("run c2").expect("runner c2");

    let run_args = recorded(&fx.state_dir, "run-args");
    let second_line = run_args
        .lines()
        .find(|line| line.contains("--name c2"))
        .expect("second run recorded");
    assert!(second_line.contains("--net backend"));
    assert!(second_line.contains("--add-host h1:172.18.0.2"));

    // The existing peer learns the newcomer through /etc/hosts.
    let exec_args = recorded(&fx.state_dir, "exec-args");
    assert!(exec_args.contains("exec c1 /bin/sh -c echo '172.18.0.2 h2' >> /etc/hosts"));

    r1.wait_exit(None).await;
    r2.wait_exit(None).await;
}

#[tokio::test]
async fn stop_timeout_is_floored_at_one_second() {
    let fx = fixture().await;

    let stopped = fx
        .host
        .stop_by_name("x", Some(Duration::from_millis(0)))
        .await
        .expect("stop");
    assert!(stopped);
    assert_eq!(recorded(&fx.state_dir, "stop-args").trim(), "stop --time 1 x");
}

#[tokio::test]
async fn create_container_probes_id_without_starting() {
    let fx = fixture().await;

    let mut options = CreateOptions::image("alpine");
    options.name = Some("known-create".to_string());
    assert!(!options.clean_container);

    let info = fx
        .host
        .create_container(options)
        .await
        .expect("create")
        .expect("info");

    assert_eq!(info.container_name, "known-create");
    assert_eq!(info.id.as_deref(), Some("0123456789abcdef"));
    assert_eq!(info.image, "alpine");

    let create_args = recorded(&fx.state_dir, "create-args");
    assert!(create_args.contains("create --name known-create --cidfile"));
    assert!(!create_args.contains("--rm"));
}

#[tokio::test]
async fn registries_keep_exited_instances_until_forgotten() {
    let fx = fixture().await;

    let process = fx
        .host
        .command("version", &[], OutputOptions::default())
        .await
        .expect("command")
        .expect("process");
    process.wait_exit(None).await;

    let instance_id = process.instance_id();
    assert!(fx.host.process_by_instance_id(instance_id).is_some());

    fx.host.forget_instance(instance_id);
    assert!(fx.host.process_by_instance_id(instance_id).is_none());
}

#[tokio::test]
async fn container_id_by_name_lookup() {
    let fx = fixture().await;

    assert_eq!(
        fx.host
            .container_id_by_name("known")
            .await
            .expect("lookup"),
        Some("cafebabe1234".to_string())
    );
    assert_eq!(
        fx.host.container_id_by_name("nope").await.expect("lookup"),
        None
    );
}

#[tokio::test]
async fn close_sweeps_the_temp_directory() {
    let fx = fixture().await;

    let session_prefix = format!("docker_commander-{}-", fx.host.session_id());
    let before: Vec<_> = std::fs::read_dir(fx._dir.path())
        .expect("read dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(&session_prefix))
        .collect();
    assert_eq!(before.len(), 1);

    fx.host.close().await.expect("close");

    let after = std::fs::read_dir(fx._dir.path())
        .expect("read dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(&session_prefix))
        .count();
    assert_eq!(after, 0);
}
