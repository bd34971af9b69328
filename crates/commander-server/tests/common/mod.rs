//! Shared test fixture: a control-plane router wrapping a local host whose
//! `docker` binary is a stub shell script.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use commander_core::{HostConfig, LocalDockerHost, ACCESS_TOKEN_HEADER};
use commander_server::{create_router, AuthConfig};
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const STUB_DOCKER: &str = r#"#!/bin/sh
STATE="$(dirname "$0")/state"
mkdir -p "$STATE"
cmd="$1"; shift
case "$cmd" in
  ps)
    filter=""
    for a in "$@"; do case "$a" in name=*) filter="${a#name=}";; esac; done
    case "$filter" in
      known*|c1*) echo "cafebabe1234" ;;
      *) : ;;
    esac
    exit 0
    ;;
  version) echo "docker version 99.9"; exit 0 ;;
  spam) for i in 1 2 3 4 5; do echo "line $i"; done; exit 0 ;;
  fail) echo "boom" >&2; exit 7 ;;
  exec)
    name="$1"; shift
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

pub struct TestServer {
    pub app: Router,
    pub state_dir: PathBuf,
    pub _dir: tempfile::TempDir,
}

/// Builds a router over a stub-docker host, with the given credentials.
pub async fn server_with_auth(auth: AuthConfig) -> TestServer {
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

    TestServer {
        app: create_router(host, auth),
        state_dir: dir.path().join("state"),
        _dir: dir,
    }
}

/// One GET against the router, returning status and parsed JSON body.
pub async fn get_json(
    app: &Router,
    token: Option<&str>,
    uri: &str,
) -> (StatusCode, serde_json::Value) {
    let mut request = Request::builder().uri(uri);
    if let Some(token) = token {
        request = request.header(ACCESS_TOKEN_HEADER, token);
    }

    let response = app
        .clone()
        .oneshot(request.body(Body::empty()).expect("request"))
        .await
        .expect("response");

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Exchanges for a session token on an open-auth server.
pub async fn session_token(app: &Router) -> String {
    let (status, token) = get_json(app, None, "/auth").await;
    assert_eq!(status, StatusCode::OK);
    token.as_str().expect("token string").to_string()
}

pub fn recorded(state_dir: &Path, file: &str) -> String {
    std::fs::read_to_string(state_dir.join(file)).unwrap_or_default()
}
