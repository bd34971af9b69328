//! Request handlers for the control-plane endpoints.
//!
//! Every endpoint is a GET with query-string parameters and a JSON
//! response, mirroring what the remote client backend sends. List
//! parameters arrive as JSON arrays, maps as comma-joined `key=value`
//! pairs, ports comma-joined.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use commander_core::rpc::{
    decode_list, decode_map, CommandReply, CreateReply, ExecReply, OutputChunk, OutputEntries,
    RunReply,
};
use commander_core::{
    CreateOptions, OutputOptions, Process, ProcessOutput, RunOptions,
};
use serde::Deserialize;

use crate::api::AppState;
use crate::error::{Result, ServerError};

/// Exchanges a credential for a session token.
pub async fn auth(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<String>> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    match state.auth.exchange(authorization).await {
        Some(token) => Ok(Json(token)),
        None => Err(ServerError::Unauthorized),
    }
}

/// Initializes the wrapped host (docker binary discovery).
pub async fn initialize(State(state): State<AppState>) -> Result<Json<bool>> {
    Ok(Json(state.host.initialize().await?))
}

/// Checks whether the docker daemon answers.
pub async fn check_daemon(State(state): State<AppState>) -> Result<Json<bool>> {
    Ok(Json(state.host.check_daemon().await?))
}

/// Sweeps the wrapped host's temp directory.
pub async fn close(State(state): State<AppState>) -> Result<Json<bool>> {
    state.host.close().await?;
    Ok(Json(true))
}

/// Container name lookup query.
#[derive(Debug, Deserialize)]
pub struct NameQuery {
    /// Container name.
    pub name: String,
}

/// Looks up a container ID by name; empty string when unknown.
pub async fn id_by_name(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Result<Json<String>> {
    let id = state.host.container_id_by_name(&query.name).await?;
    Ok(Json(id.unwrap_or_default()))
}

/// `/run` and `/create` query parameters.
#[derive(Debug, Deserialize)]
pub struct RunQuery {
    /// Image name.
    pub image: String,
    /// Image version.
    pub version: Option<String>,
    /// Container name.
    pub name: Option<String>,
    /// Comma-joined port mappings.
    pub ports: Option<String>,
    /// Network to join.
    pub network: Option<String>,
    /// Hostname inside the network.
    pub hostname: Option<String>,
    /// Comma-joined `key=value` environment entries.
    pub environment: Option<String>,
    /// Comma-joined `host=container` volume entries.
    pub volumes: Option<String>,
    /// Pass `--rm`.
    #[serde(rename = "cleanContainer")]
    pub clean_container: Option<bool>,
    /// JSON array of trailing image arguments (`/run` only).
    #[serde(rename = "imageArgs")]
    pub image_args: Option<String>,
    /// Capture decoded lines (default) instead of raw bytes.
    #[serde(rename = "outputAsLines")]
    pub output_as_lines: Option<bool>,
    /// Retained-history capacity override.
    #[serde(rename = "outputLimit")]
    pub output_limit: Option<usize>,
}

fn output_options(as_lines: Option<bool>, limit: Option<usize>) -> OutputOptions {
    OutputOptions {
        as_bytes: !as_lines.unwrap_or(true),
        limit,
        ..OutputOptions::default()
    }
}

fn split_ports(ports: Option<String>) -> Vec<String> {
    ports
        .map(|joined| {
            joined
                .split(',')
                .filter(|port| !port.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Starts and supervises a container.
pub async fn run(
    State(state): State<AppState>,
    Query(query): Query<RunQuery>,
) -> Result<Json<Option<RunReply>>> {
    let options = RunOptions {
        image: query.image,
        version: query.version,
        name: query.name,
        ports: split_ports(query.ports),
        network: query.network,
        hostname: query.hostname,
        env: query.environment.as_deref().map(decode_map).unwrap_or_default(),
        volumes: query.volumes.as_deref().map(decode_map).unwrap_or_default(),
        image_args: query
            .image_args
            .as_deref()
            .map(decode_list)
            .unwrap_or_default(),
        clean_container: query.clean_container.unwrap_or(true),
        output: output_options(query.output_as_lines, query.output_limit),
    };

    let runner = state.host.run(options).await?;
    Ok(Json(runner.map(|runner| RunReply {
        instance_id: runner.instance_id(),
        container_name: runner.container_name().to_string(),
        id: runner.id().map(str::to_string),
    })))
}

/// Creates a container without starting it.
pub async fn create(
    State(state): State<AppState>,
    Query(query): Query<RunQuery>,
) -> Result<Json<Option<CreateReply>>> {
    let options = CreateOptions {
        image: query.image,
        version: query.version,
        name: query.name,
        ports: split_ports(query.ports),
        network: query.network,
        hostname: query.hostname,
        env: query.environment.as_deref().map(decode_map).unwrap_or_default(),
        volumes: query.volumes.as_deref().map(decode_map).unwrap_or_default(),
        // The public create surface defaults to keeping the container.
        clean_container: query.clean_container.unwrap_or(false),
    };

    let info = state.host.create_container(options).await?;
    Ok(Json(info.map(|info| CreateReply {
        container_name: info.container_name,
        id: info.id,
        image: info.image,
        ports: info.ports,
        network: info.network,
        hostname: info.hostname,
    })))
}

/// `/exec` query parameters.
#[derive(Debug, Deserialize)]
pub struct ExecQuery {
    /// Command to run.
    pub cmd: String,
    /// JSON array of arguments.
    pub args: Option<String>,
    /// Target container name.
    pub name: String,
    /// Capture decoded lines (default) instead of raw bytes.
    #[serde(rename = "outputAsLines")]
    pub output_as_lines: Option<bool>,
    /// Retained-history capacity override.
    #[serde(rename = "outputLimit")]
    pub output_limit: Option<usize>,
}

/// Executes a command inside a running container.
pub async fn exec(
    State(state): State<AppState>,
    Query(query): Query<ExecQuery>,
) -> Result<Json<Option<ExecReply>>> {
    let args = query.args.as_deref().map(decode_list).unwrap_or_default();
    let output = output_options(query.output_as_lines, query.output_limit);

    let process = state.host.exec(&query.name, &query.cmd, &args, output).await?;
    Ok(Json(process.map(|process| ExecReply {
        instance_id: process.instance_id(),
        container_name: query.name,
    })))
}

/// `/command` query parameters.
#[derive(Debug, Deserialize)]
pub struct CommandQuery {
    /// Docker sub-command to run.
    pub cmd: String,
    /// JSON array of arguments.
    pub args: Option<String>,
    /// Capture decoded lines (default) instead of raw bytes.
    #[serde(rename = "outputAsLines")]
    pub output_as_lines: Option<bool>,
    /// Retained-history capacity override.
    #[serde(rename = "outputLimit")]
    pub output_limit: Option<usize>,
}

/// Runs a plain docker sub-command.
pub async fn command(
    State(state): State<AppState>,
    Query(query): Query<CommandQuery>,
) -> Result<Json<Option<CommandReply>>> {
    let args = query.args.as_deref().map(decode_list).unwrap_or_default();
    let output = output_options(query.output_as_lines, query.output_limit);

    let process = state.host.command(&query.cmd, &args, output).await?;
    Ok(Json(process.map(|process| CommandReply {
        instance_id: process.instance_id(),
    })))
}

/// Output pull query: the instance and the logical index of the next
/// entry the mirror expects.
#[derive(Debug, Deserialize)]
pub struct OutputQuery {
    /// Instance ID.
    #[serde(rename = "instanceID")]
    pub instance_id: u64,
    /// Logical index of the next expected entry.
    #[serde(rename = "realOffset")]
    pub real_offset: u64,
}

/// Serves the stdout channel from the requested offset on.
pub async fn stdout(
    State(state): State<AppState>,
    Query(query): Query<OutputQuery>,
) -> Json<OutputChunk> {
    Json(output_chunk(&state, &query, true))
}

/// Serves the stderr channel from the requested offset on.
pub async fn stderr(
    State(state): State<AppState>,
    Query(query): Query<OutputQuery>,
) -> Json<OutputChunk> {
    Json(output_chunk(&state, &query, false))
}

fn output_chunk(state: &AppState, query: &OutputQuery, want_stdout: bool) -> OutputChunk {
    let Some(process) = state.host.instance_process(query.instance_id) else {
        return OutputChunk::unknown();
    };

    let (removed, entries) = match process.output() {
        ProcessOutput::Lines { stdout, stderr } => {
            let stream = if want_stdout { stdout } else { stderr };
            let (removed, entries) = stream.snapshot_with_offset();
            (removed, EntriesSnapshot::Lines(entries))
        }
        ProcessOutput::Bytes { stdout, stderr } => {
            let stream = if want_stdout { stdout } else { stderr };
            let (removed, entries) = stream.snapshot_with_offset();
            (removed, EntriesSnapshot::Bytes(entries))
        }
    };

    let held = entries.len() as u64;
    let length = removed + held;
    // Entries before the eviction horizon are gone; the reply starts at
    // whichever of (requested offset, horizon) is later.
    let start = query.real_offset.max(removed);
    let skip = (start - removed).min(held) as usize;

    OutputChunk {
        running: process.is_running(),
        length: Some(length),
        removed: Some(removed),
        entries: Some(entries.into_entries(skip)),
    }
}

enum EntriesSnapshot {
    Lines(Vec<String>),
    Bytes(Vec<u8>),
}

impl EntriesSnapshot {
    fn len(&self) -> usize {
        match self {
            Self::Lines(lines) => lines.len(),
            Self::Bytes(bytes) => bytes.len(),
        }
    }

    fn into_entries(self, skip: usize) -> OutputEntries {
        match self {
            Self::Lines(lines) => OutputEntries::Lines(lines.into_iter().skip(skip).collect()),
            Self::Bytes(bytes) => OutputEntries::Bytes(bytes.into_iter().skip(skip).collect()),
        }
    }
}

/// Instance-scoped query.
#[derive(Debug, Deserialize)]
pub struct InstanceQuery {
    /// Instance ID.
    #[serde(rename = "instanceID")]
    pub instance_id: u64,
}

/// Blocks until the instance's readiness criterion is met.
pub async fn wait_ready(
    State(state): State<AppState>,
    Query(query): Query<InstanceQuery>,
) -> Json<bool> {
    let Some(process) = state.host.instance_process(query.instance_id) else {
        return Json(false);
    };
    process.wait_ready().await;
    Json(true)
}

/// Blocks until the instance exits, then returns its exit code.
pub async fn wait_exit(
    State(state): State<AppState>,
    Query(query): Query<InstanceQuery>,
) -> Result<Json<i32>> {
    let process: Process = state
        .host
        .instance_process(query.instance_id)
        .ok_or(ServerError::UnknownInstance(query.instance_id))?;
    let code = process.wait_exit(None).await.unwrap_or(-1);
    Ok(Json(code))
}

/// `/stop` query parameters.
#[derive(Debug, Deserialize)]
pub struct StopQuery {
    /// Container name.
    pub name: String,
    /// Grace period in seconds.
    pub timeout: Option<u64>,
}

/// Stops a container by name.
pub async fn stop(
    State(state): State<AppState>,
    Query(query): Query<StopQuery>,
) -> Result<Json<bool>> {
    let stopped = state
        .host
        .stop_by_name(&query.name, query.timeout.map(Duration::from_secs))
        .await?;
    Ok(Json(stopped))
}
