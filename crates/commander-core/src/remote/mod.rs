//! Remote docker host backend.
//!
//! Speaks the GET/JSON control-plane dialect to a peer that wraps a local
//! host. Every operation is one HTTP request; process output is not pushed
//! by the peer but *pulled* into local mirror streams by per-channel
//! puller tasks, driving readiness exactly like local output does.

mod puller;

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::RwLock;

use crate::error::{CoreError, Result};
use crate::host::{CreateOptions, DockerHost, HostMapping, RunOptions};
use crate::ports::normalize_ports;
use crate::process::{OutputOptions, Process};
use crate::rpc::{
    encode_list, encode_map, CommandReply, CreateReply, ExecReply, OutputChunk, RunReply,
};
use crate::runner::{ContainerInfo, Runner, RunnerControl};

use puller::{apply_chunk, pull_delay, real_offset, OutputChannel};

/// Header carrying the session bearer token on every call but `/auth`.
pub const ACCESS_TOKEN_HEADER: &str = "X-Access-Token";

/// Credential used to bootstrap a session token via `GET /auth`.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// A pre-shared bearer token.
    Bearer(String),
    /// Username and password, sent as HTTP basic auth.
    Basic {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
}

struct RemoteBackend {
    base_url: String,
    client: reqwest::Client,
    credentials: Credentials,
    token: RwLock<Option<String>>,
    session_id: String,
    runners: StdRwLock<HashMap<u64, Runner>>,
    processes: StdRwLock<HashMap<u64, Process>>,
}

impl RemoteBackend {
    async fn authenticate(&self) -> Result<String> {
        let request = self.client.get(format!("{}/auth", self.base_url));
        let request = match &self.credentials {
            Credentials::Bearer(token) => request.bearer_auth(token),
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::Auth(format!("auth request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(CoreError::Auth(format!(
                "credential exchange rejected: {}",
                response.status()
            )));
        }
        response
            .json::<String>()
            .await
            .map_err(|e| CoreError::Auth(format!("malformed token response: {e}")))
    }

    /// The cached session token, authenticating first when there is none.
    async fn token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        let mut slot = self.token.write().await;
        if let Some(token) = slot.clone() {
            return Ok(token);
        }
        let token = self.authenticate().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    /// One authenticated GET. A 401 drops the cached token, re-auths and
    /// retries once.
    async fn request(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.token().await?;
        let response = self
            .client
            .get(&url)
            .query(query)
            .header(ACCESS_TOKEN_HEADER, token.as_str())
            .send()
            .await
            .map_err(|e| CoreError::Transport(format!("{path} request failed: {e}")))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        self.token.write().await.take();
        let token = self.token().await?;
        self.client
            .get(&url)
            .query(query)
            .header(ACCESS_TOKEN_HEADER, token.as_str())
            .send()
            .await
            .map_err(|e| CoreError::Transport(format!("{path} request failed: {e}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.request(path, query).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Transport(format!("{path} returned {status}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CoreError::Transport(format!("{path} returned malformed JSON: {e}")))
    }

    async fn fetch_output(
        &self,
        channel: OutputChannel,
        instance_id: u64,
        offset: u64,
    ) -> Result<OutputChunk> {
        self.get_json(
            channel.path(),
            &[
                ("instanceID", instance_id.to_string()),
                ("realOffset", offset.to_string()),
            ],
        )
        .await
    }

    async fn rpc_wait_exit(&self, instance_id: u64) -> Result<i32> {
        self.get_json("/wait_exit", &[("instanceID", instance_id.to_string())])
            .await
    }
}

#[async_trait]
impl RunnerControl for RemoteBackend {
    async fn stop_by_name(&self, name: &str, timeout: Option<Duration>) -> Result<bool> {
        let mut query = vec![("name", name.to_string())];
        if let Some(timeout) = timeout {
            query.push(("timeout", timeout.as_secs().to_string()));
        }
        self.get_json("/stop", &query).await
    }
}

/// Replicates one stdio channel of a remote process into its mirror
/// stream. Runs until the peer reports the process gone and the tail is
/// drained, or until three consecutive transport failures.
fn spawn_output_puller(
    backend: Arc<RemoteBackend>,
    process: Process,
    channel: OutputChannel,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let instance_id = process.instance_id();
        let mut empties: u32 = 0;
        let mut errors: u32 = 0;

        loop {
            let offset = real_offset(&process, channel);
            match backend.fetch_output(channel, instance_id, offset).await {
                Err(e) => {
                    errors += 1;
                    tracing::warn!(
                        instance = instance_id,
                        channel = ?channel,
                        consecutive = errors,
                        "output poll failed: {e}"
                    );
                    if errors >= 3 {
                        break;
                    }
                    tokio::time::sleep(pull_delay(empties)).await;
                    empties = empties.saturating_add(1);
                }
                Ok(chunk) => {
                    errors = 0;
                    let appended = apply_chunk(&process, channel, &chunk);
                    if appended > 0 {
                        empties = 0;
                    }
                    if appended == 0 && (!chunk.running || process.exit_code().is_some()) {
                        break;
                    }
                    if !chunk.running {
                        // The peer exited; drain the tail without sleeping.
                        continue;
                    }
                    tokio::time::sleep(pull_delay(empties)).await;
                    if appended == 0 {
                        empties = empties.saturating_add(1);
                    }
                }
            }
        }
    })
}

/// Control plane for a docker daemon behind a remote endpoint.
///
/// Cloning yields a handle to the same proxy; the token cache and mirror
/// registries are shared.
#[derive(Clone)]
pub struct RemoteDockerHost {
    inner: Arc<RemoteBackend>,
}

impl RemoteDockerHost {
    /// Creates a proxy talking to `base_url` with the given credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .user_agent("docker-commander/0.1")
            .build()
            .map_err(|e| CoreError::Transport(format!("failed to create HTTP client: {e}")))?;

        let mut session_id = uuid::Uuid::new_v4().simple().to_string();
        session_id.truncate(12);

        Ok(Self {
            inner: Arc::new(RemoteBackend {
                base_url,
                client,
                credentials,
                token: RwLock::new(None),
                session_id,
                runners: StdRwLock::new(HashMap::new()),
                processes: StdRwLock::new(HashMap::new()),
            }),
        })
    }

    /// Creates a proxy authenticating with a pre-shared bearer token.
    ///
    /// # Errors
    ///
    /// See [`RemoteDockerHost::new`].
    pub fn with_bearer(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::new(base_url, Credentials::Bearer(token.into()))
    }

    /// Creates a proxy authenticating with username and password.
    ///
    /// # Errors
    ///
    /// See [`RemoteDockerHost::new`].
    pub fn with_basic(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            base_url,
            Credentials::Basic {
                username: username.into(),
                password: password.into(),
            },
        )
    }

    /// Starts pullers for both channels and the exit watcher that stamps
    /// the mirror once the peer's process is gone and the tail is drained.
    fn supervise_mirror(&self, process: &Process) {
        let stdout = spawn_output_puller(self.inner.clone(), process.clone(), OutputChannel::Stdout);
        let stderr = spawn_output_puller(self.inner.clone(), process.clone(), OutputChannel::Stderr);

        let backend = self.inner.clone();
        let process = process.clone();
        tokio::spawn(async move {
            let code = match backend.rpc_wait_exit(process.instance_id()).await {
                Ok(code) => code,
                Err(e) => {
                    tracing::warn!(instance = process.instance_id(), "exit watch failed: {e}");
                    -1
                }
            };
            let _ = stdout.await;
            let _ = stderr.await;
            process.set_exit(code);
        });
    }

    fn output_query(query: &mut Vec<(&'static str, String)>, output: &OutputOptions) {
        query.push(("outputAsLines", output.as_lines().to_string()));
        if let Some(limit) = output.limit {
            query.push(("outputLimit", limit.to_string()));
        }
    }
}

#[async_trait]
impl DockerHost for RemoteDockerHost {
    fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    async fn initialize(&self) -> Result<bool> {
        self.inner.get_json("/initialize", &[]).await
    }

    async fn check_daemon(&self) -> Result<bool> {
        self.inner.get_json("/check_daemon", &[]).await
    }

    async fn run(&self, options: RunOptions) -> Result<Option<Runner>> {
        let mut query: Vec<(&'static str, String)> = vec![("image", options.image.clone())];
        if let Some(version) = &options.version {
            query.push(("version", version.clone()));
        }
        if let Some(name) = &options.name {
            query.push(("name", name.clone()));
        }
        if !options.ports.is_empty() {
            query.push(("ports", options.ports.join(",")));
        }
        if let Some(network) = &options.network {
            query.push(("network", network.clone()));
        }
        if let Some(hostname) = &options.hostname {
            query.push(("hostname", hostname.clone()));
        }
        if !options.env.is_empty() {
            query.push(("environment", encode_map(&options.env)));
        }
        if !options.volumes.is_empty() {
            query.push(("volumes", encode_map(&options.volumes)));
        }
        query.push(("cleanContainer", options.clean_container.to_string()));
        if !options.image_args.is_empty() {
            query.push(("imageArgs", encode_list(&options.image_args)));
        }
        Self::output_query(&mut query, &options.output);

        let Some(reply) = self.inner.get_json::<Option<RunReply>>("/run", &query).await? else {
            return Ok(None);
        };

        let process = Process::new(
            reply.instance_id,
            Some(reply.container_name.clone()),
            &options.output,
        );
        process.initialize();

        let runner = Runner::new(
            process.clone(),
            options.image_ref(),
            normalize_ports(&options.ports),
            options.network.clone(),
            options.hostname.clone(),
            self.inner.clone(),
        );
        if let Some(id) = reply.id {
            runner.set_id(id);
        }

        self.inner
            .runners
            .write()
            .map_err(|_| CoreError::LockPoisoned)?
            .insert(reply.instance_id, runner.clone());

        self.supervise_mirror(&process);
        runner.wait_ready().await;
        Ok(Some(runner))
    }

    async fn create_container(&self, options: CreateOptions) -> Result<Option<ContainerInfo>> {
        let mut query: Vec<(&'static str, String)> = vec![("image", options.image.clone())];
        if let Some(version) = &options.version {
            query.push(("version", version.clone()));
        }
        if let Some(name) = &options.name {
            query.push(("name", name.clone()));
        }
        if !options.ports.is_empty() {
            query.push(("ports", options.ports.join(",")));
        }
        if let Some(network) = &options.network {
            query.push(("network", network.clone()));
        }
        if let Some(hostname) = &options.hostname {
            query.push(("hostname", hostname.clone()));
        }
        if !options.env.is_empty() {
            query.push(("environment", encode_map(&options.env)));
        }
        if !options.volumes.is_empty() {
            query.push(("volumes", encode_map(&options.volumes)));
        }
        query.push(("cleanContainer", options.clean_container.to_string()));

        let Some(reply) = self
            .inner
            .get_json::<Option<CreateReply>>("/create", &query)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(ContainerInfo {
            container_name: reply.container_name,
            id: reply.id,
            image: reply.image,
            ports: reply.ports,
            network: reply.network,
            hostname: reply.hostname,
        }))
    }

    async fn exec(
        &self,
        container_name: &str,
        cmd: &str,
        args: &[String],
        output: OutputOptions,
    ) -> Result<Option<Process>> {
        let mut query: Vec<(&'static str, String)> = vec![
            ("cmd", cmd.to_string()),
            ("name", container_name.to_string()),
        ];
        if !args.is_empty() {
            query.push(("args", encode_list(args)));
        }
        Self::output_query(&mut query, &output);

        let Some(reply) = self
            .inner
            .get_json::<Option<ExecReply>>("/exec", &query)
            .await?
        else {
            return Ok(None);
        };

        let process = Process::new(reply.instance_id, Some(reply.container_name), &output);
        process.initialize();
        self.inner
            .processes
            .write()
            .map_err(|_| CoreError::LockPoisoned)?
            .insert(reply.instance_id, process.clone());

        self.supervise_mirror(&process);
        process.wait_ready().await;
        Ok(Some(process))
    }

    async fn command(
        &self,
        cmd: &str,
        args: &[String],
        output: OutputOptions,
    ) -> Result<Option<Process>> {
        let mut query: Vec<(&'static str, String)> = vec![("cmd", cmd.to_string())];
        if !args.is_empty() {
            query.push(("args", encode_list(args)));
        }
        Self::output_query(&mut query, &output);

        let Some(reply) = self
            .inner
            .get_json::<Option<CommandReply>>("/command", &query)
            .await?
        else {
            return Ok(None);
        };

        let process = Process::new(reply.instance_id, None, &output);
        process.initialize();
        self.inner
            .processes
            .write()
            .map_err(|_| CoreError::LockPoisoned)?
            .insert(reply.instance_id, process.clone());

        self.supervise_mirror(&process);
        process.wait_ready().await;
        Ok(Some(process))
    }

    async fn container_id_by_name(&self, name: &str) -> Result<Option<String>> {
        let id: String = self
            .inner
            .get_json("/id_by_name", &[("name", name.to_string())])
            .await?;
        Ok(if id.is_empty() { None } else { Some(id) })
    }

    async fn stop_by_name(&self, name: &str, timeout: Option<Duration>) -> Result<bool> {
        RunnerControl::stop_by_name(&*self.inner, name, timeout).await
    }

    async fn get_container_ip(&self, id: &str) -> Result<String> {
        let args = vec![
            "-f".to_string(),
            "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}".to_string(),
            id.to_string(),
        ];
        let Some(process) = self
            .command("inspect", &args, OutputOptions::default())
            .await?
        else {
            return Err(CoreError::Docker(format!("inspect {id} could not start")));
        };

        if process.wait_exit(Some(0)).await.is_none() {
            return Err(CoreError::Docker(format!("inspect {id} failed")));
        }
        Ok(process
            .stdout_lines()
            .unwrap_or_default()
            .first()
            .map(|line| line.trim().to_string())
            .unwrap_or_default())
    }

    async fn add_containers_host_mapping(
        &self,
        mapping: HostMapping,
    ) -> Result<HashMap<String, String>> {
        let mut results = HashMap::with_capacity(mapping.len());
        for (container, hosts) in mapping {
            let mut ok = true;
            for (hostname, ip) in hosts {
                let script = format!("echo '{ip} {hostname}' >> /etc/hosts");
                let args = vec!["-c".to_string(), script];
                match self
                    .exec(&container, "/bin/sh", &args, OutputOptions::default())
                    .await?
                {
                    Some(process) => {
                        if process.wait_exit(Some(0)).await.is_none() {
                            ok = false;
                        }
                    }
                    None => ok = false,
                }
            }
            results.insert(container, if ok { "ok" } else { "false" }.to_string());
        }
        Ok(results)
    }

    fn runner_by_instance_id(&self, instance_id: u64) -> Option<Runner> {
        self.inner.runners.read().ok()?.get(&instance_id).cloned()
    }

    fn process_by_instance_id(&self, instance_id: u64) -> Option<Process> {
        self.inner.processes.read().ok()?.get(&instance_id).cloned()
    }

    async fn close(&self) -> Result<()> {
        let _: bool = self.inner.get_json("/close", &[]).await?;
        Ok(())
    }
}
