//! Local docker host backend.
//!
//! Shells out to the `docker` binary: containers are started with
//! `docker run`/`docker create`, commands with `docker exec` or plain
//! sub-commands, and the child's stdio is pumped into the process's
//! output streams by background tasks.

mod argv;
mod cidfile;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::config::{HostConfig, CIDFILE_TIMEOUT};
use crate::error::{CoreError, Result};
use crate::host::{CreateOptions, DockerHost, HostMapping, RunOptions};
use crate::network::NetworkRegistry;
use crate::ports::normalize_ports;
use crate::process::{next_instance_id, OutputOptions, Process, ProcessOutput};
use crate::runner::{ContainerInfo, Runner, RunnerControl, DEFAULT_STOP_TIMEOUT};
use crate::stream::OutputStream;

use argv::{build_container_args, ContainerArgSpec};

/// Grace period handed to `docker stop --time`, floored at one second.
fn stop_grace_secs(timeout: Option<Duration>) -> u64 {
    timeout.unwrap_or(DEFAULT_STOP_TIMEOUT).as_secs().max(1)
}

fn short_session_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

struct LocalBackend {
    session_id: String,
    config: HostConfig,
    docker: OnceLock<PathBuf>,
    temp_dir: Mutex<Option<TempDir>>,
    runners: RwLock<HashMap<u64, Runner>>,
    processes: RwLock<HashMap<u64, Process>>,
    networks: NetworkRegistry,
}

impl LocalBackend {
    fn docker_path(&self) -> Result<PathBuf> {
        self.docker.get().cloned().ok_or_else(|| {
            CoreError::invalid_state("docker binary path requested before initialize")
        })
    }

    fn temp_path(&self) -> Result<PathBuf> {
        self.temp_dir
            .lock()
            .map_err(|_| CoreError::LockPoisoned)?
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or_else(|| CoreError::invalid_state("host closed"))
    }

    /// Runs a short docker invocation to completion, capturing its output.
    async fn docker_output<I, S>(&self, args: I) -> Result<std::process::Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let docker = self.docker_path()?;
        Command::new(&docker)
            .args(args)
            .output()
            .await
            .map_err(|e| CoreError::Docker(format!("failed to invoke {}: {e}", docker.display())))
    }
}

#[async_trait]
impl RunnerControl for LocalBackend {
    async fn stop_by_name(&self, name: &str, timeout: Option<Duration>) -> Result<bool> {
        let secs = stop_grace_secs(timeout).to_string();
        let output = self
            .docker_output(["stop", "--time", secs.as_str(), name])
            .await?;
        if !output.status.success() {
            tracing::warn!(
                container = name,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "docker stop failed"
            );
        }
        Ok(output.status.success())
    }
}

/// Control plane for a local docker daemon.
///
/// Cloning yields a handle to the same host; registries, the network map
/// and the temp directory are shared.
#[derive(Clone)]
pub struct LocalDockerHost {
    inner: Arc<LocalBackend>,
}

impl LocalDockerHost {
    /// Creates a host with its per-session temp directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp directory cannot be created.
    pub fn new(config: HostConfig) -> Result<Self> {
        let session_id = short_session_id();
        let mut builder = tempfile::Builder::new();
        let prefix = format!("docker_commander-{session_id}-");
        builder.prefix(&prefix);
        let temp_dir = match &config.temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        tracing::debug!(session = %session_id, temp = %temp_dir.path().display(), "local host created");

        Ok(Self {
            inner: Arc::new(LocalBackend {
                session_id,
                config,
                docker: OnceLock::new(),
                temp_dir: Mutex::new(Some(temp_dir)),
                runners: RwLock::new(HashMap::new()),
                processes: RwLock::new(HashMap::new()),
                networks: NetworkRegistry::new(),
            }),
        })
    }

    /// Opaque ID unique per host lifetime.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Discovers the docker binary (`which docker`), unless the
    /// configuration pins one. Idempotent; true on success.
    ///
    /// # Errors
    ///
    /// Infallible in practice; kept fallible for contract symmetry with
    /// the remote backend.
    pub async fn initialize(&self) -> Result<bool> {
        if self.inner.docker.get().is_some() {
            return Ok(true);
        }
        if let Some(path) = &self.inner.config.docker_binary {
            let _ = self.inner.docker.set(path.clone());
            return Ok(true);
        }

        match Command::new("which").arg("docker").output().await {
            Ok(output) if output.status.success() => {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if path.is_empty() {
                    return Ok(false);
                }
                tracing::debug!(docker = %path, "discovered docker binary");
                let _ = self.inner.docker.set(PathBuf::from(path));
                Ok(true)
            }
            Ok(_) => {
                tracing::warn!("docker binary not found in PATH");
                Ok(false)
            }
            Err(e) => {
                tracing::warn!("docker binary discovery failed: {e}");
                Ok(false)
            }
        }
    }

    /// Returns whether the daemon answers `docker ps`.
    ///
    /// # Errors
    ///
    /// Returns an error when called before `initialize`.
    pub async fn check_daemon(&self) -> Result<bool> {
        let output = self.inner.docker_output(["ps"]).await?;
        Ok(output.status.success())
    }

    /// Starts and supervises a container; resolves once the readiness
    /// criterion is met. `None` on startup failure.
    ///
    /// # Errors
    ///
    /// Returns an error for violated usage invariants (uninitialized host,
    /// closed host), not for container startup failures.
    pub async fn run(&self, options: RunOptions) -> Result<Option<Runner>> {
        let instance_id = next_instance_id();
        let name = options.name.clone().unwrap_or_else(|| {
            format!(
                "docker_commander-{}-{}",
                self.inner.session_id, instance_id
            )
        });
        let image_ref = options.image_ref();
        let ports = normalize_ports(&options.ports);
        let cidfile_path = self.inner.temp_path()?.join(format!("cid-{instance_id}"));

        let peers = match &options.network {
            Some(network) => self.inner.networks.peers(network, Some(&name)),
            None => Vec::new(),
        };

        let args = build_container_args(&ContainerArgSpec {
            verb: "run",
            name: &name,
            ports: &ports,
            network: options.network.as_deref(),
            peers: &peers,
            hostname: options.hostname.as_deref(),
            volumes: &options.volumes,
            env: &options.env,
            clean_container: options.clean_container,
            cidfile: &cidfile_path,
            image_ref: &image_ref,
            image_args: &options.image_args,
        });

        let Some(process) = self
            .spawn_supervised(&args, Some(name.clone()), instance_id, &options.output)
            .await?
        else {
            return Ok(None);
        };

        let runner = Runner::new(
            process.clone(),
            image_ref,
            ports,
            options.network.clone(),
            options.hostname.clone(),
            self.inner.clone(),
        );
        self.inner
            .runners
            .write()
            .map_err(|_| CoreError::LockPoisoned)?
            .insert(instance_id, runner.clone());

        // Probe for the container ID; bail out early if the client exits.
        let id = tokio::select! {
            id = cidfile::await_cidfile(&cidfile_path, CIDFILE_TIMEOUT) => id,
            _ = process.wait_exit(None) => {
                cidfile::await_cidfile(&cidfile_path, Duration::from_millis(50)).await
            }
        };
        let id = match id {
            Some(id) => Some(id),
            None => self.container_id_by_name(&name).await?,
        };
        match id {
            Some(id) => runner.set_id(id),
            None => {
                tracing::warn!(container = %name, "container never reported an ID; treating start as failed");
                return Ok(None);
            }
        }

        if let Some(network) = &options.network {
            self.join_network(&runner, network, &name).await?;
        }

        runner.wait_ready().await;
        Ok(Some(runner))
    }

    /// Creates a container without starting it. `None` on failure.
    ///
    /// # Errors
    ///
    /// Returns an error for violated usage invariants.
    pub async fn create_container(
        &self,
        options: CreateOptions,
    ) -> Result<Option<ContainerInfo>> {
        let instance_id = next_instance_id();
        let name = options.name.clone().unwrap_or_else(|| {
            format!(
                "docker_commander-{}-{}",
                self.inner.session_id, instance_id
            )
        });
        let image_ref = options.image_ref();
        let ports = normalize_ports(&options.ports);
        let cidfile_path = self.inner.temp_path()?.join(format!("cid-{instance_id}"));

        let peers = match &options.network {
            Some(network) => self.inner.networks.peers(network, Some(&name)),
            None => Vec::new(),
        };

        let args = build_container_args(&ContainerArgSpec {
            verb: "create",
            name: &name,
            ports: &ports,
            network: options.network.as_deref(),
            peers: &peers,
            hostname: options.hostname.as_deref(),
            volumes: &options.volumes,
            env: &options.env,
            clean_container: options.clean_container,
            cidfile: &cidfile_path,
            image_ref: &image_ref,
            image_args: &[],
        });

        let output = self.inner.docker_output(&args).await?;
        if !output.status.success() {
            tracing::warn!(
                container = %name,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "docker create failed"
            );
            return Ok(None);
        }

        let id = match cidfile::await_cidfile(&cidfile_path, Duration::from_secs(1)).await {
            Some(id) => Some(id),
            None => self.container_id_by_name(&name).await?,
        };

        Ok(Some(ContainerInfo {
            container_name: name,
            id,
            image: image_ref,
            ports,
            network: options.network,
            hostname: options.hostname,
        }))
    }

    /// Executes a command inside a running container. `None` when the
    /// container is not running.
    ///
    /// # Errors
    ///
    /// Returns an error for violated usage invariants.
    pub async fn exec(
        &self,
        container_name: &str,
        cmd: &str,
        args: &[String],
        output: OutputOptions,
    ) -> Result<Option<Process>> {
        if !self.is_container_running(container_name).await? {
            tracing::warn!(container = container_name, "exec refused: container not running");
            return Ok(None);
        }

        let mut argv = Vec::with_capacity(3 + args.len());
        argv.push("exec".to_string());
        argv.push(container_name.to_string());
        argv.push(cmd.to_string());
        argv.extend(args.iter().cloned());

        let instance_id = next_instance_id();
        let Some(process) = self
            .spawn_supervised(&argv, Some(container_name.to_string()), instance_id, &output)
            .await?
        else {
            return Ok(None);
        };

        self.inner
            .processes
            .write()
            .map_err(|_| CoreError::LockPoisoned)?
            .insert(instance_id, process.clone());

        process.wait_ready().await;
        Ok(Some(process))
    }

    /// Runs a plain docker sub-command. `None` when it cannot start.
    ///
    /// # Errors
    ///
    /// Returns an error for violated usage invariants.
    pub async fn command(
        &self,
        cmd: &str,
        args: &[String],
        output: OutputOptions,
    ) -> Result<Option<Process>> {
        let mut argv = Vec::with_capacity(1 + args.len());
        argv.push(cmd.to_string());
        argv.extend(args.iter().cloned());

        let instance_id = next_instance_id();
        let Some(process) = self
            .spawn_supervised(&argv, None, instance_id, &output)
            .await?
        else {
            return Ok(None);
        };

        self.inner
            .processes
            .write()
            .map_err(|_| CoreError::LockPoisoned)?
            .insert(instance_id, process.clone());

        process.wait_ready().await;
        Ok(Some(process))
    }

    /// Looks up a container ID by name, running or not.
    ///
    /// # Errors
    ///
    /// Returns an error when the lookup cannot be issued.
    pub async fn container_id_by_name(&self, name: &str) -> Result<Option<String>> {
        let filter = format!("name={name}");
        let output = self
            .inner
            .docker_output(["ps", "-aqf", filter.as_str()])
            .await?;
        let id = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(if id.is_empty() { None } else { Some(id) })
    }

    /// Issues `docker stop --time T name`; true iff it exited zero.
    ///
    /// # Errors
    ///
    /// Returns an error when the stop cannot be issued.
    pub async fn stop_by_name(&self, name: &str, timeout: Option<Duration>) -> Result<bool> {
        RunnerControl::stop_by_name(&*self.inner, name, timeout).await
    }

    /// The container's network address, from `docker inspect`.
    ///
    /// # Errors
    ///
    /// Returns an error when the inspect fails.
    pub async fn get_container_ip(&self, id: &str) -> Result<String> {
        let output = self
            .inner
            .docker_output([
                "inspect",
                "-f",
                "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}",
                id,
            ])
            .await?;
        if !output.status.success() {
            return Err(CoreError::Docker(format!(
                "inspect {id} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Appends `/etc/hosts` entries inside each mapped container.
    ///
    /// # Errors
    ///
    /// Returns an error for violated usage invariants; per-container
    /// failures are reported as `"false"` in the result.
    pub async fn add_containers_host_mapping(
        &self,
        mapping: HostMapping,
    ) -> Result<HashMap<String, String>> {
        let mut results = HashMap::with_capacity(mapping.len());
        for (container, hosts) in mapping {
            let mut ok = true;
            for (hostname, ip) in hosts {
                let script = format!("echo '{ip} {hostname}' >> /etc/hosts");
                let output = self
                    .inner
                    .docker_output([
                        "exec",
                        container.as_str(),
                        "/bin/sh",
                        "-c",
                        script.as_str(),
                    ])
                    .await?;
                if !output.status.success() {
                    tracing::warn!(
                        container = %container,
                        hostname = %hostname,
                        "failed to append /etc/hosts entry"
                    );
                    ok = false;
                }
            }
            results.insert(container, if ok { "ok" } else { "false" }.to_string());
        }
        Ok(results)
    }

    /// Looks up a runner by instance ID. Exited runners stay resolvable.
    #[must_use]
    pub fn runner_by_instance_id(&self, instance_id: u64) -> Option<Runner> {
        self.inner.runners.read().ok()?.get(&instance_id).cloned()
    }

    /// Looks up an exec/command process by instance ID.
    #[must_use]
    pub fn process_by_instance_id(&self, instance_id: u64) -> Option<Process> {
        self.inner.processes.read().ok()?.get(&instance_id).cloned()
    }

    /// Looks up any supervised process — exec/command instances and the
    /// client processes of runners.
    #[must_use]
    pub fn instance_process(&self, instance_id: u64) -> Option<Process> {
        self.process_by_instance_id(instance_id).or_else(|| {
            self.runner_by_instance_id(instance_id)
                .map(|runner| runner.process().clone())
        })
    }

    /// Drops a finished instance from the registries. The registries never
    /// evict on their own; this is the only way to release an entry.
    pub fn forget_instance(&self, instance_id: u64) {
        if let Ok(mut runners) = self.inner.runners.write() {
            runners.remove(&instance_id);
        }
        if let Ok(mut processes) = self.inner.processes.write() {
            processes.remove(&instance_id);
        }
    }

    /// Sweeps the per-session temp directory. Running containers are left
    /// alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be removed.
    pub async fn close(&self) -> Result<()> {
        let taken = self
            .inner
            .temp_dir
            .lock()
            .map_err(|_| CoreError::LockPoisoned)?
            .take();
        if let Some(dir) = taken {
            dir.close()?;
        }
        Ok(())
    }

    async fn is_container_running(&self, name: &str) -> Result<bool> {
        let known = self
            .inner
            .runners
            .read()
            .ok()
            .map(|runners| {
                runners
                    .values()
                    .any(|r| r.container_name() == name && r.is_running())
            })
            .unwrap_or(false);
        if known {
            return Ok(true);
        }

        // Containers started outside this host are still usable.
        let filter = format!("name={name}");
        let output = self
            .inner
            .docker_output(["ps", "-qf", filter.as_str()])
            .await?;
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    /// Wires a freshly started runner into its network: inspects the
    /// address, records it, and patches `/etc/hosts` inside the existing
    /// peers so they can resolve the newcomer.
    async fn join_network(&self, runner: &Runner, network: &str, name: &str) -> Result<()> {
        let ip = match self.get_container_ip(name).await {
            Ok(ip) if !ip.is_empty() => ip,
            Ok(_) => {
                tracing::warn!(container = name, network, "container has no address yet");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(container = name, network, "address inspect failed: {e}");
                return Ok(());
            }
        };

        let hostname = runner.hostname().unwrap_or(name).to_string();
        runner.set_ip(ip.clone());

        let peers = self.inner.networks.peers(network, Some(name));
        self.inner.networks.insert(network, name, &hostname, &ip);

        if peers.is_empty() {
            return Ok(());
        }
        let mapping: HostMapping = peers
            .into_iter()
            .map(|peer| {
                (
                    peer.container_name,
                    HashMap::from([(hostname.clone(), ip.clone())]),
                )
            })
            .collect();
        let results = self.add_containers_host_mapping(mapping).await?;
        for (container, status) in results {
            if status != "ok" {
                tracing::warn!(container = %container, "peer /etc/hosts patch failed");
            }
        }
        Ok(())
    }

    /// Spawns a docker invocation and wires its stdio into a new process's
    /// output streams. `None` when the child cannot be spawned.
    async fn spawn_supervised(
        &self,
        args: &[String],
        container_name: Option<String>,
        instance_id: u64,
        output: &OutputOptions,
    ) -> Result<Option<Process>> {
        let docker = self.inner.docker_path()?;

        let mut child = match Command::new(&docker)
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(docker = %docker.display(), "spawn failed: {e}");
                return Ok(None);
            }
        };

        let (Some(child_stdout), Some(child_stderr)) = (child.stdout.take(), child.stderr.take())
        else {
            tracing::warn!("child stdio pipes unavailable");
            return Ok(None);
        };

        let process = Process::new(instance_id, container_name, output);

        let (out_task, err_task) = match process.output() {
            ProcessOutput::Lines { stdout, stderr } => (
                tokio::spawn(pump_lines(child_stdout, stdout.clone())),
                tokio::spawn(pump_lines(child_stderr, stderr.clone())),
            ),
            ProcessOutput::Bytes { stdout, stderr } => (
                tokio::spawn(pump_bytes(child_stdout, stdout.clone())),
                tokio::spawn(pump_bytes(child_stderr, stderr.clone())),
            ),
        };

        let exit_process = process.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    tracing::warn!("wait on child failed: {e}");
                    -1
                }
            };
            // Drain both pumps before publishing the exit code so the
            // streams hold the full output when waiters wake.
            let _ = out_task.await;
            let _ = err_task.await;
            exit_process.set_exit(code);
        });

        process.initialize();
        Ok(Some(process))
    }
}

async fn pump_lines<R>(reader: R, stream: OutputStream<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
                    buf.pop();
                }
                stream.push(String::from_utf8_lossy(&buf).into_owned());
            }
            Err(e) => {
                tracing::debug!("line pump ended: {e}");
                break;
            }
        }
    }
}

async fn pump_bytes<R>(mut reader: R, stream: OutputStream<u8>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => stream.extend(buf[..n].iter().copied()),
            Err(e) => {
                tracing::debug!("byte pump ended: {e}");
                break;
            }
        }
    }
}

#[async_trait]
impl DockerHost for LocalDockerHost {
    fn session_id(&self) -> &str {
        self.session_id()
    }

    async fn initialize(&self) -> Result<bool> {
        self.initialize().await
    }

    async fn check_daemon(&self) -> Result<bool> {
        self.check_daemon().await
    }

    async fn run(&self, options: RunOptions) -> Result<Option<Runner>> {
        self.run(options).await
    }

    async fn create_container(&self, options: CreateOptions) -> Result<Option<ContainerInfo>> {
        self.create_container(options).await
    }

    async fn exec(
        &self,
        container_name: &str,
        cmd: &str,
        args: &[String],
        output: OutputOptions,
    ) -> Result<Option<Process>> {
        self.exec(container_name, cmd, args, output).await
    }

    async fn command(
        &self,
        cmd: &str,
        args: &[String],
        output: OutputOptions,
    ) -> Result<Option<Process>> {
        self.command(cmd, args, output).await
    }

    async fn container_id_by_name(&self, name: &str) -> Result<Option<String>> {
        self.container_id_by_name(name).await
    }

    async fn stop_by_name(&self, name: &str, timeout: Option<Duration>) -> Result<bool> {
        self.stop_by_name(name, timeout).await
    }

    async fn get_container_ip(&self, id: &str) -> Result<String> {
        self.get_container_ip(id).await
    }

    async fn add_containers_host_mapping(
        &self,
        mapping: HostMapping,
    ) -> Result<HashMap<String, String>> {
        self.add_containers_host_mapping(mapping).await
    }

    fn runner_by_instance_id(&self, instance_id: u64) -> Option<Runner> {
        self.runner_by_instance_id(instance_id)
    }

    fn process_by_instance_id(&self, instance_id: u64) -> Option<Process> {
        self.process_by_instance_id(instance_id)
    }

    async fn close(&self) -> Result<()> {
        self.close().await
    }
}
