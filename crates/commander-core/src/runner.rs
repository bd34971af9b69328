//! Supervised container handles.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::process::{OutputReadyType, Process};

/// Default grace period passed to `docker stop`.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(15);

/// Backend capability needed by a [`Runner`] to stop its container.
#[async_trait]
pub(crate) trait RunnerControl: Send + Sync {
    async fn stop_by_name(&self, name: &str, timeout: Option<Duration>) -> Result<bool>;
}

/// Container identity and placement returned by `create_container`.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Container name (caller-chosen or generated).
    pub container_name: String,
    /// Opaque container ID, once probed.
    pub id: Option<String>,
    /// Image reference the container was created from.
    pub image: String,
    /// Normalized `host:container` port mappings.
    pub ports: Vec<String>,
    /// Docker network the container joins, if any.
    pub network: Option<String>,
    /// Hostname inside the network, if set.
    pub hostname: Option<String>,
}

struct RunnerInner {
    image: String,
    ports: Vec<String>,
    network: Option<String>,
    hostname: Option<String>,
    id: OnceLock<String>,
    ip: OnceLock<String>,
    control: Arc<dyn RunnerControl>,
}

/// Handle to a supervised container: a [`Process`] plus container identity.
///
/// A runner composes the process supervising its `docker run` invocation
/// and delegates the process operations; on top it knows the image, the
/// container ID, port mappings, network placement, and how to stop the
/// container.
#[derive(Clone)]
pub struct Runner {
    process: Process,
    inner: Arc<RunnerInner>,
}

impl Runner {
    pub(crate) fn new(
        process: Process,
        image: String,
        ports: Vec<String>,
        network: Option<String>,
        hostname: Option<String>,
        control: Arc<dyn RunnerControl>,
    ) -> Self {
        Self {
            process,
            inner: Arc::new(RunnerInner {
                image,
                ports,
                network,
                hostname,
                id: OnceLock::new(),
                ip: OnceLock::new(),
                control,
            }),
        }
    }

    /// The process supervising this container's client invocation.
    #[must_use]
    pub fn process(&self) -> &Process {
        &self.process
    }

    /// The instance ID of the underlying process.
    #[must_use]
    pub fn instance_id(&self) -> u64 {
        self.process.instance_id()
    }

    /// The container name. Always known for a started runner.
    #[must_use]
    pub fn container_name(&self) -> &str {
        self.process.container_name().unwrap_or_default()
    }

    /// The image reference this container was started from.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.inner.image
    }

    /// Normalized `host:container` port mappings.
    #[must_use]
    pub fn ports(&self) -> &[String] {
        &self.inner.ports
    }

    /// The docker network this container joined, if any.
    #[must_use]
    pub fn network(&self) -> Option<&str> {
        self.inner.network.as_deref()
    }

    /// The hostname inside the network, if set.
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.inner.hostname.as_deref()
    }

    /// The opaque container ID. Set once the post-start probe succeeds.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.inner.id.get().map(String::as_str)
    }

    /// The container's address on its network, once inspected.
    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        self.inner.ip.get().map(String::as_str)
    }

    pub(crate) fn set_id(&self, id: String) {
        let _ = self.inner.id.set(id);
    }

    pub(crate) fn set_ip(&self, ip: String) {
        let _ = self.inner.ip.set(ip);
    }

    /// Returns whether the container's client process is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.process.is_running()
    }

    /// The exit code, once observed.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.process.exit_code()
    }

    /// Returns whether the readiness criterion is already met.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.process.is_ready()
    }

    /// The readiness criterion of the underlying process.
    #[must_use]
    pub fn ready_type(&self) -> OutputReadyType {
        self.process.ready_type()
    }

    /// Waits until the readiness criterion is met or the process exits.
    pub async fn wait_ready(&self) {
        self.process.wait_ready().await;
    }

    /// Waits until the exit code is known; see [`Process::wait_exit`].
    pub async fn wait_exit(&self, desired: Option<i32>) -> Option<i32> {
        self.process.wait_exit(desired).await
    }

    /// Stops the container via `docker stop`.
    ///
    /// The grace period defaults to 15 seconds and is floored at 1 second.
    /// Returns true iff the stop invocation exited zero. The runner's own
    /// exit code is set by the normal exit path, not by this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the stop command cannot be issued.
    pub async fn stop(&self, timeout: Option<Duration>) -> Result<bool> {
        let name = self.container_name().to_string();
        self.inner.control.stop_by_name(&name, timeout).await
    }
}
