//! The docker host capability trait and its option types.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::process::{OutputOptions, Process};
use crate::runner::{ContainerInfo, Runner};

/// Host-entry mapping for [`DockerHost::add_containers_host_mapping`]:
/// `container_name → (hostname → ip)`.
pub type HostMapping = HashMap<String, HashMap<String, String>>;

/// Options for starting a container with `run`.
///
/// `clean_container` defaults to **true** here: run containers are removed
/// by the engine when they exit (`--rm`).
#[derive(Clone)]
pub struct RunOptions {
    /// Image name, without version.
    pub image: String,
    /// Image version; appended as `name:version` when set.
    pub version: Option<String>,
    /// Container name. Generated from the host session and instance ID
    /// when unset.
    pub name: Option<String>,
    /// Port mappings, normalized before use (`n` → `n:n`, deduplicated).
    pub ports: Vec<String>,
    /// Docker network to join.
    pub network: Option<String>,
    /// Hostname inside the network.
    pub hostname: Option<String>,
    /// Environment entries, in order. Entries with an empty key are
    /// skipped.
    pub env: Vec<(String, String)>,
    /// Volume mounts `host → container`, in order. Entries with an empty
    /// side are skipped.
    pub volumes: Vec<(String, String)>,
    /// Trailing arguments passed to the image entrypoint.
    pub image_args: Vec<String>,
    /// Pass `--rm` so the container self-destructs on exit.
    pub clean_container: bool,
    /// Output capture and readiness options.
    pub output: OutputOptions,
}

impl RunOptions {
    /// Options for running `image` with everything else defaulted.
    #[must_use]
    pub fn image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            version: None,
            name: None,
            ports: Vec::new(),
            network: None,
            hostname: None,
            env: Vec::new(),
            volumes: Vec::new(),
            image_args: Vec::new(),
            clean_container: true,
            output: OutputOptions::default(),
        }
    }

    /// The full image reference (`name` or `name:version`).
    #[must_use]
    pub fn image_ref(&self) -> String {
        match &self.version {
            Some(version) => format!("{}:{}", self.image, version),
            None => self.image.clone(),
        }
    }
}

/// Options for creating a container without starting it.
///
/// `clean_container` defaults to **false** on this surface, unlike
/// [`RunOptions`]; the two defaults intentionally differ and are kept as
/// documented rather than unified.
#[derive(Clone)]
pub struct CreateOptions {
    /// Image name, without version.
    pub image: String,
    /// Image version; appended as `name:version` when set.
    pub version: Option<String>,
    /// Container name. Generated when unset.
    pub name: Option<String>,
    /// Port mappings, normalized before use.
    pub ports: Vec<String>,
    /// Docker network to join.
    pub network: Option<String>,
    /// Hostname inside the network.
    pub hostname: Option<String>,
    /// Environment entries, in order.
    pub env: Vec<(String, String)>,
    /// Volume mounts `host → container`, in order.
    pub volumes: Vec<(String, String)>,
    /// Pass `--rm` so the container self-destructs on exit.
    pub clean_container: bool,
}

impl CreateOptions {
    /// Options for creating a container from `image` with everything else
    /// defaulted.
    #[must_use]
    pub fn image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            version: None,
            name: None,
            ports: Vec::new(),
            network: None,
            hostname: None,
            env: Vec::new(),
            volumes: Vec::new(),
            clean_container: false,
        }
    }

    /// The full image reference (`name` or `name:version`).
    #[must_use]
    pub fn image_ref(&self) -> String {
        match &self.version {
            Some(version) => format!("{}:{}", self.image, version),
            None => self.image.clone(),
        }
    }
}

/// Control plane for a single docker daemon, local or remote.
///
/// Both backends share this contract and nothing else; startup failures
/// (daemon down, invalid image, bad arguments) resolve as `Ok(None)` and
/// must be checked by the caller, while `Err` is reserved for transport
/// failures and violated usage invariants.
#[async_trait]
pub trait DockerHost: Send + Sync {
    /// Opaque ID unique per host lifetime, namespacing generated container
    /// names and temp files.
    fn session_id(&self) -> &str;

    /// One-shot host setup (binary discovery for the local backend, a
    /// round-trip for the remote one). Returns true on success.
    async fn initialize(&self) -> Result<bool>;

    /// Returns whether the docker daemon answers (`docker ps` exits zero).
    async fn check_daemon(&self) -> Result<bool>;

    /// Starts a container and supervises it, returning only once the
    /// configured readiness criterion is met. `None` on startup failure.
    async fn run(&self, options: RunOptions) -> Result<Option<Runner>>;

    /// Creates a container without starting it. `None` on failure.
    async fn create_container(&self, options: CreateOptions) -> Result<Option<ContainerInfo>>;

    /// Executes a command inside a running container. `None` when the
    /// container is not running or the exec cannot start.
    async fn exec(
        &self,
        container_name: &str,
        cmd: &str,
        args: &[String],
        output: OutputOptions,
    ) -> Result<Option<Process>>;

    /// Runs a plain docker CLI sub-command (`cmd args…`). `None` when it
    /// cannot start.
    async fn command(
        &self,
        cmd: &str,
        args: &[String],
        output: OutputOptions,
    ) -> Result<Option<Process>>;

    /// Looks up a container ID by name, running or not.
    async fn container_id_by_name(&self, name: &str) -> Result<Option<String>>;

    /// Issues `docker stop --time T name`; T defaults to 15 s, floored at
    /// 1 s. True iff the stop exited zero.
    async fn stop_by_name(&self, name: &str, timeout: Option<Duration>) -> Result<bool>;

    /// The container's network address, from `docker inspect`.
    async fn get_container_ip(&self, id: &str) -> Result<String>;

    /// Appends `/etc/hosts` entries inside each mapped container. Returns
    /// `"ok"` or `"false"` per container.
    async fn add_containers_host_mapping(
        &self,
        mapping: HostMapping,
    ) -> Result<HashMap<String, String>>;

    /// Looks up a runner by instance ID. Exited runners remain resolvable;
    /// the registries never evict on their own.
    fn runner_by_instance_id(&self, instance_id: u64) -> Option<Runner>;

    /// Looks up a process by instance ID (exec and command instances).
    fn process_by_instance_id(&self, instance_id: u64) -> Option<Process>;

    /// Releases host resources (the local backend sweeps its temp
    /// directory). Running containers are left alone.
    async fn close(&self) -> Result<()>;
}
