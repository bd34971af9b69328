//! Supervised process handles.
//!
//! A [`Process`] is the handle to one supervised command execution: a
//! container's client process, a `docker exec` inside a runner, or a plain
//! CLI invocation. It owns the stdout/stderr [`OutputStream`]s, the
//! readiness criterion, and the exit-code latch. Handles are cheap to clone
//! and all clones observe the same state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::stream::{
    OutputStream, ReadyFn, ReadyLatch, DEFAULT_BYTE_CAPACITY, DEFAULT_LINE_CAPACITY,
};

/// Allocates the next instance ID. IDs are monotonically increasing and
/// unique across every host in this process.
pub(crate) fn next_instance_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Which output channel decides process readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputReadyType {
    /// Ready when the stdout stream's latch trips.
    Stdout,
    /// Ready when the stderr stream's latch trips.
    Stderr,
    /// Ready when either stream's latch trips.
    Any,
    /// Ready immediately.
    StartsReady,
}

/// Line-oriented readiness predicate supplied by callers.
///
/// Receives each appended line; returning true marks the stream ready.
pub type LineReadyFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Output capture options for `run`/`exec`/`command`.
///
/// Line mode (the default) appends decoded lines to the streams; byte mode
/// copies raw bytes. Ready predicates apply to line mode; in byte mode the
/// streams fall back to the default first-append criterion.
#[derive(Clone, Default)]
pub struct OutputOptions {
    /// Capture raw bytes instead of decoded lines.
    pub as_bytes: bool,
    /// Retained-history capacity override (entries in line mode, bytes in
    /// byte mode).
    pub limit: Option<usize>,
    /// Explicit readiness criterion. When absent it is derived from which
    /// predicates are present: stderr only → `Stderr`, stdout only →
    /// `Stdout`, both → `Any`, neither → `StartsReady`.
    pub ready_type: Option<OutputReadyType>,
    /// Readiness predicate over stdout lines.
    pub stdout_ready: Option<LineReadyFn>,
    /// Readiness predicate over stderr lines.
    pub stderr_ready: Option<LineReadyFn>,
}

impl OutputOptions {
    /// Line-mode options that mark the process ready when a stdout line
    /// satisfies the predicate.
    #[must_use]
    pub fn stdout_marker(ready: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            stdout_ready: Some(Arc::new(ready)),
            ..Self::default()
        }
    }

    /// Line-mode options that mark the process ready when a stderr line
    /// satisfies the predicate.
    #[must_use]
    pub fn stderr_marker(ready: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            stderr_ready: Some(Arc::new(ready)),
            ..Self::default()
        }
    }

    /// Returns true when output is captured as decoded lines.
    #[must_use]
    pub fn as_lines(&self) -> bool {
        !self.as_bytes
    }

    pub(crate) fn resolve_ready_type(&self) -> OutputReadyType {
        if let Some(explicit) = self.ready_type {
            return explicit;
        }
        match (self.stdout_ready.is_some(), self.stderr_ready.is_some()) {
            (true, true) => OutputReadyType::Any,
            (true, false) => OutputReadyType::Stdout,
            (false, true) => OutputReadyType::Stderr,
            (false, false) => OutputReadyType::StartsReady,
        }
    }

    fn capacity(&self) -> usize {
        self.limit.unwrap_or(if self.as_bytes {
            DEFAULT_BYTE_CAPACITY
        } else {
            DEFAULT_LINE_CAPACITY
        })
    }
}

/// The stdout/stderr pair of one process, in the capture mode it was
/// created with.
pub enum ProcessOutput {
    /// Decoded-line capture.
    Lines {
        /// Stdout line history.
        stdout: OutputStream<String>,
        /// Stderr line history.
        stderr: OutputStream<String>,
    },
    /// Raw-byte capture.
    Bytes {
        /// Stdout byte history.
        stdout: OutputStream<u8>,
        /// Stderr byte history.
        stderr: OutputStream<u8>,
    },
}

/// One-shot exit-code latch supporting multiple waiters.
#[derive(Clone)]
pub(crate) struct ExitLatch {
    tx: Arc<watch::Sender<Option<i32>>>,
}

impl ExitLatch {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Records the exit code. Returns false if a code was already set; the
    /// first observation wins and later ones are ignored.
    fn set(&self, code: i32) -> bool {
        let mut first = false;
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(code);
                first = true;
                true
            } else {
                false
            }
        });
        first
    }

    fn get(&self) -> Option<i32> {
        *self.tx.borrow()
    }

    async fn wait(&self) -> i32 {
        let mut rx = self.tx.subscribe();
        let result = match rx.wait_for(|slot| slot.is_some()).await {
            Ok(slot) => slot.unwrap_or(-1),
            // The sender lives in self; treat an impossible close as an
            // abnormal exit.
            Err(_) => -1,
        };
        result
    }
}

struct ProcessInner {
    instance_id: u64,
    container_name: Option<String>,
    ready_type: OutputReadyType,
    output: ProcessOutput,
    any_ready: ReadyLatch,
    exit: ExitLatch,
    initialized: AtomicBool,
}

/// Handle to a supervised command execution.
#[derive(Clone)]
pub struct Process {
    inner: Arc<ProcessInner>,
}

impl Process {
    /// Creates a process handle with its output streams, not yet wired to
    /// any child.
    pub(crate) fn new(
        instance_id: u64,
        container_name: Option<String>,
        options: &OutputOptions,
    ) -> Self {
        let any_ready = ReadyLatch::new();
        let capacity = options.capacity();

        let output = if options.as_bytes {
            ProcessOutput::Bytes {
                stdout: OutputStream::new(capacity, None, any_ready.clone()),
                stderr: OutputStream::new(capacity, None, any_ready.clone()),
            }
        } else {
            ProcessOutput::Lines {
                stdout: OutputStream::new(
                    capacity,
                    options.stdout_ready.clone().map(wrap_line_ready),
                    any_ready.clone(),
                ),
                stderr: OutputStream::new(
                    capacity,
                    options.stderr_ready.clone().map(wrap_line_ready),
                    any_ready.clone(),
                ),
            }
        };

        Self {
            inner: Arc::new(ProcessInner {
                instance_id,
                container_name,
                ready_type: options.resolve_ready_type(),
                output,
                any_ready,
                exit: ExitLatch::new(),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Marks stdio wiring as done. One-shot: returns true on the first
    /// call, false if the process was already initialized.
    pub fn initialize(&self) -> bool {
        self.inner
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// The instance ID identifying this process on its host.
    #[must_use]
    pub fn instance_id(&self) -> u64 {
        self.inner.instance_id
    }

    /// The container this process belongs to, when any.
    #[must_use]
    pub fn container_name(&self) -> Option<&str> {
        self.inner.container_name.as_deref()
    }

    /// The readiness criterion this process resolves `wait_ready` against.
    #[must_use]
    pub fn ready_type(&self) -> OutputReadyType {
        self.inner.ready_type
    }

    /// The stdout/stderr stream pair.
    #[must_use]
    pub fn output(&self) -> &ProcessOutput {
        &self.inner.output
    }

    /// Stdout history when in line mode.
    #[must_use]
    pub fn stdout_lines(&self) -> Option<Vec<String>> {
        match &self.inner.output {
            ProcessOutput::Lines { stdout, .. } => Some(stdout.snapshot()),
            ProcessOutput::Bytes { .. } => None,
        }
    }

    /// Stderr history when in line mode.
    #[must_use]
    pub fn stderr_lines(&self) -> Option<Vec<String>> {
        match &self.inner.output {
            ProcessOutput::Lines { stderr, .. } => Some(stderr.snapshot()),
            ProcessOutput::Bytes { .. } => None,
        }
    }

    /// Stdout history when in byte mode.
    #[must_use]
    pub fn stdout_bytes(&self) -> Option<Vec<u8>> {
        match &self.inner.output {
            ProcessOutput::Bytes { stdout, .. } => Some(stdout.snapshot()),
            ProcessOutput::Lines { .. } => None,
        }
    }

    /// Stderr history when in byte mode.
    #[must_use]
    pub fn stderr_bytes(&self) -> Option<Vec<u8>> {
        match &self.inner.output {
            ProcessOutput::Bytes { stderr, .. } => Some(stderr.snapshot()),
            ProcessOutput::Lines { .. } => None,
        }
    }

    /// Returns whether the process is still running (no exit code yet).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.exit.get().is_none()
    }

    /// The exit code, once observed.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.inner.exit.get()
    }

    /// Returns whether the readiness criterion is already met.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        match self.inner.ready_type {
            OutputReadyType::StartsReady => true,
            OutputReadyType::Any => self.inner.any_ready.is_set(),
            OutputReadyType::Stdout => match &self.inner.output {
                ProcessOutput::Lines { stdout, .. } => stdout.is_ready(),
                ProcessOutput::Bytes { stdout, .. } => stdout.is_ready(),
            },
            OutputReadyType::Stderr => match &self.inner.output {
                ProcessOutput::Lines { stderr, .. } => stderr.is_ready(),
                ProcessOutput::Bytes { stderr, .. } => stderr.is_ready(),
            },
        }
    }

    /// Waits until the readiness criterion is met or the process exits,
    /// whichever comes first (exit forces both stream latches).
    pub async fn wait_ready(&self) {
        match self.inner.ready_type {
            OutputReadyType::StartsReady => {}
            OutputReadyType::Any => self.inner.any_ready.wait().await,
            OutputReadyType::Stdout => match &self.inner.output {
                ProcessOutput::Lines { stdout, .. } => stdout.wait_ready().await,
                ProcessOutput::Bytes { stdout, .. } => stdout.wait_ready().await,
            },
            OutputReadyType::Stderr => match &self.inner.output {
                ProcessOutput::Lines { stderr, .. } => stderr.wait_ready().await,
                ProcessOutput::Bytes { stderr, .. } => stderr.wait_ready().await,
            },
        }
    }

    /// Waits until the exit code is known.
    ///
    /// With `desired` set, an exit code that differs from it resolves as
    /// `None` so callers can gate on success without comparing themselves.
    /// Any number of waiters may block here; all observe the same code.
    pub async fn wait_exit(&self, desired: Option<i32>) -> Option<i32> {
        let code = self.inner.exit.wait().await;
        match desired {
            Some(want) if want != code => None,
            _ => Some(code),
        }
    }

    /// Records the exit code and forces both stream ready latches. The
    /// first recorded code wins; later calls are no-ops.
    pub(crate) fn set_exit(&self, code: i32) {
        if self.inner.exit.set(code) {
            match &self.inner.output {
                ProcessOutput::Lines { stdout, stderr } => {
                    stdout.mark_ready();
                    stderr.mark_ready();
                }
                ProcessOutput::Bytes { stdout, stderr } => {
                    stdout.mark_ready();
                    stderr.mark_ready();
                }
            }
        }
    }
}

fn wrap_line_ready(ready: LineReadyFn) -> ReadyFn<String> {
    Arc::new(move |_: &std::collections::VecDeque<String>, line: &String| ready(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_process(options: OutputOptions) -> Process {
        Process::new(next_instance_id(), None, &options)
    }

    fn push_stdout(process: &Process, line: &str) {
        match process.output() {
            ProcessOutput::Lines { stdout, .. } => stdout.push(line.to_string()),
            ProcessOutput::Bytes { .. } => panic!("expected line mode"),
        }
    }

    fn push_stderr(process: &Process, line: &str) {
        match process.output() {
            ProcessOutput::Lines { stderr, .. } => stderr.push(line.to_string()),
            ProcessOutput::Bytes { .. } => panic!("expected line mode"),
        }
    }

    #[test]
    fn ready_type_resolution() {
        assert_eq!(
            OutputOptions::default().resolve_ready_type(),
            OutputReadyType::StartsReady
        );
        assert_eq!(
            OutputOptions::stdout_marker(|_| true).resolve_ready_type(),
            OutputReadyType::Stdout
        );
        assert_eq!(
            OutputOptions::stderr_marker(|_| true).resolve_ready_type(),
            OutputReadyType::Stderr
        );

        let both = OutputOptions {
            stdout_ready: Some(Arc::new(|_: &str| true)),
            stderr_ready: Some(Arc::new(|_: &str| true)),
            ..OutputOptions::default()
        };
        assert_eq!(both.resolve_ready_type(), OutputReadyType::Any);

        let explicit = OutputOptions {
            ready_type: Some(OutputReadyType::StartsReady),
            stdout_ready: Some(Arc::new(|_: &str| true)),
            ..OutputOptions::default()
        };
        assert_eq!(explicit.resolve_ready_type(), OutputReadyType::StartsReady);
    }

    #[tokio::test]
    async fn starts_ready_resolves_immediately() {
        let process = lines_process(OutputOptions::default());
        assert!(process.is_ready());
        process.wait_ready().await;
        assert!(process.is_running());
    }

    #[tokio::test]
    async fn stdout_marker_drives_readiness() {
        let process = lines_process(OutputOptions::stdout_marker(|line| line.contains("up")));
        assert!(!process.is_ready());

        push_stdout(&process, "starting");
        assert!(!process.is_ready());
        push_stderr(&process, "up is ignored on stderr");
        assert!(!process.is_ready());

        push_stdout(&process, "service up");
        process.wait_ready().await;
        assert!(process.is_ready());
    }

    #[tokio::test]
    async fn exit_forces_readiness_and_latches_code() {
        let process = lines_process(OutputOptions::stdout_marker(|_| false));
        assert!(process.is_running());

        process.set_exit(3);
        assert!(!process.is_running());
        assert_eq!(process.exit_code(), Some(3));
        assert!(process.is_ready());
        process.wait_ready().await;

        // First observation wins.
        process.set_exit(99);
        assert_eq!(process.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn wait_exit_gates_on_desired_code() {
        let process = lines_process(OutputOptions::default());
        process.set_exit(2);

        assert_eq!(process.wait_exit(None).await, Some(2));
        assert_eq!(process.wait_exit(Some(2)).await, Some(2));
        assert_eq!(process.wait_exit(Some(0)).await, None);
    }

    #[tokio::test]
    async fn wait_exit_supports_multiple_waiters() {
        let process = lines_process(OutputOptions::default());

        let first = process.clone();
        let second = process.clone();
        let a = tokio::spawn(async move { first.wait_exit(None).await });
        let b = tokio::spawn(async move { second.wait_exit(None).await });
        tokio::task::yield_now().await;

        process.set_exit(0);
        assert_eq!(a.await.expect("waiter a"), Some(0));
        assert_eq!(b.await.expect("waiter b"), Some(0));
    }

    #[test]
    fn initialize_is_one_shot() {
        let process = lines_process(OutputOptions::default());
        assert!(process.initialize());
        assert!(!process.initialize());
    }

    #[test]
    fn instance_ids_increase() {
        let a = next_instance_id();
        let b = next_instance_id();
        assert!(b > a);
    }
}
