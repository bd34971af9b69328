//! Bounded, ready-latched output streams.
//!
//! An [`OutputStream`] holds the recent history of one stdio channel of a
//! supervised process: either decoded text lines (`OutputStream<String>`)
//! or raw bytes (`OutputStream<u8>`). The history is a bounded ring —
//! appending beyond capacity silently evicts from the front while a counter
//! keeps the logical length monotone. A ready predicate is evaluated after
//! every append; the first time it returns true the stream's ready latch
//! trips and stays tripped. A second latch is shared with the sibling
//! stream of the same process so callers can wait for "either channel
//! ready".

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::watch;

/// Default entry capacity for line-mode streams.
pub const DEFAULT_LINE_CAPACITY: usize = 1_000;

/// Default byte capacity for byte-mode streams.
pub const DEFAULT_BYTE_CAPACITY: usize = 128 * 1024;

/// Readiness predicate evaluated after each append.
///
/// Receives the full retained history (the just-appended entry is the back
/// element) and the just-appended entry. Returning true latches readiness
/// forever.
pub type ReadyFn<T> = Arc<dyn Fn(&VecDeque<T>, &T) -> bool + Send + Sync>;

/// One-shot broadcast latch.
///
/// Multiple waiters may block on [`ReadyLatch::wait`]; once [`set`] is
/// called all of them wake and every later wait resolves immediately.
/// Setting is idempotent.
///
/// [`set`]: ReadyLatch::set
#[derive(Clone)]
pub struct ReadyLatch {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadyLatch {
    /// Creates a new, untripped latch.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trips the latch, waking all waiters. Idempotent.
    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// Returns whether the latch has tripped.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until the latch trips. Resolves immediately if already set.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so wait_for cannot observe a closed
        // channel while we are borrowed.
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for ReadyLatch {
    fn default() -> Self {
        Self::new()
    }
}

struct StreamBuf<T> {
    entries: VecDeque<T>,
    removed: u64,
}

struct StreamInner<T> {
    capacity: usize,
    ready_fn: Option<ReadyFn<T>>,
    ready: ReadyLatch,
    any_ready: ReadyLatch,
    buf: std::sync::Mutex<StreamBuf<T>>,
}

/// Bounded, append-only history of one stdio channel.
///
/// Cloning is cheap and yields a handle to the same stream. There is a
/// single appender per stream (the owning host backend); readers observe
/// entries in append order via [`snapshot`].
///
/// [`snapshot`]: OutputStream::snapshot
pub struct OutputStream<T> {
    inner: Arc<StreamInner<T>>,
}

impl<T> Clone for OutputStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> OutputStream<T> {
    /// Creates a stream with the given capacity and predicate, sharing the
    /// `any_ready` latch with its sibling.
    pub(crate) fn new(
        capacity: usize,
        ready_fn: Option<ReadyFn<T>>,
        any_ready: ReadyLatch,
    ) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                capacity: capacity.max(1),
                ready_fn,
                ready: ReadyLatch::new(),
                any_ready,
                buf: std::sync::Mutex::new(StreamBuf {
                    entries: VecDeque::new(),
                    removed: 0,
                }),
            }),
        }
    }

    /// Appends a single entry. Never fails; overflow evicts from the front.
    pub(crate) fn push(&self, entry: T) {
        self.extend(std::iter::once(entry));
    }

    /// Appends a batch of entries under one lock acquisition, evaluating
    /// the ready predicate for each.
    pub(crate) fn extend(&self, entries: impl IntoIterator<Item = T>) {
        let mut trip = false;
        if let Ok(mut buf) = self.inner.buf.lock() {
            for entry in entries {
                buf.entries.push_back(entry);
                while buf.entries.len() > self.inner.capacity {
                    buf.entries.pop_front();
                    buf.removed += 1;
                }
                if trip || self.inner.ready.is_set() {
                    continue;
                }
                if let Some(last) = buf.entries.back() {
                    trip = match &self.inner.ready_fn {
                        Some(ready) => ready(&buf.entries, last),
                        // Default criterion: ready on first append.
                        None => true,
                    };
                }
            }
        }
        if trip {
            self.mark_ready();
        }
    }

    /// Advances the eviction counter past entries that will never be
    /// appended, so the logical index of the next append matches
    /// `server_removed`. Used by remote mirrors when the peer evicted
    /// history before it could be replicated.
    pub(crate) fn align_removed(&self, server_removed: u64) {
        if let Ok(mut buf) = self.inner.buf.lock() {
            let logical = buf.removed + buf.entries.len() as u64;
            if server_removed > logical {
                buf.removed += server_removed - logical;
            }
        }
    }

    /// Forces the ready latch (and the shared any-ready latch). Called when
    /// the owning process exits. Idempotent.
    pub fn mark_ready(&self) {
        self.inner.ready.set();
        self.inner.any_ready.set();
    }

    /// Returns a snapshot of the retained entries, in append order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.inner
            .buf
            .lock()
            .map(|buf| buf.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the eviction count and the retained entries, read together
    /// under one lock so the pair is consistent.
    #[must_use]
    pub fn snapshot_with_offset(&self) -> (u64, Vec<T>) {
        self.inner
            .buf
            .lock()
            .map(|buf| (buf.removed, buf.entries.iter().cloned().collect()))
            .unwrap_or((0, Vec::new()))
    }

    /// Number of entries evicted from the front so far.
    #[must_use]
    pub fn entries_removed(&self) -> u64 {
        self.inner.buf.lock().map(|buf| buf.removed).unwrap_or(0)
    }

    /// Number of currently retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .buf
            .lock()
            .map(|buf| buf.entries.len())
            .unwrap_or(0)
    }

    /// Returns true if no entries are currently retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of entries ever appended (or skipped by offset
    /// alignment): `entries_removed + len`. Monotonically non-decreasing;
    /// this is the *real offset* of the next expected entry.
    #[must_use]
    pub fn logical_length(&self) -> u64 {
        self.inner
            .buf
            .lock()
            .map(|buf| buf.removed + buf.entries.len() as u64)
            .unwrap_or(0)
    }

    /// Maximum number of retained entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Returns whether this stream's ready latch has tripped.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.ready.is_set()
    }

    /// Waits until this stream's ready latch trips.
    pub async fn wait_ready(&self) {
        self.inner.ready.wait().await;
    }

    /// The latch shared with the sibling stream; trips when either trips.
    #[must_use]
    pub fn any_ready(&self) -> &ReadyLatch {
        &self.inner.any_ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_stream(capacity: usize, ready_fn: Option<ReadyFn<String>>) -> OutputStream<String> {
        OutputStream::new(capacity, ready_fn, ReadyLatch::new())
    }

    #[test]
    fn eviction_keeps_logical_length() {
        let stream = line_stream(3, None);
        for entry in ["a", "b", "c", "d", "e"] {
            stream.push(entry.to_string());
        }

        assert_eq!(stream.snapshot(), vec!["c", "d", "e"]);
        assert_eq!(stream.entries_removed(), 2);
        assert_eq!(stream.logical_length(), 5);
        assert_eq!(stream.len(), 3);
    }

    #[test]
    fn logical_length_is_monotone() {
        let stream = line_stream(2, None);
        let mut last = 0;
        for i in 0..10 {
            stream.push(format!("line {i}"));
            let logical = stream.logical_length();
            assert!(logical > last);
            assert!(stream.len() <= stream.capacity());
            assert_eq!(stream.entries_removed() + stream.len() as u64, logical);
            last = logical;
        }
    }

    #[test]
    fn default_predicate_trips_on_first_append() {
        let stream = line_stream(10, None);
        assert!(!stream.is_ready());
        stream.push("anything".to_string());
        assert!(stream.is_ready());
    }

    #[test]
    fn marker_predicate_trips_once_and_latches() {
        let ready: ReadyFn<String> =
            Arc::new(|_, line| line.contains("ready to accept connections"));
        let stream = line_stream(10, Some(ready));

        stream.push("starting up".to_string());
        assert!(!stream.is_ready());
        stream.push("database system is ready to accept connections".to_string());
        assert!(stream.is_ready());
        stream.push("shutting down".to_string());
        assert!(stream.is_ready());
    }

    #[test]
    fn mark_ready_is_idempotent_and_trips_any() {
        let any = ReadyLatch::new();
        let stream: OutputStream<String> = OutputStream::new(
            10,
            Some(Arc::new(
                (|_, _| false) as fn(&VecDeque<String>, &String) -> bool,
            ) as ReadyFn<String>),
            any.clone(),
        );

        assert!(!any.is_set());
        stream.mark_ready();
        stream.mark_ready();
        assert!(stream.is_ready());
        assert!(any.is_set());
    }

    #[test]
    fn sibling_any_latch_trips_when_either_trips() {
        let any = ReadyLatch::new();
        let stdout: OutputStream<String> = OutputStream::new(10, None, any.clone());
        let stderr: OutputStream<String> = OutputStream::new(
            10,
            Some(Arc::new(
                (|_, _| false) as fn(&VecDeque<String>, &String) -> bool,
            ) as ReadyFn<String>),
            any.clone(),
        );

        stderr.push("noise".to_string());
        assert!(!any.is_set());
        stdout.push("out".to_string());
        assert!(any.is_set());
        assert!(!stderr.is_ready());
    }

    #[test]
    fn align_removed_skips_unseen_prefix() {
        let stream = line_stream(100, None);
        stream.align_removed(10);
        assert_eq!(stream.entries_removed(), 10);
        assert_eq!(stream.logical_length(), 10);

        for i in 10..15 {
            stream.push(format!("E{i}"));
        }
        assert_eq!(stream.logical_length(), 15);

        // Alignment behind the current offset is a no-op.
        stream.align_removed(12);
        assert_eq!(stream.logical_length(), 15);
        assert_eq!(stream.snapshot().len(), 5);
    }

    #[test]
    fn byte_stream_counts_bytes() {
        let stream: OutputStream<u8> = OutputStream::new(4, None, ReadyLatch::new());
        stream.extend(b"hello".iter().copied());
        assert_eq!(stream.snapshot(), b"ello".to_vec());
        assert_eq!(stream.entries_removed(), 1);
        assert_eq!(stream.logical_length(), 5);
    }

    #[tokio::test]
    async fn latch_wakes_multiple_waiters() {
        let latch = ReadyLatch::new();
        let (a, b) = (latch.clone(), latch.clone());

        let wait_a = tokio::spawn(async move { a.wait().await });
        let wait_b = tokio::spawn(async move { b.wait().await });
        tokio::task::yield_now().await;

        latch.set();
        wait_a.await.expect("waiter a");
        wait_b.await.expect("waiter b");
        assert!(latch.is_set());
    }
}
