//! Post-start container ID probe.

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{CIDFILE_DELAY_STEP, CIDFILE_INITIAL_DELAY, CIDFILE_MAX_DELAY};

/// Waits for a cidfile to exist with more than one byte of content and
/// returns the trimmed container ID.
///
/// Polls with a linearly growing delay (10 ms start, +10 ms per retry,
/// capped at 1 s) until `timeout` elapses. Returns `None` when the file
/// never materializes; callers fall back to a `docker ps` lookup.
pub(crate) async fn await_cidfile(path: &Path, timeout: Duration) -> Option<String> {
    let deadline = Instant::now() + timeout;
    let mut delay = CIDFILE_INITIAL_DELAY;

    loop {
        if let Ok(contents) = tokio::fs::read_to_string(path).await {
            let id = contents.trim();
            if id.len() > 1 {
                return Some(id.to_string());
            }
        }

        if Instant::now() >= deadline {
            return None;
        }

        tokio::time::sleep(delay).await;
        delay = (delay + CIDFILE_DELAY_STEP).min(CIDFILE_MAX_DELAY);
    }
}
