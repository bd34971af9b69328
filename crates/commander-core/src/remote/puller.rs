//! Offset-based output replication.

use std::time::Duration;

use crate::process::{Process, ProcessOutput};
use crate::rpc::{OutputChunk, OutputEntries};

/// Which stdio channel a puller replicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputChannel {
    Stdout,
    Stderr,
}

impl OutputChannel {
    pub(crate) fn path(self) -> &'static str {
        match self {
            Self::Stdout => "/stdout",
            Self::Stderr => "/stderr",
        }
    }
}

/// Sleep before the next poll, by number of consecutive empty replies.
///
/// Fresh data polls again after 50 ms; each empty reply stretches the
/// sleep by 100 ms up to the 10 s ceiling. Any non-empty reply resets the
/// counter.
pub(crate) fn pull_delay(consecutive_empty: u32) -> Duration {
    match consecutive_empty {
        0 => Duration::from_millis(50),
        k @ 1..=100 => Duration::from_millis(u64::from(k) * 100),
        _ => Duration::from_secs(10),
    }
}

/// The mirror's next expected entry index for a channel.
pub(crate) fn real_offset(process: &Process, channel: OutputChannel) -> u64 {
    match (process.output(), channel) {
        (ProcessOutput::Lines { stdout, .. }, OutputChannel::Stdout) => stdout.logical_length(),
        (ProcessOutput::Lines { stderr, .. }, OutputChannel::Stderr) => stderr.logical_length(),
        (ProcessOutput::Bytes { stdout, .. }, OutputChannel::Stdout) => stdout.logical_length(),
        (ProcessOutput::Bytes { stderr, .. }, OutputChannel::Stderr) => stderr.logical_length(),
    }
}

/// Applies one reply to the mirror stream: aligns the eviction horizon,
/// then appends the carried entries. Returns how many entries landed.
pub(crate) fn apply_chunk(process: &Process, channel: OutputChannel, chunk: &OutputChunk) -> usize {
    let Some(entries) = &chunk.entries else {
        return 0;
    };

    match (process.output(), channel, entries) {
        (ProcessOutput::Lines { stdout, .. }, OutputChannel::Stdout, OutputEntries::Lines(lines))
        | (
            ProcessOutput::Lines { stderr: stdout, .. },
            OutputChannel::Stderr,
            OutputEntries::Lines(lines),
        ) => {
            if let Some(removed) = chunk.removed {
                stdout.align_removed(removed);
            }
            stdout.extend(lines.iter().cloned());
            lines.len()
        }
        (ProcessOutput::Bytes { stdout, .. }, OutputChannel::Stdout, OutputEntries::Bytes(bytes))
        | (
            ProcessOutput::Bytes { stderr: stdout, .. },
            OutputChannel::Stderr,
            OutputEntries::Bytes(bytes),
        ) => {
            if let Some(removed) = chunk.removed {
                stdout.align_removed(removed);
            }
            stdout.extend(bytes.iter().copied());
            bytes.len()
        }
        // An empty untagged array decodes as lines regardless of mode.
        (_, _, entries) if entries.is_empty() => 0,
        _ => {
            tracing::warn!(channel = ?channel, "output entries do not match the mirror's capture mode");
            0
        }
    }
}
