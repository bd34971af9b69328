//! Wire types and parameter encodings for the remote control-plane dialect.
//!
//! Every operation is a GET with query-string parameters and a JSON
//! response. These types are shared by the remote client backend and the
//! server façade so both sides agree on field names byte for byte.

use serde::{Deserialize, Serialize};

/// Reply to `/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReply {
    /// Container name.
    #[serde(rename = "containerName")]
    pub container_name: String,
    /// Container ID, when the post-create probe succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Image reference.
    pub image: String,
    /// Normalized port mappings.
    pub ports: Vec<String>,
    /// Network, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Hostname, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Reply to `/run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReply {
    /// Server-side instance ID of the supervising process.
    #[serde(rename = "instanceID")]
    pub instance_id: u64,
    /// Container name.
    #[serde(rename = "containerName")]
    pub container_name: String,
    /// Container ID, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Reply to `/exec`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecReply {
    /// Server-side instance ID.
    #[serde(rename = "instanceID")]
    pub instance_id: u64,
    /// Container the command runs in.
    #[serde(rename = "containerName")]
    pub container_name: String,
}

/// Reply to `/command`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReply {
    /// Server-side instance ID.
    #[serde(rename = "instanceID")]
    pub instance_id: u64,
}

/// Entries carried by an output chunk: lines in line mode, raw bytes in
/// byte mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputEntries {
    /// Decoded text lines.
    Lines(Vec<String>),
    /// Raw bytes, one JSON number each.
    Bytes(Vec<u8>),
}

impl OutputEntries {
    /// Number of carried entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Lines(lines) => lines.len(),
            Self::Bytes(bytes) => bytes.len(),
        }
    }

    /// Returns true when no entries are carried.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reply to `/stdout` and `/stderr`.
///
/// For a known instance the reply always carries `length`, `removed` and
/// the `entries` from the requested offset on — including after exit, so
/// mirrors can drain the tail. A bare `{"running":false}` means the
/// instance is unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputChunk {
    /// Whether the process was still running when the reply was built.
    pub running: bool,
    /// Server-side logical stream length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    /// Server-side eviction count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<u64>,
    /// Entries from the requested offset on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<OutputEntries>,
}

impl OutputChunk {
    /// The reply for an unknown instance.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            running: false,
            length: None,
            removed: None,
            entries: None,
        }
    }
}

/// Encodes an ordered key/value map as a single query value:
/// `k=v,k2=v2`, with `%`, `,` and `=` percent-escaped inside keys and
/// values.
#[must_use]
pub fn encode_map(entries: &[(String, String)]) -> String {
    entries
        .iter()
        .map(|(key, value)| format!("{}={}", escape_component(key), escape_component(value)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decodes a map encoded by [`encode_map`]. Malformed items (no `=`) are
/// skipped.
#[must_use]
pub fn decode_map(encoded: &str) -> Vec<(String, String)> {
    encoded
        .split(',')
        .filter(|item| !item.is_empty())
        .filter_map(|item| {
            let (key, value) = item.split_once('=')?;
            Some((unescape_component(key), unescape_component(value)))
        })
        .collect()
}

/// Encodes a string list as a JSON array (used for `args`/`imageArgs`).
#[must_use]
pub fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Decodes a JSON array of strings; anything malformed decodes as empty.
#[must_use]
pub fn decode_list(encoded: &str) -> Vec<String> {
    serde_json::from_str(encoded).unwrap_or_default()
}

fn escape_component(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ',' => escaped.push_str("%2C"),
            '=' => escaped.push_str("%3D"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape_component(escaped: &str) -> String {
    urlencoding::decode(escaped)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| escaped.to_string())
}
