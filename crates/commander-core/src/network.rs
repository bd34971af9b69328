//! Per-host network registry.
//!
//! Tracks which containers sit on which docker network so that new runners
//! can be started with `--add-host` entries for every sibling, and existing
//! siblings can have their `/etc/hosts` patched when a new runner joins.

use std::collections::HashMap;
use std::sync::RwLock;

/// A container's resolvable identity on one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPeer {
    /// Container name.
    pub container_name: String,
    /// Hostname siblings resolve it by.
    pub hostname: String,
    /// Address on the network.
    pub ip: String,
}

/// Map of `network → container_name → (hostname, ip)`.
///
/// Flat by construction: peers reference each other only through this map,
/// never through one another.
#[derive(Default)]
pub struct NetworkRegistry {
    networks: RwLock<HashMap<String, HashMap<String, (String, String)>>>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a container coming up on a network.
    pub fn insert(&self, network: &str, container_name: &str, hostname: &str, ip: &str) {
        if let Ok(mut networks) = self.networks.write() {
            networks.entry(network.to_string()).or_default().insert(
                container_name.to_string(),
                (hostname.to_string(), ip.to_string()),
            );
        }
    }

    /// Returns every known peer on a network, excluding `exclude` when
    /// given. Order is stable (sorted by container name) so downstream
    /// argv synthesis is deterministic.
    #[must_use]
    pub fn peers(&self, network: &str, exclude: Option<&str>) -> Vec<NetworkPeer> {
        let mut peers: Vec<NetworkPeer> = self
            .networks
            .read()
            .ok()
            .and_then(|networks| {
                networks.get(network).map(|containers| {
                    containers
                        .iter()
                        .filter(|(name, _)| Some(name.as_str()) != exclude)
                        .map(|(name, (hostname, ip))| NetworkPeer {
                            container_name: name.clone(),
                            hostname: hostname.clone(),
                            ip: ip.clone(),
                        })
                        .collect()
                })
            })
            .unwrap_or_default();
        peers.sort_by(|a, b| a.container_name.cmp(&b.container_name));
        peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peers_are_sorted_and_exclude_self() {
        let registry = NetworkRegistry::new();
        registry.insert("backend", "zeta", "zeta-host", "172.18.0.3");
        registry.insert("backend", "alpha", "alpha-host", "172.18.0.2");
        registry.insert("other", "gamma", "gamma-host", "172.19.0.2");

        let peers = registry.peers("backend", Some("alpha"));
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].container_name, "zeta");
        assert_eq!(peers[0].hostname, "zeta-host");
        assert_eq!(peers[0].ip, "172.18.0.3");

        let all = registry.peers("backend", None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].container_name, "alpha");
        assert_eq!(all[1].container_name, "zeta");
    }

    #[test]
    fn unknown_network_has_no_peers() {
        let registry = NetworkRegistry::new();
        assert!(registry.peers("missing", None).is_empty());
    }

    #[test]
    fn reinsert_overwrites_address() {
        let registry = NetworkRegistry::new();
        registry.insert("net", "c1", "c1", "172.18.0.2");
        registry.insert("net", "c1", "c1", "172.18.0.9");

        let peers = registry.peers("net", None);
        assert_eq!(peers[0].ip, "172.18.0.9");
    }
}
