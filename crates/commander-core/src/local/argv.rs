//! Argv synthesis for `docker create` / `docker run`.

use std::path::Path;

use crate::network::NetworkPeer;

/// Everything needed to build a container creation argv. Ports must
/// already be normalized.
pub(crate) struct ContainerArgSpec<'a> {
    pub verb: &'a str,
    pub name: &'a str,
    pub ports: &'a [String],
    pub network: Option<&'a str>,
    pub peers: &'a [NetworkPeer],
    pub hostname: Option<&'a str>,
    pub volumes: &'a [(String, String)],
    pub env: &'a [(String, String)],
    pub clean_container: bool,
    pub cidfile: &'a Path,
    pub image_ref: &'a str,
    pub image_args: &'a [String],
}

/// Builds the docker argv for a container creation. Deterministic for a
/// fixed spec; flag order is part of the contract.
pub(crate) fn build_container_args(spec: &ContainerArgSpec<'_>) -> Vec<String> {
    let mut args = Vec::with_capacity(
        8 + spec.ports.len() * 2
            + spec.peers.len() * 2
            + spec.volumes.len() * 2
            + spec.env.len() * 2
            + spec.image_args.len(),
    );

    args.push(spec.verb.to_string());
    args.push("--name".to_string());
    args.push(spec.name.to_string());

    for port in spec.ports {
        args.push("-p".to_string());
        args.push(port.clone());
    }

    if let Some(network) = spec.network {
        args.push("--net".to_string());
        args.push(network.to_string());
        for peer in spec.peers {
            args.push("--add-host".to_string());
            args.push(format!("{}:{}", peer.hostname, peer.ip));
        }
    }

    if let Some(hostname) = spec.hostname {
        args.push("-h".to_string());
        args.push(hostname.to_string());
    }

    for (host_path, container_path) in spec.volumes {
        if host_path.is_empty() || container_path.is_empty() {
            continue;
        }
        args.push("-v".to_string());
        args.push(format!("{host_path}:{container_path}"));
    }

    for (key, value) in spec.env {
        if key.is_empty() {
            continue;
        }
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }

    if spec.clean_container {
        args.push("--rm".to_string());
    }

    args.push("--cidfile".to_string());
    args.push(spec.cidfile.display().to_string());
    args.push(spec.image_ref.to_string());
    args.extend(spec.image_args.iter().cloned());

    args
}
