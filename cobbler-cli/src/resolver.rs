//! Target Resolver
//!
//! Turns what the operator asked for into the set of agents to contact.
//! Exactly one source is used per invocation:
//!
//! 1. explicit targets, when any are given
//! 2. discovery results, when `--all` was requested
//! 3. the persisted node list otherwise
//!
//! Credentials always come from the node list, matched by normalized
//! address only. Names and discovery ids are never used for matching.

use cobbler_common::ServiceEntry;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::address::{authority, normalize_address};
use crate::config::NodeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOrigin {
    Explicit,
    Configured,
    Discovered,
}

impl fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetOrigin::Explicit => "explicit",
            TargetOrigin::Configured => "configured",
            TargetOrigin::Discovered => "discovered",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Normalized `host:port`.
    pub address: String,
    pub display_name: Option<String>,
    pub api_key: Option<String>,
    pub origin: TargetOrigin,
}

impl Target {
    /// Name for output: the display name, else the address.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.address)
    }
}

/// Resolve targets. `discovered` is `Some` when the operator asked for
/// discovery, even if it found nothing.
///
/// Never fails: empty inputs resolve to an empty set.
pub fn resolve_targets(
    explicit: &[String],
    nodes: &[NodeConfig],
    discovered: Option<&[ServiceEntry]>,
) -> Vec<Target> {
    let configured_node = |address: &str| {
        nodes
            .iter()
            .find(|node| normalize_address(&node.address) == address)
    };

    let targets: Vec<Target> = if !explicit.is_empty() {
        explicit
            .iter()
            .map(|raw| {
                let address = normalize_address(raw);
                let node = configured_node(&address);
                Target {
                    display_name: node.and_then(|n| n.name.clone()),
                    api_key: node.and_then(|n| n.api_key.clone()),
                    address,
                    origin: TargetOrigin::Explicit,
                }
            })
            .collect()
    } else if let Some(entries) = discovered {
        entries
            .iter()
            .filter_map(|entry| {
                let Some(socket) = entry.primary_socket_addr() else {
                    debug!("{} announced no address, skipping", entry.instance_name);
                    return None;
                };
                let address = authority(socket.ip(), socket.port());
                let display_name = if entry.id.is_empty() {
                    entry.instance_name.clone()
                } else {
                    entry.id.clone()
                };
                Some(Target {
                    api_key: configured_node(&address).and_then(|n| n.api_key.clone()),
                    display_name: Some(display_name),
                    address,
                    origin: TargetOrigin::Discovered,
                })
            })
            .collect()
    } else {
        nodes
            .iter()
            .map(|node| Target {
                address: normalize_address(&node.address),
                display_name: node.name.clone(),
                api_key: node.api_key.clone(),
                origin: TargetOrigin::Configured,
            })
            .collect()
    };

    dedup_by_address(targets)
}

fn dedup_by_address(targets: Vec<Target>) -> Vec<Target> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|target| seen.insert(target.address.clone()))
        .collect()
}
