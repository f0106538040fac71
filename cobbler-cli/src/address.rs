//! Canonical `host:port` authorities for agent addresses.
//!
//! Every address the tool handles, typed or configured or discovered, is
//! reduced to one authority string before comparison or use in a URL:
//! IPv6 hosts are bracketed, a missing port becomes the default agent port,
//! and a leading `http://` or `https://` or a trailing `/` is dropped.
//! Agents only speak plain HTTP, so an `https://` prefix does not change the
//! scheme used.

use cobbler_common::DEFAULT_AGENT_PORT;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// `ip` and `port` as a URL authority, e.g. `[::1]:8080`.
pub fn authority(ip: IpAddr, port: u16) -> String {
    SocketAddr::new(ip, port).to_string()
}

/// Normalize an operator or config supplied address.
///
/// A bare IPv6 address is read as a host without a port, so
/// `fe80::1:8080` means host `fe80::1:8080` on the default port. Bracket
/// the host to give it a port.
///
/// A port that is present but not a valid `u16` is kept as typed. The
/// resulting URL is rejected when the request is built, so that target
/// fails on its own instead of reaching whatever listens on the default port.
pub fn normalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');

    if let Some(rest) = trimmed.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            return match tail.strip_prefix(':') {
                Some(port) if !port.is_empty() => format!("[{host}]:{port}"),
                Some(_) => format!("[{host}]:{DEFAULT_AGENT_PORT}"),
                None if tail.is_empty() => format!("[{host}]:{DEFAULT_AGENT_PORT}"),
                None => trimmed.to_string(),
            };
        }
    }

    if let Ok(ip) = trimmed.parse::<Ipv6Addr>() {
        return authority(IpAddr::V6(ip), DEFAULT_AGENT_PORT);
    }

    match trimmed.rsplit_once(':') {
        Some((host, "")) if !host.contains(':') => format!("{host}:{DEFAULT_AGENT_PORT}"),
        Some((host, port)) if !host.contains(':') => format!("{host}:{port}"),
        _ => format!("{trimmed}:{DEFAULT_AGENT_PORT}"),
    }
}

/// Base URL of the agent at a normalized authority.
pub fn base_url(authority: &str) -> String {
    format!("http://{authority}")
}
