//! Discovery Backend seam and the typed records it produces
//!
//! Agents register one service record each; the tool browses for a bounded
//! window and receives a finite stream of [`ServiceEntry`] values. Repeated
//! announcements of the same instance are expected and collapsed by
//! [`dedup_entries`] or [`collect_entries`].

pub use futures::stream::BoxStream;

use futures::stream::StreamExt;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{SERVICE_DOMAIN, SERVICE_TYPE};

/// TXT attribute carrying the agent's full hostname.
pub const TXT_ID_KEY: &str = "id";

const INSTANCE_PREFIX: &str = "cobblerd-";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to start mDNS daemon: {0}")]
    Daemon(String),
    #[error("invalid service record: {0}")]
    InvalidRecord(String),
    #[error("failed to register service: {0}")]
    Register(String),
    #[error("failed to browse {service}: {reason}")]
    Browse { service: String, reason: String },
}

/// An agent announcement seen while browsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    /// `cobblerd-<first hostname label>`
    pub instance_name: String,
    /// Instance + service type + domain, the unit of deduplication.
    pub fullname: String,
    pub hostname: String,
    /// IPv4 addresses first, then IPv6, each group sorted.
    pub addresses: Vec<IpAddr>,
    pub port: u16,
    /// Value of the `id=` TXT attribute, empty when the record has none.
    pub id: String,
}

impl ServiceEntry {
    pub fn new(
        instance_name: impl Into<String>,
        hostname: impl Into<String>,
        addresses: impl IntoIterator<Item = IpAddr>,
        port: u16,
        id: Option<String>,
    ) -> Self {
        let instance_name = instance_name.into();
        let fullname = fullname(&instance_name, SERVICE_TYPE, SERVICE_DOMAIN);
        let hostname = hostname.into().trim_end_matches('.').to_string();

        let mut v4: Vec<IpAddr> = Vec::new();
        let mut v6: Vec<IpAddr> = Vec::new();
        for addr in addresses {
            let bucket = if addr.is_ipv4() { &mut v4 } else { &mut v6 };
            if !bucket.contains(&addr) {
                bucket.push(addr);
            }
        }
        v4.sort();
        v6.sort();
        v4.extend(v6);

        Self {
            instance_name,
            fullname,
            hostname,
            addresses: v4,
            port,
            id: id.unwrap_or_default(),
        }
    }

    /// Address used when this entry becomes an operation target.
    ///
    /// The first routable address wins. A link-local address is only used
    /// when nothing else was announced.
    pub fn primary_socket_addr(&self) -> Option<SocketAddr> {
        let ip = match self.addresses.iter().find(|ip| !is_link_local(ip)) {
            Some(ip) => ip,
            None => {
                let ip = self.addresses.first()?;
                warn!(
                    "{} only announced link-local addresses, {} may be unreachable without a scope id",
                    self.instance_name, ip
                );
                ip
            }
        };
        Some(SocketAddr::new(*ip, self.port))
    }

    /// Comma separated address list, IPv4 before IPv6.
    pub fn addresses_display(&self) -> String {
        self.addresses
            .iter()
            .map(|addr| addr.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// What an agent advertises about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    pub service_type: String,
    pub domain: String,
    pub instance_name: String,
    /// mDNS host record, `<first label>.local.`
    pub host_name: String,
    pub port: u16,
    /// Publish only this address; `None` lets the backend publish every interface.
    pub address: Option<IpAddr>,
    pub txt: Vec<(String, String)>,
}

impl ServiceRegistration {
    /// Registration record for the agent running on `hostname`.
    pub fn for_agent(hostname: &str, port: u16, address: Option<IpAddr>) -> Self {
        let hostname = hostname.trim_end_matches('.');
        Self {
            service_type: SERVICE_TYPE.to_string(),
            domain: SERVICE_DOMAIN.to_string(),
            instance_name: instance_name(hostname),
            host_name: format!("{}.local.", first_label(hostname)),
            port,
            address,
            txt: vec![(TXT_ID_KEY.to_string(), hostname.to_string())],
        }
    }

    pub fn fullname(&self) -> String {
        fullname(&self.instance_name, &self.service_type, &self.domain)
    }
}

/// Handle to a live registration.
pub trait Advertisement: Send {
    /// Withdraw the record. Calling it again is a no-op.
    fn shutdown(&mut self);
}

/// Network discovery primitive the agent and the tool are written against.
pub trait DiscoveryBackend: Send + Sync {
    fn register(
        &self,
        registration: &ServiceRegistration,
    ) -> Result<Box<dyn Advertisement>, DiscoveryError>;

    /// Collect announcements for exactly `timeout`, then end the stream.
    ///
    /// The stream may repeat an instance; it cannot be restarted.
    fn browse(
        &self,
        service_type: &str,
        domain: &str,
        timeout: Duration,
    ) -> Result<BoxStream<'static, ServiceEntry>, DiscoveryError>;
}

/// Instance name for a host: `cobblerd-<first label>`.
pub fn instance_name(hostname: &str) -> String {
    format!("{INSTANCE_PREFIX}{}", first_label(hostname.trim_end_matches('.')))
}

fn first_label(hostname: &str) -> &str {
    hostname.split('.').next().unwrap_or(hostname)
}

/// `<instance>.<service type>.<domain>` with exactly one dot between parts.
pub fn fullname(instance: &str, service_type: &str, domain: &str) -> String {
    format!(
        "{}.{}.{}",
        instance,
        service_type.trim_end_matches('.'),
        domain.trim_end_matches('.')
    ) + "."
}

/// Collapse repeated announcements, keeping the first-seen entry per fullname.
pub fn dedup_entries(entries: impl IntoIterator<Item = ServiceEntry>) -> Vec<ServiceEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.fullname.clone()))
        .collect()
}

/// Drain a browse stream into a deduplicated list.
pub async fn collect_entries(mut stream: BoxStream<'static, ServiceEntry>) -> Vec<ServiceEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    while let Some(entry) = stream.next().await {
        if seen.insert(entry.fullname.clone()) {
            debug!("discovered {} at {}", entry.instance_name, entry.addresses_display());
            entries.push(entry);
        }
    }
    entries
}

/// Browse for cobbler agents, degrading setup failures to an empty result.
pub async fn discover_agents(backend: &dyn DiscoveryBackend, timeout: Duration) -> Vec<ServiceEntry> {
    match backend.browse(SERVICE_TYPE, SERVICE_DOMAIN, timeout) {
        Ok(stream) => collect_entries(stream).await,
        Err(e) => {
            warn!("discovery unavailable: {}", e);
            Vec::new()
        }
    }
}

// 169.254.0.0/16 and fe80::/10
fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn entry(instance: &str, ip: &str) -> ServiceEntry {
        ServiceEntry::new(instance, "pi.local.", [ip.parse().unwrap()], 8080, None)
    }

    #[test]
    fn test_instance_name_uses_first_label() {
        assert_eq!(instance_name("pi-01.lan.example"), "cobblerd-pi-01");
        assert_eq!(instance_name("pi-02"), "cobblerd-pi-02");
        assert_eq!(instance_name("pi-03.local."), "cobblerd-pi-03");
    }

    #[test]
    fn test_registration_for_agent() {
        let reg = ServiceRegistration::for_agent("pi-01.lan.", 8081, None);
        assert_eq!(reg.instance_name, "cobblerd-pi-01");
        assert_eq!(reg.host_name, "pi-01.local.");
        assert_eq!(reg.service_type, "_cobbler._tcp");
        assert_eq!(reg.domain, "local.");
        assert_eq!(reg.txt, vec![("id".to_string(), "pi-01.lan".to_string())]);
        assert_eq!(reg.fullname(), "cobblerd-pi-01._cobbler._tcp.local.");
    }

    #[test]
    fn test_entry_orders_ipv4_before_ipv6() {
        let addrs: Vec<IpAddr> = vec![
            "fe80::1".parse().unwrap(),
            "192.168.1.20".parse().unwrap(),
            "192.168.1.20".parse().unwrap(),
            "10.0.0.5".parse().unwrap(),
        ];
        let e = ServiceEntry::new("cobblerd-pi", "pi.local.", addrs, 8080, Some("pi".into()));
        assert_eq!(e.addresses_display(), "10.0.0.5,192.168.1.20,fe80::1");
        assert_eq!(e.hostname, "pi.local");
        assert_eq!(e.primary_socket_addr(), Some("10.0.0.5:8080".parse().unwrap()));
    }

    #[test]
    fn test_primary_addr_skips_link_local() {
        let addrs: Vec<IpAddr> = vec!["192.168.1.20".parse().unwrap(), "169.254.3.3".parse().unwrap()];
        let e = ServiceEntry::new("cobblerd-pi", "pi.local.", addrs, 8080, None);
        assert_eq!(e.addresses_display(), "169.254.3.3,192.168.1.20");
        assert_eq!(e.primary_socket_addr(), Some("192.168.1.20:8080".parse().unwrap()));

        let addrs: Vec<IpAddr> = vec!["fe80::1".parse().unwrap(), "2001:db8::5".parse().unwrap()];
        let e = ServiceEntry::new("cobblerd-pi", "pi.local.", addrs, 8080, None);
        assert_eq!(e.primary_socket_addr(), Some("[2001:db8::5]:8080".parse().unwrap()));
    }

    #[test]
    fn test_primary_addr_falls_back_to_link_local() {
        let e = entry("cobblerd-pi", "fe80::1");
        assert_eq!(e.primary_socket_addr(), Some("[fe80::1]:8080".parse().unwrap()));
        assert!(is_link_local(&"fe80::1".parse().unwrap()));
        assert!(!is_link_local(&"fec0::1".parse().unwrap()));
        assert!(!is_link_local(&"10.0.0.5".parse().unwrap()));
    }

    #[test]
    fn test_missing_id_is_empty() {
        let e = entry("cobblerd-pi", "10.0.0.5");
        assert_eq!(e.id, "");
    }

    #[test]
    fn test_dedup_keeps_first_seen() {
        let entries = vec![
            entry("cobblerd-a", "10.0.0.1"),
            entry("cobblerd-b", "10.0.0.2"),
            entry("cobblerd-a", "10.0.0.99"),
            entry("cobblerd-b", "10.0.0.2"),
            entry("cobblerd-c", "10.0.0.3"),
        ];
        let unique = dedup_entries(entries);
        assert_eq!(unique.len(), 3);
        assert_eq!(unique[0].addresses_display(), "10.0.0.1");
    }

    #[tokio::test]
    async fn test_collect_entries_dedups_stream() {
        let announcements = vec![
            entry("cobblerd-a", "10.0.0.1"),
            entry("cobblerd-a", "10.0.0.1"),
            entry("cobblerd-a", "10.0.0.1"),
            entry("cobblerd-b", "10.0.0.2"),
        ];
        let collected = collect_entries(stream::iter(announcements).boxed()).await;
        let names: Vec<_> = collected.iter().map(|e| e.instance_name.as_str()).collect();
        assert_eq!(names, vec!["cobblerd-a", "cobblerd-b"]);
    }
}
