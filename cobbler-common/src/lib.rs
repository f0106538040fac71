//! Shared building blocks for the cobbler agent (`cobblerd`) and tool (`cobbler`).
//!
//! - [`api`]: HTTP wire contract spoken between the tool and every agent
//! - [`discovery`]: the Discovery Backend seam plus the typed [`ServiceEntry`]
//! - [`mdns`]: the multicast DNS implementation of that seam

pub mod api;
pub mod discovery;
pub mod mdns;

pub use discovery::{
    collect_entries, dedup_entries, discover_agents, instance_name, Advertisement,
    DiscoveryBackend, DiscoveryError, ServiceEntry, ServiceRegistration,
};
pub use mdns::MdnsBackend;

/// DNS-SD service type advertised by every agent.
pub const SERVICE_TYPE: &str = "_cobbler._tcp";

/// DNS-SD domain used for both registration and browsing.
pub const SERVICE_DOMAIN: &str = "local.";

/// Port an agent listens on when nothing else is configured.
pub const DEFAULT_AGENT_PORT: u16 = 8080;
