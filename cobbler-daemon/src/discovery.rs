//! Host identification and mDNS advertisement of this agent.

use cobbler_common::{Advertisement, DiscoveryBackend, ServiceRegistration};
use std::net::IpAddr;
use tracing::{error, info};

/// System hostname, or `unknown` when it cannot be read as UTF-8.
pub fn system_hostname() -> String {
    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    if hostname.trim().is_empty() {
        "unknown".to_string()
    } else {
        hostname
    }
}

/// Advertise this agent. Failure is logged and the agent keeps serving HTTP
/// without discoverability.
pub fn advertise(
    backend: &dyn DiscoveryBackend,
    hostname: &str,
    port: u16,
    ip: Option<IpAddr>,
) -> Option<Box<dyn Advertisement>> {
    let registration = ServiceRegistration::for_agent(hostname, port, ip);
    match backend.register(&registration) {
        Ok(handle) => {
            info!("advertising {} on port {}", registration.fullname(), port);
            Some(handle)
        }
        Err(e) => {
            error!("mDNS disabled: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cobbler_devkit::ScriptedDiscovery;

    #[test]
    fn test_system_hostname_not_empty() {
        assert!(!system_hostname().is_empty());
    }

    #[test]
    fn test_advertise_registers_agent_record() {
        let backend = ScriptedDiscovery::new([]);
        let mut handle = advertise(&backend, "pi-01.lan", 8081, None).unwrap();

        let registered = backend.registrations();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].instance_name, "cobblerd-pi-01");
        assert_eq!(registered[0].host_name, "pi-01.local.");
        assert_eq!(registered[0].port, 8081);
        assert_eq!(registered[0].txt, vec![("id".to_string(), "pi-01.lan".to_string())]);

        handle.shutdown();
        handle.shutdown();
        assert_eq!(backend.withdrawn(), 1);
    }

    #[test]
    fn test_advertise_failure_is_not_fatal() {
        let backend = ScriptedDiscovery::failing();
        assert!(advertise(&backend, "pi-01", 8080, None).is_none());
    }
}
