//! Multicast DNS implementation of [`DiscoveryBackend`] backed by `mdns-sd`.

use futures::stream::{self, BoxStream, StreamExt};
use mdns_sd::{Receiver, ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::discovery::{
    Advertisement, DiscoveryBackend, DiscoveryError, ServiceEntry, ServiceRegistration, TXT_ID_KEY,
};

/// Each registration and each browse session runs its own mDNS daemon thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct MdnsBackend;

impl MdnsBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DiscoveryBackend for MdnsBackend {
    fn register(
        &self,
        registration: &ServiceRegistration,
    ) -> Result<Box<dyn Advertisement>, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Daemon(e.to_string()))?;
        info!("mDNS daemon started");

        let ty_domain = service_domain(&registration.service_type, &registration.domain);
        let properties: HashMap<String, String> = registration.txt.iter().cloned().collect();

        info!("Registering mDNS service:");
        info!("  Instance: {}", registration.instance_name);
        info!("  Host: {}", registration.host_name);
        info!("  Port: {}", registration.port);

        let service = match registration.address {
            Some(ip) => {
                info!("Using explicit IP: {}", ip);
                ServiceInfo::new(
                    &ty_domain,
                    &registration.instance_name,
                    &registration.host_name,
                    ip,
                    registration.port,
                    properties,
                )
            }
            None => ServiceInfo::new(
                &ty_domain,
                &registration.instance_name,
                &registration.host_name,
                "",
                registration.port,
                properties,
            )
            .map(ServiceInfo::enable_addr_auto),
        }
        .map_err(|e| DiscoveryError::InvalidRecord(e.to_string()))?;

        let fullname = service.get_fullname().to_string();
        if let Err(e) = daemon.register(service) {
            let _ = daemon.shutdown();
            return Err(DiscoveryError::Register(e.to_string()));
        }

        info!("mDNS service registered successfully");
        Ok(Box::new(MdnsAdvertisement {
            daemon: Some(daemon),
            fullname,
        }))
    }

    fn browse(
        &self,
        service_type: &str,
        domain: &str,
        timeout: Duration,
    ) -> Result<BoxStream<'static, ServiceEntry>, DiscoveryError> {
        let ty_domain = service_domain(service_type, domain);
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Daemon(e.to_string()))?;
        let receiver = match daemon.browse(&ty_domain) {
            Ok(receiver) => receiver,
            Err(e) => {
                let _ = daemon.shutdown();
                return Err(DiscoveryError::Browse {
                    service: ty_domain,
                    reason: e.to_string(),
                });
            }
        };

        debug!("browsing {} for {:?}", ty_domain, timeout);
        let session = BrowseSession {
            daemon,
            receiver,
            suffix: format!(".{ty_domain}"),
            deadline: Instant::now() + timeout,
        };

        Ok(stream::unfold(session, |mut session| async move {
            let entry = session.next_entry().await?;
            Some((entry, session))
        })
        .boxed())
    }
}

struct MdnsAdvertisement {
    daemon: Option<ServiceDaemon>,
    fullname: String,
}

impl Advertisement for MdnsAdvertisement {
    fn shutdown(&mut self) {
        let Some(daemon) = self.daemon.take() else {
            return;
        };
        if let Err(e) = daemon.unregister(&self.fullname) {
            warn!("mDNS unregister error: {}", e);
        }
        if let Err(e) = daemon.shutdown() {
            error!("mDNS shutdown error: {}", e);
        }
        info!("mDNS advertisement withdrawn");
    }
}

impl Drop for MdnsAdvertisement {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct BrowseSession {
    daemon: ServiceDaemon,
    receiver: Receiver<ServiceEvent>,
    suffix: String,
    deadline: Instant,
}

impl BrowseSession {
    async fn next_entry(&mut self) -> Option<ServiceEntry> {
        loop {
            let event = match tokio::time::timeout_at(self.deadline, self.receiver.recv_async()).await {
                Err(_) => return None,
                Ok(Err(e)) => {
                    warn!("browse: receiver disconnected: {}", e);
                    return None;
                }
                Ok(Ok(event)) => event,
            };

            match event {
                ServiceEvent::ServiceResolved(info) => return Some(self.entry_from(&info)),
                ServiceEvent::SearchStopped(service) => {
                    debug!("search stopped for {}", service);
                    return None;
                }
                _ => {}
            }
        }
    }

    fn entry_from(&self, info: &ServiceInfo) -> ServiceEntry {
        let fullname = info.get_fullname();
        let instance = fullname.strip_suffix(&self.suffix).unwrap_or(fullname);
        let id = info.get_property_val_str(TXT_ID_KEY).map(str::to_string);
        ServiceEntry::new(
            instance,
            info.get_hostname(),
            info.get_addresses().iter().copied(),
            info.get_port(),
            id,
        )
    }
}

impl Drop for BrowseSession {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            debug!("mDNS shutdown after browse: {}", e);
        }
    }
}

/// `_cobbler._tcp` + `local.` -> `_cobbler._tcp.local.`
fn service_domain(service_type: &str, domain: &str) -> String {
    format!("{}.{}", service_type.trim_end_matches('.'), domain)
}
