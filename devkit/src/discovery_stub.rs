/*!
Scripted Discovery Backend

Stands in for mDNS: `browse` yields the scripted announcements in order and
then completes, `register` records what would have been advertised.
*/

use cobbler_common::discovery::BoxStream;
use cobbler_common::{
    Advertisement, DiscoveryBackend, DiscoveryError, ServiceEntry, ServiceRegistration,
};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
pub struct ScriptedDiscovery {
    announcements: Vec<ServiceEntry>,
    fail: bool,
    registrations: Arc<Mutex<Vec<ServiceRegistration>>>,
    browse_windows: Arc<Mutex<Vec<Duration>>>,
    withdrawn: Arc<Mutex<usize>>,
}

impl ScriptedDiscovery {
    /// Backend whose browse sessions replay `announcements` verbatim.
    pub fn new(announcements: impl IntoIterator<Item = ServiceEntry>) -> Self {
        Self {
            announcements: announcements.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Backend whose register and browse calls both fail, like a host
    /// without multicast.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn registrations(&self) -> Vec<ServiceRegistration> {
        self.registrations.lock().clone()
    }

    /// Window requested by each browse call, in call order.
    pub fn browse_windows(&self) -> Vec<Duration> {
        self.browse_windows.lock().clone()
    }

    /// Number of advertisements shut down so far.
    pub fn withdrawn(&self) -> usize {
        *self.withdrawn.lock()
    }
}

struct ScriptedAdvertisement {
    withdrawn: Arc<Mutex<usize>>,
    active: bool,
}

impl Advertisement for ScriptedAdvertisement {
    fn shutdown(&mut self) {
        if self.active {
            self.active = false;
            *self.withdrawn.lock() += 1;
        }
    }
}

impl DiscoveryBackend for ScriptedDiscovery {
    fn register(
        &self,
        registration: &ServiceRegistration,
    ) -> Result<Box<dyn Advertisement>, DiscoveryError> {
        if self.fail {
            return Err(DiscoveryError::Daemon("multicast unavailable".into()));
        }
        self.registrations.lock().push(registration.clone());
        Ok(Box::new(ScriptedAdvertisement {
            withdrawn: Arc::clone(&self.withdrawn),
            active: true,
        }))
    }

    fn browse(
        &self,
        service_type: &str,
        _domain: &str,
        timeout: Duration,
    ) -> Result<BoxStream<'static, ServiceEntry>, DiscoveryError> {
        if self.fail {
            return Err(DiscoveryError::Browse {
                service: service_type.to_string(),
                reason: "multicast unavailable".into(),
            });
        }
        self.browse_windows.lock().push(timeout);
        Ok(stream::iter(self.announcements.clone()).boxed())
    }
}
