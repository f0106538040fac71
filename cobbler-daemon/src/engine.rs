//! Status/Upgrade Engine
//!
//! Status is recomputed from the package manager on every request. Upgrades
//! are single-flight: the [`UpgradeGuard`] moves `Idle -> Upgrading` through a
//! compare-and-swap only, and the [`UpgradeTicket`] handed to the detached
//! upgrade task moves it back when dropped, whether the upgrade succeeded,
//! failed or panicked.

use cobbler_common::api::StatusResponse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::packages::{PackageError, PackageManager};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("the system is not a Debian-based Linux system")]
    UnsupportedPlatform,
    #[error("a full upgrade is currently running")]
    UpgradeInProgress,
    #[error("Failed to check for updates: {0}")]
    Packages(#[from] PackageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    Idle,
    Upgrading,
}

/// Process-wide upgrade flag, `Idle` at startup.
#[derive(Debug, Clone, Default)]
pub struct UpgradeGuard {
    upgrading: Arc<AtomicBool>,
}

impl UpgradeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> UpgradeState {
        if self.upgrading.load(Ordering::SeqCst) {
            UpgradeState::Upgrading
        } else {
            UpgradeState::Idle
        }
    }

    pub fn is_upgrading(&self) -> bool {
        self.state() == UpgradeState::Upgrading
    }

    /// `Idle -> Upgrading`, or `None` if an upgrade already holds the guard.
    pub fn try_begin(&self) -> Option<UpgradeTicket> {
        self.upgrading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| UpgradeTicket {
                upgrading: Arc::clone(&self.upgrading),
            })
    }
}

/// Proof of holding the guard; dropping it returns the guard to `Idle`.
#[derive(Debug)]
pub struct UpgradeTicket {
    upgrading: Arc<AtomicBool>,
}

impl Drop for UpgradeTicket {
    fn drop(&mut self) {
        self.upgrading.store(false, Ordering::SeqCst);
    }
}

pub struct UpdateEngine {
    packages: Arc<dyn PackageManager>,
    guard: UpgradeGuard,
}

impl UpdateEngine {
    pub fn new(packages: Arc<dyn PackageManager>) -> Self {
        Self {
            packages,
            guard: UpgradeGuard::new(),
        }
    }

    pub fn guard(&self) -> &UpgradeGuard {
        &self.guard
    }

    /// Fresh package status. Never waits on an in-flight upgrade.
    pub async fn status(&self) -> Result<StatusResponse, EngineError> {
        if !self.packages.is_supported().await {
            return Err(EngineError::UnsupportedPlatform);
        }

        if let Err(e) = self.packages.refresh_index().await {
            warn!("index refresh failed, listing from the current index: {}", e);
        }
        let updates = self.packages.list_upgradable().await?;

        Ok(StatusResponse::from_updates(updates, self.guard.is_upgrading()))
    }

    /// Start a full upgrade in the background and return immediately.
    ///
    /// Rejected with [`EngineError::UpgradeInProgress`] without spawning
    /// anything if another upgrade holds the guard.
    pub async fn trigger_full_upgrade(&self) -> Result<(), EngineError> {
        if !self.packages.is_supported().await {
            return Err(EngineError::UnsupportedPlatform);
        }

        let ticket = self
            .guard
            .try_begin()
            .ok_or(EngineError::UpgradeInProgress)?;

        let packages = Arc::clone(&self.packages);
        tokio::spawn(async move {
            let _ticket = ticket;
            info!("starting full upgrade");
            match packages.full_upgrade().await {
                Ok(()) => info!("full upgrade completed successfully"),
                Err(e) => error!("full upgrade failed: {}", e),
            }
        });

        Ok(())
    }
}
