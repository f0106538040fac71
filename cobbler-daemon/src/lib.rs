//! Cobbler Daemon - per-node agent for package status and upgrade control
//!
//! The agent exposes two privileged HTTP routes and advertises itself over mDNS:
//! - `GET /status` re-queries the package index on every call
//! - `POST /packages/full-upgrade` starts a single-flight, fire-and-forget upgrade
//!
//! Every route sits behind the `X-API-Key` guard in [`auth`].

pub mod auth;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod http;
pub mod packages;

pub use auth::ApiKey;
pub use config::{DaemonArgs, DaemonSettings};
pub use engine::{EngineError, UpdateEngine, UpgradeGuard, UpgradeState};
pub use http::{build_router, AppState};
pub use packages::{Apt, PackageError, PackageManager};
