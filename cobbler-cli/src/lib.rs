//! Operator tool for a fleet of cobbler agents.
//!
//! Resolution and fan-out are plain library code so they can be driven
//! against scripted discovery and mock agents in tests; `main.rs` only wires
//! the real mDNS backend, the environment and stdout.

pub mod address;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod fanout;
pub mod resolver;

pub use address::{authority, normalize_address};
pub use cli::{Cli, Commands};
pub use client::{AgentClient, OperationError};
pub use commands::App;
pub use config::{parse_timeout, resolve_config_path, ClientSettings, ConfigError, NodeConfig, NodeList};
pub use fanout::{FanOut, FanOutReport, OperationOutcome};
pub use resolver::{resolve_targets, Target, TargetOrigin};
