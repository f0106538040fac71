use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::parse_timeout;

#[derive(Debug, Parser)]
#[command(name = "cobbler")]
#[command(about = "Discover cobbler daemons and manage their packages", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the node list file (default: ./.cobbler.yaml)
    #[arg(short, long, env = "COBBLER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Discover cobbler daemons on the local network
    Discover {
        /// How long to listen for announcements ("5", "10s", "1m").
        /// Defaults to COBBLER_TIMEOUT, then 5 seconds.
        #[arg(short, long, value_parser = parse_timeout)]
        timeout: Option<Duration>,

        /// Create and/or update the node list with newly found daemons
        #[arg(short = 'u', long = "update-config")]
        update_config: bool,
    },
    /// Show package status of cobbler daemons
    Status {
        /// Query every daemon found on the local network
        #[arg(short, long)]
        all: bool,

        /// Targets (host:port)
        targets: Vec<String>,
    },
    /// Manage packages on cobbler daemons
    Packages {
        /// Perform a full system upgrade
        #[arg(long, required = true)]
        full_upgrade: bool,

        /// Upgrade every daemon found on the local network
        #[arg(short, long)]
        all: bool,

        /// Targets (host:port)
        #[arg(num_args = 0..)]
        targets: Vec<String>,
    },
}
