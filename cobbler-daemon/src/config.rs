//! Agent settings: command-line flags layered over environment variables.
//!
//! Invalid environment values never abort startup. They fall back to the
//! default and are returned as warnings for the caller to log.

use clap::Parser;
use std::net::IpAddr;

use crate::auth::ApiKey;
use crate::discovery::system_hostname;

pub const ENV_PORT: &str = "COBBLER_DAEMON_PORT";
pub const ENV_HOSTNAME: &str = "COBBLER_DAEMON_HOSTNAME";
pub const ENV_IP: &str = "COBBLER_DAEMON_IP";
pub const ENV_API_KEY: &str = "COBBLER_DAEMON_API_KEY";

#[derive(Debug, Default, Parser)]
#[command(name = "cobblerd")]
#[command(about = "Cobbler daemon", long_about = None)]
pub struct DaemonArgs {
    /// Port to listen on. If not specified, the daemon will search for a free port starting from 8080.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Hostname to use for mDNS registration. Defaults to the system hostname.
    #[arg(long)]
    pub hostname: Option<String>,

    /// Explicit IP address to use for mDNS registration.
    #[arg(long)]
    pub ip: Option<IpAddr>,
}

#[derive(Debug)]
pub struct DaemonSettings {
    /// `None` means hunt upward from the default port.
    pub port: Option<u16>,
    pub hostname: String,
    pub ip: Option<IpAddr>,
    pub api_key: ApiKey,
}

impl DaemonSettings {
    /// Resolve settings from flags, then `lookup` (normally the process
    /// environment), then defaults.
    pub fn load<F>(args: DaemonArgs, lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = args.port.or_else(|| {
            let raw = env(ENV_PORT)?;
            match raw.trim().parse::<u16>() {
                Ok(port) => Some(port),
                Err(_) => {
                    warnings.push(format!(
                        "invalid {ENV_PORT}={raw:?}, searching for a free port instead"
                    ));
                    None
                }
            }
        });

        let ip = args.ip.or_else(|| {
            let raw = env(ENV_IP)?;
            match raw.trim().parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    warnings.push(format!(
                        "invalid {ENV_IP}={raw:?}, publishing all interface addresses"
                    ));
                    None
                }
            }
        });

        let hostname = args
            .hostname
            .or_else(|| env(ENV_HOSTNAME))
            .unwrap_or_else(system_hostname)
            .trim()
            .trim_end_matches('.')
            .to_string();

        let api_key = match env(ENV_API_KEY) {
            Some(secret) => ApiKey::new(secret.trim()),
            None => ApiKey::generate(),
        };

        (
            Self {
                port,
                hostname,
                ip,
                api_key,
            },
            warnings,
        )
    }
}
