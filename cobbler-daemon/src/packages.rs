//! Package manager adapter
//!
//! The engine only relies on the textual and exit-code contract of the
//! package manager:
//! - `apt-get update` refreshes the index
//! - `apt list --upgradable` lists pending updates, one `name/suite ...` per line
//! - `apt-get full-upgrade -y` applies them

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("failed to execute {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

#[async_trait]
pub trait PackageManager: Send + Sync + 'static {
    /// Whether this host runs a Debian-based Linux system.
    async fn is_supported(&self) -> bool;

    async fn refresh_index(&self) -> Result<(), PackageError>;

    /// Names of packages with a newer candidate version, in listing order.
    async fn list_upgradable(&self) -> Result<Vec<String>, PackageError>;

    async fn full_upgrade(&self) -> Result<(), PackageError>;
}

/// `apt` on Debian, Ubuntu, Raspberry Pi OS and friends.
#[derive(Debug, Clone)]
pub struct Apt {
    os_release: PathBuf,
    debian_version: PathBuf,
}

impl Default for Apt {
    fn default() -> Self {
        Self {
            os_release: PathBuf::from("/etc/os-release"),
            debian_version: PathBuf::from("/etc/debian_version"),
        }
    }
}

impl Apt {
    /// Detect the platform from alternative release files.
    pub fn with_release_files(os_release: impl Into<PathBuf>, debian_version: impl Into<PathBuf>) -> Self {
        Self {
            os_release: os_release.into(),
            debian_version: debian_version.into(),
        }
    }
}

#[async_trait]
impl PackageManager for Apt {
    async fn is_supported(&self) -> bool {
        if !cfg!(target_os = "linux") {
            return false;
        }
        if tokio::fs::try_exists(&self.debian_version).await.unwrap_or(false) {
            return true;
        }
        match tokio::fs::read_to_string(&self.os_release).await {
            Ok(content) => is_debian_like(&content),
            Err(e) => {
                debug!("cannot read {}: {}", self.os_release.display(), e);
                false
            }
        }
    }

    async fn refresh_index(&self) -> Result<(), PackageError> {
        info!("updating apt cache...");
        run("apt-get", &["update", "-q"]).await.map(|_| ())
    }

    async fn list_upgradable(&self) -> Result<Vec<String>, PackageError> {
        info!("determining available updates...");
        let stdout = run("apt", &["list", "--upgradable"]).await?;
        let updates = parse_upgradable(&stdout);
        info!("found {} available updates", updates.len());
        Ok(updates)
    }

    async fn full_upgrade(&self) -> Result<(), PackageError> {
        run("apt-get", &["full-upgrade", "-y"]).await.map(|_| ())
    }
}

async fn run(program: &str, args: &[&str]) -> Result<String, PackageError> {
    let command = format!("{} {}", program, args.join(" "));
    debug!("executing: {}", command);

    let output = AsyncCommand::new(program)
        .args(args)
        .env("DEBIAN_FRONTEND", "noninteractive")
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| PackageError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(PackageError::Failed {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Package names from `apt list --upgradable` output.
pub fn parse_upgradable(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("Listing") && !line.starts_with("WARNING"))
        .filter_map(|line| line.split_once('/').map(|(name, _)| name.to_string()))
        .collect()
}

/// Whether an `/etc/os-release` body names `debian` in `ID` or `ID_LIKE`.
pub fn is_debian_like(os_release: &str) -> bool {
    os_release
        .lines()
        .filter_map(|line| line.split_once('='))
        .filter(|(key, _)| matches!(key.trim(), "ID" | "ID_LIKE"))
        .flat_map(|(_, value)| value.trim().trim_matches('"').split_whitespace())
        .any(|id| id.eq_ignore_ascii_case("debian"))
}
