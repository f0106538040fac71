//! Node list file and tool settings.
//!
//! The node list is YAML with a top-level `nodes:` sequence:
//!
//! ```yaml
//! nodes:
//!   - name: pi-01
//!     address: 10.0.0.5:8080
//!     api_key: 3f2c...
//!   - address: "[fe80::1]:8080"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const ENV_TIMEOUT: &str = "COBBLER_TIMEOUT";
pub const ENV_CONFIG: &str = "COBBLER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = ".cobbler.yaml";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_DISCOVERY_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid node list {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize node list: {0}")]
    Serialize(#[from] serde_yaml::Error),
    #[error("invalid duration {0:?}, expected seconds (\"45\") or a duration (\"30s\", \"1m\")")]
    InvalidDuration(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl NodeConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl NodeList {
    /// Read the node list; a missing or blank file is an empty list.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_yaml::to_string(self)?;
        fs::write(path, text)
            .await
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Node list location plus whether the operator has one: an explicit path
/// always counts, the default only when the file exists.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> (PathBuf, bool) {
    match explicit {
        Some(path) => (path, true),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            let exists = path.exists();
            (path, exists)
        }
    }
}

/// `"45"` is 45 seconds; anything else goes through `humantime` (`"30s"`, `"1m"`, `"1m 30s"`).
pub fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).map_err(|_| ConfigError::InvalidDuration(raw.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Per-target deadline for every agent request.
    pub request_timeout: Duration,
    /// `COBBLER_TIMEOUT` when it was set and valid.
    pub env_timeout: Option<Duration>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            env_timeout: None,
        }
    }
}

impl ClientSettings {
    /// Settings from `lookup` (normally the process environment). Invalid
    /// values fall back to defaults and come back as warnings.
    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        let mut settings = Self::default();

        if let Some(raw) = lookup(ENV_TIMEOUT).filter(|v| !v.trim().is_empty()) {
            match parse_timeout(&raw) {
                Ok(timeout) => {
                    settings.request_timeout = timeout;
                    settings.env_timeout = Some(timeout);
                }
                Err(e) => warnings.push(format!(
                    "{e}; using {} for {ENV_TIMEOUT}",
                    humantime::format_duration(DEFAULT_REQUEST_TIMEOUT)
                )),
            }
        }

        (settings, warnings)
    }

    /// How long a browse session lasts: the explicit flag, then
    /// `COBBLER_TIMEOUT`, then five seconds.
    pub fn discovery_window(&self, flag: Option<Duration>) -> Duration {
        flag.or(self.env_timeout).unwrap_or(DEFAULT_DISCOVERY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_timeout("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_timeout("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_timeout(" 2m 5s ").unwrap(), Duration::from_secs(125));
        assert!(parse_timeout("soon").is_err());
        assert!(parse_timeout("").is_err());
    }

    #[test]
    fn test_settings_defaults() {
        let (settings, warnings) = ClientSettings::from_lookup(lookup(&[]));
        assert_eq!(settings.request_timeout, Duration::from_secs(60));
        assert_eq!(settings.discovery_window(None), Duration::from_secs(5));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_settings_timeout_drives_both_deadlines() {
        let (settings, _) = ClientSettings::from_lookup(lookup(&[(ENV_TIMEOUT, "15")]));
        assert_eq!(settings.request_timeout, Duration::from_secs(15));
        assert_eq!(settings.discovery_window(None), Duration::from_secs(15));
        assert_eq!(
            settings.discovery_window(Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_invalid_timeout_is_a_warning() {
        let (settings, warnings) = ClientSettings::from_lookup(lookup(&[(ENV_TIMEOUT, "later")]));
        assert_eq!(settings, ClientSettings::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("later"));
    }

    #[test]
    fn test_resolve_config_path() {
        let (path, exists) = resolve_config_path(Some(PathBuf::from("custom.yaml")));
        assert_eq!(path, PathBuf::from("custom.yaml"));
        assert!(exists);

        let (path, _) = resolve_config_path(None);
        assert_eq!(path, PathBuf::from(".cobbler.yaml"));
    }

    #[tokio::test]
    async fn test_node_list_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.yaml");

        assert_eq!(NodeList::load(&path).await.unwrap(), NodeList::default());

        let list = NodeList {
            nodes: vec![
                NodeConfig {
                    name: Some("pi-01".into()),
                    address: "10.0.0.5:8080".into(),
                    api_key: Some("K".into()),
                },
                NodeConfig::new("[::1]:8080"),
            ],
        };
        list.save(&path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("nodes:"));
        assert_eq!(text.matches("api_key").count(), 1);
        assert_eq!(NodeList::load(&path).await.unwrap(), list);
    }

    #[tokio::test]
    async fn test_malformed_node_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.yaml");
        std::fs::write(&path, "nodes: [address: ").unwrap();
        assert!(matches!(
            NodeList::load(&path).await,
            Err(ConfigError::Parse { .. })
        ));

        std::fs::write(&path, "\n").unwrap();
        assert!(NodeList::load(&path).await.unwrap().nodes.is_empty());
    }
}
