//! HTTP contract between `cobbler` and `cobblerd`.

use serde::{Deserialize, Serialize};

/// Header carrying the pre-shared agent key.
pub const API_KEY_HEADER: &str = "x-api-key";

pub const STATUS_PATH: &str = "/status";
pub const FULL_UPGRADE_PATH: &str = "/packages/full-upgrade";

/// Body of `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
    pub updates: Vec<String>,
    pub is_upgrading: bool,
}

impl StatusResponse {
    /// Build the response for a freshly computed list of upgradable packages.
    pub fn from_updates(updates: Vec<String>, is_upgrading: bool) -> Self {
        let message = match updates.len() {
            0 => "System is up to date".to_string(),
            n => format!("System has {n} outdated packages"),
        };
        Self {
            message,
            updates,
            is_upgrading,
        }
    }
}

/// Acknowledgement and error body used by every other route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_counts_packages() {
        let status = StatusResponse::from_updates(vec!["libc6".into(), "vim".into()], false);
        assert_eq!(status.message, "System has 2 outdated packages");
        assert_eq!(status.updates, vec!["libc6", "vim"]);
        assert!(!status.is_upgrading);

        let status = StatusResponse::from_updates(Vec::new(), true);
        assert_eq!(status.message, "System is up to date");
        assert!(status.is_upgrading);
    }

    #[test]
    fn test_status_wire_field_names() {
        let json = serde_json::to_value(StatusResponse::from_updates(vec!["vim".into()], true))
            .unwrap();
        assert_eq!(json["is_upgrading"], true);
        assert_eq!(json["updates"][0], "vim");
        assert_eq!(json["message"], "System has 1 outdated packages");
    }
}
