//! HTTP client for the agent API.

use cobbler_common::api::{
    MessageResponse, StatusResponse, API_KEY_HEADER, FULL_UPGRADE_PATH, STATUS_PATH,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::address::base_url;
use crate::resolver::Target;

/// Why one target's operation failed.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("{0}")]
    Network(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Precondition(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("HTTP {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },
}

impl OperationError {
    /// Short classification used in the result column.
    pub fn kind(&self) -> &'static str {
        match self {
            OperationError::Network(_) => "network",
            OperationError::Timeout(_) => "timeout",
            OperationError::Auth(_) => "auth",
            OperationError::Conflict(_) => "conflict",
            OperationError::Precondition(_) => "precondition",
            OperationError::Decode(_) => "decode",
            OperationError::UnexpectedStatus { .. } => "error",
        }
    }

    /// Connection level failure, deadline expiry included.
    pub fn is_network(&self) -> bool {
        matches!(self, OperationError::Network(_) | OperationError::Timeout(_))
    }
}

impl From<reqwest::Error> for OperationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            OperationError::Network(format!("request timed out: {e}"))
        } else if e.is_decode() {
            OperationError::Decode(e.to_string())
        } else {
            OperationError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgentClient {
    http: reqwest::Client,
}

impl AgentClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    // GET /status
    pub async fn status(&self, target: &Target) -> Result<StatusResponse, OperationError> {
        let url = format!("{}{}", base_url(&target.address), STATUS_PATH);
        let response = authorized(self.http.get(&url), target).send().await?;
        decode(response).await
    }

    // POST /packages/full-upgrade
    pub async fn full_upgrade(&self, target: &Target) -> Result<MessageResponse, OperationError> {
        let url = format!("{}{}", base_url(&target.address), FULL_UPGRADE_PATH);
        let response = authorized(self.http.post(&url), target).send().await?;
        decode(response).await
    }
}

fn authorized(request: RequestBuilder, target: &Target) -> RequestBuilder {
    match &target.api_key {
        Some(key) => request.header(API_KEY_HEADER, key),
        None => request,
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, OperationError> {
    let status = response.status();
    let body = response.bytes().await?;
    debug!("agent answered {} with {} bytes", status, body.len());

    if status.is_success() {
        return serde_json::from_slice(&body).map_err(|e| OperationError::Decode(e.to_string()));
    }

    let message = serde_json::from_slice::<MessageResponse>(&body)
        .map(|m| m.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(&body).trim().to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED => OperationError::Auth(message),
        StatusCode::CONFLICT => OperationError::Conflict(message),
        StatusCode::PRECONDITION_FAILED => OperationError::Precondition(message),
        other => OperationError::UnexpectedStatus {
            status: other.as_u16(),
            message,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(OperationError::Timeout(Duration::from_secs(1)).is_network());
        assert!(OperationError::Network("refused".into()).is_network());
        assert!(!OperationError::Conflict("busy".into()).is_network());
        assert_eq!(OperationError::Precondition("x".into()).kind(), "precondition");
        assert_eq!(
            OperationError::Timeout(Duration::from_secs(2)).to_string(),
            "no response within 2s"
        );
        assert_eq!(
            OperationError::UnexpectedStatus {
                status: 500,
                message: "boom".into()
            }
            .to_string(),
            "HTTP 500: boom"
        );
    }
}
