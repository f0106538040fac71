//! Pre-shared key guard for every privileged route.
//!
//! The agent holds exactly one key for its lifetime. Candidates are compared
//! through SHA-256 digests with a constant-time equality, so neither the key
//! length nor a matching prefix is observable from response timing.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cobbler_common::api::{MessageResponse, API_KEY_HEADER};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

pub struct ApiKey {
    secret: String,
    generated: bool,
}

impl ApiKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            generated: false,
        }
    }

    /// Random key for agents started without `COBBLER_DAEMON_API_KEY`.
    pub fn generate() -> Self {
        Self {
            secret: uuid::Uuid::new_v4().to_string(),
            generated: true,
        }
    }

    /// Whether the operator still has to copy this key out of the startup log.
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn expose(&self) -> &str {
        &self.secret
    }

    pub fn verify(&self, candidate: &str) -> bool {
        let expected = Sha256::digest(self.secret.as_bytes());
        let provided = Sha256::digest(candidate.as_bytes());
        expected.as_slice().ct_eq(provided.as_slice()).into()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("secret", &"<redacted>")
            .field("generated", &self.generated)
            .finish()
    }
}

/// Reject requests lacking a valid `X-API-Key` before they reach a handler.
pub async fn require_api_key(
    State(key): State<Arc<ApiKey>>,
    req: Request,
    next: Next,
) -> Response {
    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(candidate) if key.verify(candidate) => next.run(req).await,
        Some(_) => {
            warn!("rejected {} {}: invalid API key", req.method(), req.uri().path());
            unauthorized()
        }
        None => {
            warn!("rejected {} {}: missing API key", req.method(), req.uri().path());
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(MessageResponse::new("missing or invalid API key")),
    )
        .into_response()
}
