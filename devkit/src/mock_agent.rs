/*!
Mock agent for testing the tool without a Debian host

Serves the agent HTTP contract on `127.0.0.1:<ephemeral>` with a scripted
behaviour. Upgrades on a healthy mock follow the real single-flight rule:
the first trigger is accepted, later ones conflict until [`MockAgent::finish_upgrade`].
*/

use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cobbler_common::api::{
    MessageResponse, StatusResponse, API_KEY_HEADER, FULL_UPGRADE_PATH, STATUS_PATH,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum AgentBehavior {
    /// Answers like a Debian agent with these pending updates.
    Healthy { updates: Vec<String> },
    /// Accepts the connection and never answers.
    Hang,
    /// Answers every request with this status and `{message}` body.
    Fail { status: u16, message: String },
    /// Answers 200 with a body that is not the agent contract.
    Garbage,
}

impl AgentBehavior {
    pub fn healthy(updates: &[&str]) -> Self {
        Self::Healthy {
            updates: updates.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn fail(status: u16, message: impl Into<String>) -> Self {
        Self::Fail {
            status,
            message: message.into(),
        }
    }
}

struct MockState {
    behavior: AgentBehavior,
    api_key: Option<String>,
    upgrading: AtomicBool,
    requests: AtomicUsize,
    upgrades: AtomicUsize,
}

pub struct MockAgent {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockAgent {
    /// Start a mock that accepts any key.
    pub async fn start(behavior: AgentBehavior) -> Result<Self> {
        Self::spawn(behavior, None).await
    }

    /// Start a mock that answers 401 unless `X-API-Key` equals `api_key`.
    pub async fn with_key(behavior: AgentBehavior, api_key: impl Into<String>) -> Result<Self> {
        Self::spawn(behavior, Some(api_key.into())).await
    }

    async fn spawn(behavior: AgentBehavior, api_key: Option<String>) -> Result<Self> {
        let state = Arc::new(MockState {
            behavior,
            api_key,
            upgrading: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            upgrades: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route(STATUS_PATH, get(status))
            .route(FULL_UPGRADE_PATH, post(full_upgrade))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                debug!("mock agent on {} stopped: {}", addr, e);
            }
        });

        Ok(Self {
            addr,
            state,
            server,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `host:port` as an operator would type it.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Requests received, including rejected ones.
    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Upgrades accepted so far.
    pub fn upgrades(&self) -> usize {
        self.state.upgrades.load(Ordering::SeqCst)
    }

    pub fn is_upgrading(&self) -> bool {
        self.state.upgrading.load(Ordering::SeqCst)
    }

    pub fn finish_upgrade(&self) {
        self.state.upgrading.store(false, Ordering::SeqCst);
    }
}

impl Drop for MockAgent {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Json(MessageResponse::new(text))).into_response()
}

/// Shared prelude of both routes: count, authenticate, apply the scripted
/// failure modes. `None` means the route should answer normally.
async fn intercept(state: &MockState, headers: &HeaderMap) -> Option<Response> {
    state.requests.fetch_add(1, Ordering::SeqCst);

    if let Some(expected) = &state.api_key {
        let presented = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return Some(message(StatusCode::UNAUTHORIZED, "missing or invalid API key"));
        }
    }

    match &state.behavior {
        AgentBehavior::Healthy { .. } => None,
        AgentBehavior::Hang => futures::future::pending().await,
        AgentBehavior::Fail { status, message: text } => Some(message(
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            text.clone(),
        )),
        AgentBehavior::Garbage => Some((StatusCode::OK, "<html>not an agent</html>").into_response()),
    }
}

async fn status(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Some(response) = intercept(&state, &headers).await {
        return response;
    }
    let updates = match &state.behavior {
        AgentBehavior::Healthy { updates } => updates.clone(),
        _ => Vec::new(),
    };
    let body = StatusResponse::from_updates(updates, state.upgrading.load(Ordering::SeqCst));
    Json(body).into_response()
}

async fn full_upgrade(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Some(response) = intercept(&state, &headers).await {
        return response;
    }
    match state
        .upgrading
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
    {
        Ok(_) => {
            state.upgrades.fetch_add(1, Ordering::SeqCst);
            message(StatusCode::ACCEPTED, "full upgrade triggered")
        }
        Err(_) => message(StatusCode::CONFLICT, "a full upgrade is currently running"),
    }
}
