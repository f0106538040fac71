//! HTTP API of the agent
//!
//! | Route | Success | Failure |
//! |---|---|---|
//! | `GET /status` | 200 `StatusResponse` | 401, 412, 500 |
//! | `POST /packages/full-upgrade` | 202 `{message}` | 401, 409, 412 |
//!
//! Both routes sit behind [`require_api_key`], so a rejected request never
//! reaches the engine.

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cobbler_common::api::{MessageResponse, StatusResponse, FULL_UPGRADE_PATH, STATUS_PATH};
use cobbler_common::DEFAULT_AGENT_PORT;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, warn};

use crate::auth::{require_api_key, ApiKey};
use crate::engine::{EngineError, UpdateEngine};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<UpdateEngine>,
    pub api_key: Arc<ApiKey>,
}

impl AppState {
    pub fn new(engine: UpdateEngine, api_key: ApiKey) -> Self {
        Self {
            engine: Arc::new(engine),
            api_key: Arc::new(api_key),
        }
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route(STATUS_PATH, get(get_status))
        .route(FULL_UPGRADE_PATH, post(full_upgrade))
        .route_layer(middleware::from_fn_with_state(
            app_state.api_key.clone(),
            require_api_key,
        ))
        .with_state(app_state)
}

// GET /status
async fn get_status(State(app): State<AppState>) -> Result<Json<StatusResponse>, EngineError> {
    Ok(Json(app.engine.status().await?))
}

// POST /packages/full-upgrade
async fn full_upgrade(
    State(app): State<AppState>,
) -> Result<(StatusCode, Json<MessageResponse>), EngineError> {
    app.engine.trigger_full_upgrade().await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new("full upgrade triggered")),
    ))
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::UnsupportedPlatform => StatusCode::PRECONDITION_FAILED,
            EngineError::UpgradeInProgress => StatusCode::CONFLICT,
            EngineError::Packages(e) => {
                error!("package manager failure: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(MessageResponse::new(self.to_string()))).into_response()
    }
}

/// Bind `requested` exactly, or hunt upward from the default port when unset.
pub async fn bind_listener(requested: Option<u16>) -> io::Result<(TcpListener, u16)> {
    let ip = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    match requested {
        Some(port) => {
            let listener = TcpListener::bind(SocketAddr::new(ip, port)).await.map_err(|e| {
                error!("failed to bind to port {port}: {e}");
                e
            })?;
            Ok((listener, port))
        }
        None => hunt_port(ip, DEFAULT_AGENT_PORT).await,
    }
}

async fn hunt_port(ip: IpAddr, start: u16) -> io::Result<(TcpListener, u16)> {
    let mut port = start;
    loop {
        match TcpListener::bind(SocketAddr::new(ip, port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => {
                if port == u16::MAX {
                    error!("no free ports found");
                    return Err(e);
                }
                warn!("port {port} is already in use, trying {}...", port + 1);
                port += 1;
            }
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{wait_until_idle, FakePackages};
    use crate::packages::PackageManager;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use cobbler_common::api::API_KEY_HEADER;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn app_with(packages: Arc<dyn PackageManager>) -> (Router, AppState) {
        let state = AppState::new(UpdateEngine::new(packages), ApiKey::new(KEY));
        (build_router(state.clone()), state)
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_status_with_pending_updates() {
        let (app, _) = app_with(Arc::new(FakePackages::with_updates(&["libc6", "vim"])));
        let response = app.oneshot(request("GET", "/status", Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let status: StatusResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(status.message, "System has 2 outdated packages");
        assert_eq!(status.updates, vec!["libc6", "vim"]);
        assert!(!status.is_upgrading);
    }

    #[tokio::test]
    async fn test_missing_or_wrong_key_is_rejected_before_engine() {
        let packages = Arc::new(FakePackages::with_updates(&["vim"]));
        let (app, state) = app_with(packages.clone());

        for key in [None, Some("nope"), Some("")] {
            let response = app.clone().oneshot(request("GET", "/status", key)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let response = app
                .clone()
                .oneshot(request("POST", "/packages/full-upgrade", key))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        assert_eq!(packages.list_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(!state.engine.guard().is_upgrading());
    }

    #[tokio::test]
    async fn test_non_debian_is_precondition_failure() {
        let (app, _) = app_with(Arc::new(FakePackages::unsupported()));

        let response = app.clone().oneshot(request("GET", "/status", Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
        assert_eq!(
            body_json(response).await["message"],
            "the system is not a Debian-based Linux system"
        );

        let response = app
            .oneshot(request("POST", "/packages/full-upgrade", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn test_package_manager_failure_is_server_error() {
        let packages = FakePackages {
            list_fails: true,
            ..FakePackages::with_updates(&[])
        };
        let (app, _) = app_with(Arc::new(packages));
        let response = app.oneshot(request("GET", "/status", Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let message = body_json(response).await["message"].as_str().unwrap().to_string();
        assert!(message.starts_with("Failed to check for updates"));
    }

    #[tokio::test]
    async fn test_full_upgrade_flow() {
        let packages = Arc::new(FakePackages::with_updates(&[]));
        let (app, state) = app_with(packages.clone());

        let response = app
            .clone()
            .oneshot(request("POST", "/packages/full-upgrade", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["message"], "full upgrade triggered");

        let response = app
            .clone()
            .oneshot(request("POST", "/packages/full-upgrade", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_json(response).await["message"],
            "a full upgrade is currently running"
        );

        let response = app.clone().oneshot(request("GET", "/status", Some(KEY))).await.unwrap();
        assert_eq!(body_json(response).await["is_upgrading"], true);

        packages.finish_upgrade();
        wait_until_idle(state.engine.guard()).await;

        let response = app.oneshot(request("GET", "/status", Some(KEY))).await.unwrap();
        assert_eq!(body_json(response).await["is_upgrading"], false);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_yield_one_acceptance() {
        let packages = Arc::new(FakePackages::with_updates(&[]));
        let (app, state) = app_with(packages.clone());

        let (a, b) = tokio::join!(
            app.clone().oneshot(request("POST", "/packages/full-upgrade", Some(KEY))),
            app.clone().oneshot(request("POST", "/packages/full-upgrade", Some(KEY))),
        );
        let mut codes = vec![a.unwrap().status(), b.unwrap().status()];
        codes.sort();
        assert_eq!(codes, vec![StatusCode::ACCEPTED, StatusCode::CONFLICT]);

        packages.finish_upgrade();
        wait_until_idle(state.engine.guard()).await;
        assert_eq!(packages.upgrades_started.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_port_hunting() {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let taken = TcpListener::bind(SocketAddr::new(ip, 0)).await.unwrap();
        let taken_port = taken.local_addr().unwrap().port();

        let (found, port) = hunt_port(ip, taken_port).await.unwrap();
        assert!(port > taken_port);
        assert_eq!(found.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_explicit_port_does_not_hunt() {
        let taken = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let taken_port = taken.local_addr().unwrap().port();
        assert!(bind_listener(Some(taken_port)).await.is_err());
    }
}
