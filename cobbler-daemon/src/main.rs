//! cobblerd - advertises this node over mDNS and serves package status and
//! upgrade control over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use cobbler_common::MdnsBackend;
use cobbler_daemon::config::{DaemonArgs, DaemonSettings, ENV_API_KEY};
use cobbler_daemon::discovery::advertise;
use cobbler_daemon::http::{bind_listener, build_router, shutdown_signal, AppState};
use cobbler_daemon::{Apt, UpdateEngine};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cobbler_daemon=info,cobbler_common=info")),
        )
        .init();

    let args = DaemonArgs::parse();
    let (settings, warnings) = DaemonSettings::load(args, |key| std::env::var(key).ok());
    for warning in &warnings {
        warn!("{}", warning);
    }

    let (listener, port) = bind_listener(settings.port)
        .await
        .context("Failed to bind HTTP listener")?;

    if settings.api_key.is_generated() {
        warn!(
            "{} not set, generated API key for this run: {}",
            ENV_API_KEY,
            settings.api_key.expose()
        );
    }

    let mut advertisement = advertise(&MdnsBackend::new(), &settings.hostname, port, settings.ip);

    let engine = UpdateEngine::new(Arc::new(Apt::default()));
    let app = build_router(AppState::new(engine, settings.api_key));

    info!(
        "cobbler daemon listening on {}",
        listener.local_addr().context("Listener has no local address")?
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(handle) = advertisement.as_mut() {
        handle.shutdown();
    }

    if let Err(e) = &served {
        error!("http server error: {e}");
    }
    served.context("HTTP server failed")
}
