use anyhow::{Context, Result};
use clap::Parser;
use cobbler_cli::{resolve_config_path, App, Cli, ClientSettings, NodeList};
use cobbler_common::MdnsBackend;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // stdout carries the tables, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let (settings, warnings) = ClientSettings::from_lookup(|key| std::env::var(key).ok());
    for warning in &warnings {
        warn!("{}", warning);
    }

    let (config_path, config_exists) = resolve_config_path(cli.config);
    let nodes = NodeList::load(&config_path)
        .await
        .context("failed to load config")?;

    let app = App::new(
        settings,
        config_path,
        config_exists,
        nodes,
        Arc::new(MdnsBackend::new()),
    );

    let mut stdout = std::io::stdout();
    app.run(cli.command, &mut stdout).await
}
