//! Command execution and table output.
//!
//! Every command writes its report to the given writer and returns whether
//! it succeeded; the binary turns that into the exit status.

use anyhow::{Context, Result};
use cobbler_common::{discover_agents, DiscoveryBackend, ServiceEntry};
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabwriter::TabWriter;
use tracing::info;

use crate::address::{authority, normalize_address};
use crate::cli::Commands;
use crate::client::AgentClient;
use crate::config::{ClientSettings, NodeConfig, NodeList};
use crate::fanout::{FanOut, FanOutReport};
use crate::resolver::{resolve_targets, Target};

pub struct App {
    settings: ClientSettings,
    config_path: PathBuf,
    config_exists: bool,
    nodes: NodeList,
    backend: Arc<dyn DiscoveryBackend>,
    client: AgentClient,
}

impl App {
    pub fn new(
        settings: ClientSettings,
        config_path: PathBuf,
        config_exists: bool,
        nodes: NodeList,
        backend: Arc<dyn DiscoveryBackend>,
    ) -> Self {
        Self {
            settings,
            config_path,
            config_exists,
            nodes,
            backend,
            client: AgentClient::new(),
        }
    }

    pub async fn run(&self, command: Commands, out: &mut dyn Write) -> Result<bool> {
        match command {
            Commands::Discover {
                timeout,
                update_config,
            } => self.discover(timeout, update_config, out).await,
            Commands::Status { all, targets } => self.status(all, targets, out).await,
            Commands::Packages { all, targets, .. } => self.full_upgrade(all, targets, out).await,
        }
    }

    pub async fn discover(
        &self,
        timeout: Option<Duration>,
        update_config: bool,
        out: &mut dyn Write,
    ) -> Result<bool> {
        let window = self.settings.discovery_window(timeout);
        writeln!(out, "Discovery will take {} seconds", window.as_secs())?;

        let mut entries = discover_agents(self.backend.as_ref(), window).await;
        entries.sort_by(|a, b| a.instance_name.cmp(&b.instance_name));

        if entries.is_empty() {
            writeln!(out, "No cobbler daemons found.")?;
        } else {
            write_discovery_table(&entries, out)?;
        }

        if update_config {
            self.save_discovered(&entries, out).await?;
        }
        Ok(true)
    }

    async fn save_discovered(&self, entries: &[ServiceEntry], out: &mut dyn Write) -> Result<()> {
        let mut list = NodeList::load(&self.config_path)
            .await
            .context("failed to reload node list")?;
        let mut known: HashSet<String> = list
            .nodes
            .iter()
            .map(|node| normalize_address(&node.address))
            .collect();

        let before = list.nodes.len();
        for entry in entries {
            let Some(socket) = entry.primary_socket_addr() else {
                continue;
            };
            let address = authority(socket.ip(), socket.port());
            if known.insert(address.clone()) {
                list.nodes.push(NodeConfig {
                    name: (!entry.id.is_empty()).then(|| entry.id.clone()),
                    address,
                    api_key: None,
                });
            }
        }

        if list.nodes.len() > before {
            list.save(&self.config_path).await?;
            info!("added {} nodes to {}", list.nodes.len() - before, self.config_path.display());
            writeln!(out, "Configuration updated: {}", self.config_path.display())?;
        } else {
            writeln!(out, "No new daemons found to add to configuration.")?;
        }
        Ok(())
    }

    pub async fn status(&self, all: bool, targets: Vec<String>, out: &mut dyn Write) -> Result<bool> {
        let Some(targets) = self.resolve(all, targets, out).await? else {
            return Ok(false);
        };

        let client = &self.client;
        let report = FanOut::new(self.settings.request_timeout)
            .run(targets, |target| async move { client.status(&target).await })
            .await;

        write_report(&report, out, |status| {
            let mut detail = status.message.clone();
            if status.is_upgrading {
                detail.push_str(" (upgrading)");
            }
            if !status.updates.is_empty() {
                detail.push_str(": ");
                detail.push_str(&status.updates.join(", "));
            }
            ("ok", detail)
        })?;
        Ok(!report.had_failures())
    }

    pub async fn full_upgrade(
        &self,
        all: bool,
        targets: Vec<String>,
        out: &mut dyn Write,
    ) -> Result<bool> {
        let Some(targets) = self.resolve(all, targets, out).await? else {
            return Ok(false);
        };

        let client = &self.client;
        let report = FanOut::new(self.settings.request_timeout)
            .run(targets, |target| async move { client.full_upgrade(&target).await })
            .await;

        write_report(&report, out, |ack| ("triggered", ack.message.clone()))?;
        Ok(!report.had_failures())
    }

    /// Resolve targets, or report `No targets found.` and return `None`.
    async fn resolve(
        &self,
        all: bool,
        explicit: Vec<String>,
        out: &mut dyn Write,
    ) -> Result<Option<Vec<Target>>> {
        if explicit.is_empty() && !all && !self.config_exists {
            writeln!(out, "No config file was found or set.")?;
        }

        let discovered = if explicit.is_empty() && all {
            let window = self.settings.discovery_window(None);
            Some(discover_agents(self.backend.as_ref(), window).await)
        } else {
            None
        };

        let targets = resolve_targets(&explicit, &self.nodes.nodes, discovered.as_deref());
        if targets.is_empty() {
            writeln!(out, "No targets found.")?;
            return Ok(None);
        }
        Ok(Some(targets))
    }
}

fn write_discovery_table(entries: &[ServiceEntry], out: &mut dyn Write) -> Result<()> {
    let mut tw = TabWriter::new(out).padding(2);
    writeln!(tw, "ID\tHOST\tADDRESS\tPORT\tINSTANCE")?;
    for entry in entries {
        writeln!(
            tw,
            "{}\t{}\t{}\t{}\t{}",
            entry.id,
            entry.hostname,
            entry.addresses_display(),
            entry.port,
            entry.instance_name
        )?;
    }
    tw.flush()?;
    Ok(())
}

fn write_report<T, F>(report: &FanOutReport<T>, out: &mut dyn Write, success: F) -> Result<()>
where
    F: Fn(&T) -> (&'static str, String),
{
    let mut tw = TabWriter::new(out).padding(2);
    writeln!(tw, "TARGET\tNAME\tRESULT\tDETAIL")?;
    for outcome in &report.outcomes {
        let (result, detail) = match &outcome.result {
            Ok(value) => success(value),
            Err(e) => (e.kind(), e.to_string()),
        };
        writeln!(
            tw,
            "{}\t{}\t{}\t{}",
            outcome.target.address,
            outcome.target.display_name.as_deref().unwrap_or("-"),
            result,
            detail
        )?;
    }
    tw.flush()?;
    Ok(())
}
