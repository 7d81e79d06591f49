// # Tailscale CLI Inventory Source
//
// This crate provides the Tailscale implementation of `InventorySource` for
// meshdns.
//
// ## How It Works
//
// Runs `tailscale status --json` against the local daemon and reads the
// `Self` and `Peer` entries of the result. The CLI already knows the tailnet,
// so no API key is needed.
//
// ## Behavior
//
// - One child process per call, killed if the call times out or is dropped
// - Device name: first label of `DNSName`, falling back to `HostName`
// - Addresses: `TailscaleIPs` in the reported order (IPv4 selection happens
//   in the core snapshot)
// - A backend that is not `Running` is an error, never an empty device list
//
// ## Failure Modes
//
// All failures map to `Error::SourceUnavailable`:
// - binary missing or not executable
// - non-zero exit status (stderr is quoted)
// - timeout
// - output that is not valid status JSON

use async_trait::async_trait;
use meshdns_core::config::{SourceConfig, SyncConfig};
use meshdns_core::registry::PluginRegistry;
use meshdns_core::traits::{InventorySource, InventorySourceFactory, MeshDevice};
use meshdns_core::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Backend state reported by a connected daemon
const BACKEND_RUNNING: &str = "Running";

/// Top-level shape of `tailscale status --json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Status {
    #[serde(default)]
    backend_state: Option<String>,
    #[serde(rename = "Self", default)]
    self_node: Option<Node>,
    /// Keyed by node public key; `null` when the tailnet has no peers
    #[serde(default)]
    peer: Option<BTreeMap<String, Node>>,
}

/// One node entry (`Self` or a `Peer` value)
#[derive(Debug, Deserialize)]
struct Node {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "HostName", default)]
    host_name: String,
    #[serde(rename = "DNSName", default)]
    dns_name: String,
    #[serde(rename = "OS", default)]
    os: String,
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Option<Vec<String>>,
}

impl Node {
    fn into_device(self, fallback_id: &str) -> MeshDevice {
        let name = self
            .dns_name
            .split('.')
            .next()
            .filter(|label| !label.is_empty())
            .unwrap_or(self.host_name.as_str())
            .to_string();

        let addresses = self
            .tailscale_ips
            .unwrap_or_default()
            .iter()
            .filter_map(|raw| match raw.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    warn!("Ignoring unparsable Tailscale address {} for {}", raw, name);
                    None
                }
            })
            .collect();

        let id = if self.id.is_empty() {
            fallback_id.to_string()
        } else {
            self.id
        };

        let device = MeshDevice::new(id, name, addresses);
        if self.os.is_empty() {
            device
        } else {
            device.with_os(self.os)
        }
    }
}

/// Parse the output of `tailscale status --json`
///
/// Peers come first in key order, the local node last.
pub fn parse_status(json: &str) -> Result<Vec<MeshDevice>> {
    let status: Status = serde_json::from_str(json).map_err(|e| {
        Error::source_unavailable(format!("Invalid output from tailscale status: {}", e))
    })?;

    if let Some(state) = status.backend_state.as_deref()
        && state != BACKEND_RUNNING
    {
        return Err(Error::source_unavailable(format!(
            "Tailscale backend is not running (state: {})",
            state
        )));
    }

    let mut devices: Vec<MeshDevice> = status
        .peer
        .unwrap_or_default()
        .into_iter()
        .map(|(key, node)| node.into_device(&key))
        .collect();

    if let Some(node) = status.self_node {
        devices.push(node.into_device("self"));
    }

    Ok(devices)
}

/// Inventory source backed by the local `tailscale` CLI
#[derive(Debug, Clone)]
pub struct TailscaleCliSource {
    binary: String,
    timeout: Duration,
}

impl TailscaleCliSource {
    /// Create a source that runs `binary status --json`
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    async fn status_output(&self) -> Result<String> {
        debug!("Running {} status --json", self.binary);

        let mut command = Command::new(&self.binary);
        command
            .args(["status", "--json"])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                Error::source_unavailable(format!(
                    "{} status --json timed out after {}s",
                    self.binary,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                Error::source_unavailable(format!("Failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::source_unavailable(format!(
                "{} status --json failed ({}): {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|e| {
            Error::source_unavailable(format!("tailscale status output is not UTF-8: {}", e))
        })
    }
}

#[async_trait]
impl InventorySource for TailscaleCliSource {
    async fn devices(&self) -> Result<Vec<MeshDevice>> {
        let output = self.status_output().await?;
        let devices = parse_status(&output)?;
        debug!("Fetched {} device(s) from Tailscale", devices.len());
        Ok(devices)
    }

    fn source_name(&self) -> &'static str {
        "tailscale"
    }
}

/// Factory for creating Tailscale CLI sources
pub struct TailscaleFactory;

impl InventorySourceFactory for TailscaleFactory {
    fn create(
        &self,
        config: &SourceConfig,
        sync: &SyncConfig,
    ) -> Result<Box<dyn InventorySource>> {
        match config {
            SourceConfig::TailscaleCli { binary } => Ok(Box::new(TailscaleCliSource::new(
                binary.clone(),
                sync.timeout(),
            ))),
            _ => Err(Error::validation("Invalid config for Tailscale source")),
        }
    }
}

/// Register the Tailscale CLI source with a registry
pub fn register(registry: &PluginRegistry) {
    registry.register_source("tailscale_cli", Box::new(TailscaleFactory));
}
