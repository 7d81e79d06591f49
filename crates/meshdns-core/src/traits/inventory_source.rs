// # Inventory Source Trait
//
// Defines the interface for fetching the device list from the mesh-network
// control plane.
//
// ## Implementations
//
// - Tailscale CLI (`tailscale status --json`): `meshdns-source-tailscale` crate
//
// ## Usage
//
// ```rust,ignore
// use meshdns_core::InventorySource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* InventorySource implementation */;
//
//     for device in source.devices().await? {
//         println!("{} -> {:?}", device.name, device.addresses);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// A device as reported by the mesh network, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshDevice {
    /// Control-plane identifier of the device
    pub id: String,
    /// Device name (unsanitized)
    pub name: String,
    /// All addresses assigned by the mesh, in the order reported
    pub addresses: Vec<IpAddr>,
    /// Operating system, if reported
    pub os: Option<String>,
}

impl MeshDevice {
    /// Create a new device
    pub fn new(id: impl Into<String>, name: impl Into<String>, addresses: Vec<IpAddr>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            addresses,
            os: None,
        }
    }

    /// Attach the operating system name
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }
}

/// Trait for inventory source implementations
///
/// A source is called exactly once per reconciliation run and must either
/// return the full device list or fail.
///
/// # Reachable vs. empty
///
/// An unreachable source MUST return [`crate::Error::SourceUnavailable`].
/// `Ok(vec![])` means "reachable, zero devices", which the engine treats as
/// a request to remove every managed record. Never hide a failure behind an
/// empty list.
///
/// # Timeouts
///
/// The engine bounds every call with the configured timeout. Implementations
/// should also bound their own I/O so nothing is left running afterwards.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Fetch the current device list
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<MeshDevice>)`: Every device known to the control plane
    /// - `Err(Error::SourceUnavailable)`: If the list could not be retrieved
    async fn devices(&self) -> Result<Vec<MeshDevice>, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing inventory sources from configuration
pub trait InventorySourceFactory: Send + Sync {
    /// Create an InventorySource instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Source configuration
    /// - `sync`: Sync settings (timeouts)
    fn create(
        &self,
        config: &crate::config::SourceConfig,
        sync: &crate::config::SyncConfig,
    ) -> Result<Box<dyn InventorySource>, crate::Error>;
}
