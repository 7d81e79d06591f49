// # meshdns-core
//
// Core library for publishing mesh-network devices as DNS address records.
//
// ## Architecture Overview
//
// - **InventorySource**: Trait for fetching the device list from the mesh control plane
// - **DnsProvider**: Trait for listing and mutating records through a provider API
// - **DeviceSnapshot**: Canonical `hostname -> address` view of the inventory
// - **ZoneSnapshot**: Managed records found under `<prefix>.<domain>`
// - **reconcile()**: Pure diff producing a ReconciliationPlan
// - **Executor**: Applies a plan and produces a RunSummary
// - **SyncEngine**: Orchestrates one run, cleanup, validation and the watch loop
// - **PluginRegistry**: Plugin-based registry for providers and sources
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Remote Zone is the Truth**: Every run re-scans; nothing is cached between runs
// 3. **Plugin-Based**: Providers and sources are registered dynamically
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Fail Before Mutating**: Source and scan failures abort a run before any change

pub mod traits;
pub mod inventory;
pub mod zone;
pub mod reconcile;
pub mod executor;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{DnsProvider, InventorySource, MeshDevice, DnsRecord};
pub use inventory::DeviceSnapshot;
pub use zone::{ManagedZone, ZoneSnapshot};
pub use reconcile::{reconcile, Operation, ReconciliationPlan};
pub use executor::{Executor, RunSummary};
pub use engine::{SyncEngine, EngineEvent, ValidationReport};
pub use registry::PluginRegistry;
pub use config::{MeshDnsConfig, SourceConfig, ProviderConfig, ZoneConfig, SyncConfig};
pub use error::{Error, Result};
