//! Core traits for the meshdns system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`InventorySource`]: Fetch the device list from the mesh network
//! - [`DnsProvider`]: Read and mutate address records via provider APIs

pub mod inventory_source;
pub mod dns_provider;

pub use inventory_source::{InventorySource, InventorySourceFactory, MeshDevice};
pub use dns_provider::{DnsProvider, DnsProviderFactory, DnsRecord, NewRecord, RecordPage};
