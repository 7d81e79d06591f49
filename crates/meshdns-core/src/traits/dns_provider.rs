// # DNS Provider Trait
//
// Defines the interface for reading and mutating address records in the
// managed zone via a provider API.
//
// ## Implementations
//
// - Cloudflare: `meshdns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use meshdns_core::DnsProvider;
// use meshdns_core::traits::NewRecord;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let page = provider.list_records(1).await?;
//     let created = provider
//         .create_record(&NewRecord::new("alpha.ts.example.com", "100.64.0.1".parse()?))
//         .await?;
//     provider.delete_record(&created.id).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// An address record as stored by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    /// Provider-assigned identifier, authoritative for update/delete
    pub id: String,
    /// Fully-qualified record name
    pub name: String,
    /// Record content
    pub address: IpAddr,
    /// Time-to-live
    pub ttl: u32,
    /// Whether the provider proxies traffic for this record
    pub proxied: bool,
}

/// Parameters for creating a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    /// Fully-qualified record name
    pub name: String,
    /// Address to publish
    pub address: IpAddr,
    /// Time-to-live
    pub ttl: u32,
    /// Proxied flag
    pub proxied: bool,
}

impl NewRecord {
    /// Create a record request with the default TTL (300) and no proxying
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            name: name.into(),
            address,
            ttl: 300,
            proxied: false,
        }
    }
}

/// One page of a record listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPage {
    /// Records on this page
    pub records: Vec<DnsRecord>,
    /// 1-based page number
    pub page: u32,
    /// Total number of pages advertised by the provider
    pub total_pages: u32,
    /// Total number of records advertised by the provider, if known
    pub total_count: Option<u32>,
}

/// Trait for DNS provider implementations
///
/// Providers are isolated and single-shot: one API call per method, no
/// retries, no caching, no scheduling. Planning what to change is owned by
/// the reconciler, applying it by the executor.
///
/// # Errors
///
/// - Listing failures MUST be [`crate::Error::ProviderQuery`].
/// - Create/update/delete failures MUST be [`crate::Error::ProviderMutation`].
///
/// Both must carry the provider's status and error codes/messages.
///
/// # Security
///
/// Implementations must never log or `Debug`-print their credential.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List one page of address (A) records in the zone
    ///
    /// # Parameters
    ///
    /// - `page`: 1-based page number
    async fn list_records(&self, page: u32) -> Result<RecordPage, crate::Error>;

    /// Create an address record
    ///
    /// # Returns
    ///
    /// The created record, including its provider-assigned id
    async fn create_record(&self, record: &NewRecord) -> Result<DnsRecord, crate::Error>;

    /// Change the address of an existing record, addressed by provider id
    async fn update_record(&self, record_id: &str, address: IpAddr) -> Result<(), crate::Error>;

    /// Delete a record by provider id
    async fn delete_record(&self, record_id: &str) -> Result<(), crate::Error>;

    /// Check credentials and zone access without changing anything
    async fn verify(&self) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this provider
    /// - `sync`: Sync settings (timeouts)
    ///
    /// # Returns
    ///
    /// A boxed DnsProvider trait object
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
        sync: &crate::config::SyncConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
