//! Managed-zone scanner
//!
//! Reads every address record of the zone through the provider, drains
//! pagination, and keeps the records inside the ownership scope
//! `*.<subdomain_prefix>.<domain>`.
//!
//! A failed or incomplete listing is always an error. It is never turned
//! into an empty or partial snapshot, since the reconciler would plan
//! creates for records that exist, or skip deletes it should perform.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::ZoneConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsRecord};

/// Hard ceiling on listed pages
///
/// A provider that keeps advertising more pages beyond this is treated as
/// misbehaving.
pub const MAX_PAGES: u32 = 1000;

/// The ownership scope: records named `<label>.<prefix>.<domain>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedZone {
    prefix: String,
    domain: String,
    suffix: String,
}

impl ManagedZone {
    /// Create a scope from prefix and domain
    pub fn new(subdomain_prefix: &str, domain: &str) -> Self {
        let prefix = normalize_name(subdomain_prefix);
        let domain = normalize_name(domain);
        let suffix = format!(".{}.{}", prefix, domain);
        Self {
            prefix,
            domain,
            suffix,
        }
    }

    /// Create a scope from the zone configuration
    pub fn from_config(config: &ZoneConfig) -> Self {
        Self::new(&config.subdomain_prefix, &config.domain)
    }

    /// Fully-qualified record name for a sanitized hostname
    pub fn record_name(&self, hostname: &str) -> String {
        format!("{}{}", hostname, self.suffix)
    }

    /// The managed suffix, with its leading dot (e.g. `.ts.example.com`)
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The target domain
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The subdomain prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether a record name falls inside the ownership scope
    ///
    /// The name must carry at least one label in front of the suffix.
    pub fn owns(&self, name: &str) -> bool {
        let name = normalize_name(name);
        name.len() > self.suffix.len() && name.ends_with(&self.suffix)
    }
}

/// Lowercase a DNS name and drop the trailing root dot
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Managed records found in the zone, grouped by normalized name
///
/// Each name normally maps to exactly one record. More than one means the
/// zone holds duplicates, which the reconciler resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneSnapshot {
    records: BTreeMap<String, Vec<DnsRecord>>,
}

impl ZoneSnapshot {
    /// A snapshot holding no records
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from a full listing, keeping only owned records
    pub fn from_records(zone: &ManagedZone, records: impl IntoIterator<Item = DnsRecord>) -> Self {
        let mut snapshot = Self::default();
        let mut foreign = 0usize;

        for mut record in records {
            if !zone.owns(&record.name) {
                foreign += 1;
                continue;
            }
            record.name = normalize_name(&record.name);
            snapshot
                .records
                .entry(record.name.clone())
                .or_default()
                .push(record);
        }

        if foreign > 0 {
            debug!("Ignored {} record(s) outside {}", foreign, zone.suffix());
        }
        snapshot
    }

    /// Records stored under a managed name
    pub fn get(&self, name: &str) -> &[DnsRecord] {
        self.records.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether a managed name has at least one record
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Iterate `(name, records)` in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[DnsRecord])> {
        self.records
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    /// Number of distinct managed names
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Total number of managed records, duplicates included
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Whether no managed record exists
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Scan the managed part of the zone
///
/// Every page request is bounded by `timeout`.
///
/// # Errors
///
/// [`Error::ProviderQuery`] when any page fails, times out, or the listing
/// turns out to be incomplete.
pub async fn scan(
    provider: &dyn DnsProvider,
    zone: &ManagedZone,
    timeout: Duration,
) -> Result<ZoneSnapshot> {
    let name = provider.provider_name();
    let mut records = Vec::new();
    let mut expected_total = None;
    let mut page = 1u32;

    loop {
        if page > MAX_PAGES {
            return Err(Error::provider_query(
                name,
                format!("listing exceeded {} pages", MAX_PAGES),
            ));
        }

        let result = tokio::time::timeout(timeout, provider.list_records(page))
            .await
            .map_err(|_| {
                Error::provider_query(
                    name,
                    format!("listing page {} timed out after {:?}", page, timeout),
                )
            })?
            .map_err(|e| into_query_error(name, e))?;

        debug!(
            "Listed page {}/{} ({} record(s))",
            result.page,
            result.total_pages,
            result.records.len()
        );

        if result.page != page {
            return Err(Error::provider_query(
                name,
                format!("requested page {} but received page {}", page, result.page),
            ));
        }
        if page > 1 && result.total_pages < page {
            return Err(Error::provider_query(
                name,
                format!(
                    "page count shrank to {} while listing page {}",
                    result.total_pages, page
                ),
            ));
        }
        if result.records.is_empty() && page < result.total_pages {
            return Err(Error::provider_query(
                name,
                format!(
                    "page {} of {} came back empty",
                    page, result.total_pages
                ),
            ));
        }

        if result.total_count.is_some() {
            expected_total = result.total_count;
        }
        records.extend(result.records);

        if page >= result.total_pages {
            break;
        }
        page += 1;
    }

    if let Some(total) = expected_total
        && records.len() != total as usize
    {
        return Err(Error::provider_query(
            name,
            format!(
                "incomplete listing: received {} of {} record(s)",
                records.len(),
                total
            ),
        ));
    }

    let snapshot = ZoneSnapshot::from_records(zone, records);
    info!(
        "Found {} managed record(s) under {}",
        snapshot.record_count(),
        zone.suffix()
    );
    Ok(snapshot)
}

fn into_query_error(provider: &str, err: Error) -> Error {
    match err {
        Error::ProviderQuery { .. } => err,
        other => Error::provider_query(provider, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{NewRecord, RecordPage};
    use async_trait::async_trait;
    use std::net::IpAddr;

    fn record(id: &str, name: &str, ip: &str) -> DnsRecord {
        DnsRecord {
            id: id.to_string(),
            name: name.to_string(),
            address: ip.parse().unwrap(),
            ttl: 300,
            proxied: false,
        }
    }

    /// Serves a fixed set of pages
    struct PagedProvider {
        pages: Vec<RecordPage>,
    }

    #[async_trait]
    impl DnsProvider for PagedProvider {
        async fn list_records(&self, page: u32) -> Result<RecordPage> {
            self.pages
                .get(page as usize - 1)
                .cloned()
                .ok_or_else(|| Error::provider_query("paged", format!("no page {}", page)))
        }

        async fn create_record(&self, _record: &NewRecord) -> Result<DnsRecord> {
            unreachable!("scanner never mutates")
        }

        async fn update_record(&self, _id: &str, _address: IpAddr) -> Result<()> {
            unreachable!("scanner never mutates")
        }

        async fn delete_record(&self, _id: &str) -> Result<()> {
            unreachable!("scanner never mutates")
        }

        async fn verify(&self) -> Result<()> {
            Ok(())
        }

        fn provider_name(&self) -> &'static str {
            "paged"
        }
    }

    /// Claims an unbounded number of pages
    #[derive(Default)]
    struct EndlessProvider {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl DnsProvider for EndlessProvider {
        async fn list_records(&self, page: u32) -> Result<RecordPage> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let name = format!("host{}.ts.example.com", page);
            Ok(RecordPage {
                records: vec![record(&page.to_string(), &name, "100.64.0.1")],
                page,
                total_pages: u32::MAX,
                total_count: None,
            })
        }

        async fn create_record(&self, _record: &NewRecord) -> Result<DnsRecord> {
            unreachable!("scanner never mutates")
        }

        async fn update_record(&self, _id: &str, _address: IpAddr) -> Result<()> {
            unreachable!("scanner never mutates")
        }

        async fn delete_record(&self, _id: &str) -> Result<()> {
            unreachable!("scanner never mutates")
        }

        async fn verify(&self) -> Result<()> {
            Ok(())
        }

        fn provider_name(&self) -> &'static str {
            "endless"
        }
    }

    fn page(n: u32, total_pages: u32, total_count: Option<u32>, records: Vec<DnsRecord>) -> RecordPage {
        RecordPage {
            records,
            page: n,
            total_pages,
            total_count,
        }
    }

    fn zone() -> ManagedZone {
        ManagedZone::new("ts", "example.com")
    }

    #[test]
    fn ownership_scope() {
        let zone = zone();
        assert_eq!(zone.record_name("alpha"), "alpha.ts.example.com");
        assert!(zone.owns("alpha.ts.example.com"));
        assert!(zone.owns("ALPHA.ts.Example.com."));
        assert!(zone.owns("a.b.ts.example.com"));
        assert!(!zone.owns("ts.example.com"));
        assert!(!zone.owns(".ts.example.com"));
        assert!(!zone.owns("alpha.example.com"));
        assert!(!zone.owns("alphats.example.com"));
        assert!(!zone.owns("alpha.ts.example.com.evil.net"));
    }

    #[test]
    fn snapshot_filters_and_groups() {
        let snapshot = ZoneSnapshot::from_records(
            &zone(),
            vec![
                record("1", "alpha.ts.example.com", "100.64.0.1"),
                record("2", "www.example.com", "203.0.113.1"),
                record("3", "Alpha.ts.example.com.", "100.64.0.9"),
            ],
        );
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.record_count(), 2);
        assert_eq!(snapshot.get("alpha.ts.example.com").len(), 2);
        assert!(snapshot.get("www.example.com").is_empty());
    }

    #[tokio::test]
    async fn drains_every_page() {
        let provider = PagedProvider {
            pages: vec![
                page(1, 2, Some(3), vec![
                    record("1", "a.ts.example.com", "100.64.0.1"),
                    record("2", "b.ts.example.com", "100.64.0.2"),
                ]),
                page(2, 2, Some(3), vec![record("3", "c.ts.example.com", "100.64.0.3")]),
            ],
        };

        let snapshot = scan(&provider, &zone(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.contains("c.ts.example.com"));
    }

    #[tokio::test]
    async fn empty_zone_is_a_valid_result() {
        let provider = PagedProvider {
            pages: vec![page(1, 0, Some(0), vec![])],
        };
        let snapshot = scan(&provider, &zone(), Duration::from_secs(1)).await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn failing_page_is_a_query_error() {
        // second page is missing entirely
        let provider = PagedProvider {
            pages: vec![page(1, 2, None, vec![record("1", "a.ts.example.com", "100.64.0.1")])],
        };
        let err = scan(&provider, &zone(), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::ProviderQuery { .. }));
    }

    #[tokio::test]
    async fn short_listing_is_a_query_error() {
        let provider = PagedProvider {
            pages: vec![page(1, 1, Some(5), vec![record("1", "a.ts.example.com", "100.64.0.1")])],
        };
        let err = scan(&provider, &zone(), Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("incomplete listing"));
    }

    #[tokio::test]
    async fn empty_middle_page_is_a_query_error() {
        let provider = PagedProvider {
            pages: vec![
                page(1, 3, None, vec![record("1", "a.ts.example.com", "100.64.0.1")]),
                page(2, 3, None, vec![]),
                page(3, 3, None, vec![record("3", "c.ts.example.com", "100.64.0.3")]),
            ],
        };
        let err = scan(&provider, &zone(), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::ProviderQuery { .. }));
    }

    #[tokio::test]
    async fn wrong_page_number_is_a_query_error() {
        let provider = PagedProvider {
            pages: vec![
                page(1, 2, None, vec![record("1", "a.ts.example.com", "100.64.0.1")]),
                page(1, 2, None, vec![record("1", "a.ts.example.com", "100.64.0.1")]),
            ],
        };
        let err = scan(&provider, &zone(), Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("received page 1"));
    }

    #[tokio::test]
    async fn shrinking_page_count_is_a_query_error() {
        let provider = PagedProvider {
            pages: vec![
                page(1, 3, None, vec![record("1", "a.ts.example.com", "100.64.0.1")]),
                page(2, 1, None, vec![record("2", "b.ts.example.com", "100.64.0.2")]),
                page(3, 3, None, vec![record("3", "c.ts.example.com", "100.64.0.3")]),
            ],
        };
        let err = scan(&provider, &zone(), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::ProviderQuery { .. }));
        assert!(err.to_string().contains("page count shrank to 1"), "{}", err);
    }

    #[tokio::test]
    async fn listing_stops_at_page_ceiling() {
        let provider = EndlessProvider::default();
        let err = scan(&provider, &zone(), Duration::from_secs(1)).await.unwrap_err();

        assert!(matches!(err, Error::ProviderQuery { .. }));
        assert!(err.to_string().contains("exceeded 1000 pages"), "{}", err);
        assert_eq!(
            provider.calls.load(std::sync::atomic::Ordering::SeqCst),
            MAX_PAGES
        );
    }
}
