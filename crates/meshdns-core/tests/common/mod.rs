//! Test doubles and common utilities for engine contract tests
//!
//! `MockInventory` and `MockZone` are cheap handles over shared state: the
//! engine gets a boxed clone, the test keeps its own handle to inspect call
//! counters and the resulting zone.

#![allow(dead_code)]

use async_trait::async_trait;
use meshdns_core::config::{MeshDnsConfig, ProviderConfig, SourceConfig, SyncConfig, ZoneConfig};
use meshdns_core::error::{Error, Result};
use meshdns_core::traits::{
    DnsProvider, DnsRecord, InventorySource, MeshDevice, NewRecord, RecordPage,
};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Inventory source returning a fixed device list
#[derive(Clone, Default)]
pub struct MockInventory {
    devices: Arc<Mutex<Vec<MeshDevice>>>,
    calls: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl MockInventory {
    pub fn new(devices: &[(&str, &str)]) -> Self {
        let inventory = Self::default();
        inventory.set_devices(devices);
        inventory
    }

    /// Replace the device list; `(name, ipv4)` pairs
    pub fn set_devices(&self, devices: &[(&str, &str)]) {
        let list = devices
            .iter()
            .enumerate()
            .map(|(i, (name, ip))| {
                MeshDevice::new(format!("node-{}", i), *name, vec![ip.parse().unwrap()])
            })
            .collect();
        *self.devices.lock().unwrap() = list;
    }

    /// Make every call fail as unreachable
    pub fn go_offline(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Number of times devices() was called
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn boxed(&self) -> Box<dyn InventorySource> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl InventorySource for MockInventory {
    async fn devices(&self) -> Result<Vec<MeshDevice>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::source_unavailable("mock control plane unreachable"));
        }
        Ok(self.devices.lock().unwrap().clone())
    }

    fn source_name(&self) -> &'static str {
        "mock-inventory"
    }
}

#[derive(Default)]
struct ZoneState {
    records: Mutex<BTreeMap<String, DnsRecord>>,
    next_id: AtomicUsize,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    failing_names: Mutex<Vec<String>>,
    list_delay: Mutex<Option<Duration>>,
    mutation_delay: Mutex<Option<Duration>>,
    empty_page: Mutex<Option<u32>>,
}

/// In-memory DNS zone serving two records per page
#[derive(Clone, Default)]
pub struct MockZone {
    state: Arc<ZoneState>,
}

pub const PAGE_SIZE: usize = 2;

impl MockZone {
    pub fn new() -> Self {
        let zone = Self::default();
        zone.state.next_id.store(1000, Ordering::SeqCst);
        zone
    }

    /// Seed a record without counting it as a mutation
    pub fn with_record(self, id: &str, name: &str, ip: &str) -> Self {
        self.state.records.lock().unwrap().insert(
            id.to_string(),
            DnsRecord {
                id: id.to_string(),
                name: name.to_string(),
                address: ip.parse().unwrap(),
                ttl: 300,
                proxied: false,
            },
        );
        self
    }

    /// `name -> address` for every record in the zone, managed or not
    pub fn contents(&self) -> BTreeMap<String, IpAddr> {
        self.state
            .records
            .lock()
            .unwrap()
            .values()
            .map(|r| (r.name.clone(), r.address))
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.state.records.lock().unwrap().len()
    }

    pub fn list_calls(&self) -> usize {
        self.state.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.state.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.state.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.state.delete_calls.load(Ordering::SeqCst)
    }

    /// Total create + update + delete calls
    pub fn mutation_calls(&self) -> usize {
        self.create_calls() + self.update_calls() + self.delete_calls()
    }

    /// Reject every mutation targeting `name`
    pub fn fail_mutations_for(&self, name: &str) {
        self.state.failing_names.lock().unwrap().push(name.to_string());
    }

    pub fn delay_listing(&self, delay: Duration) {
        *self.state.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn delay_mutations(&self, delay: Duration) {
        *self.state.mutation_delay.lock().unwrap() = Some(delay);
    }

    /// Serve `page` without records while still advertising the full count
    pub fn drop_page(&self, page: u32) {
        *self.state.empty_page.lock().unwrap() = Some(page);
    }

    pub fn boxed(&self) -> Box<dyn DnsProvider> {
        Box::new(self.clone())
    }

    async fn mutation_delay(&self) {
        let delay = *self.state.mutation_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_failing(&self, name: &str) -> Result<()> {
        if self.state.failing_names.lock().unwrap().iter().any(|n| n == name) {
            return Err(Error::provider_mutation(
                "mock-zone",
                format!("HTTP 400: code 81057 record {} rejected", name),
            ));
        }
        Ok(())
    }

    fn name_of(&self, record_id: &str) -> Result<String> {
        self.state
            .records
            .lock()
            .unwrap()
            .get(record_id)
            .map(|r| r.name.clone())
            .ok_or_else(|| {
                Error::provider_mutation("mock-zone", format!("HTTP 404: no record {}", record_id))
            })
    }
}

#[async_trait]
impl DnsProvider for MockZone {
    async fn list_records(&self, page: u32) -> Result<RecordPage> {
        self.state.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let all: Vec<DnsRecord> = self.state.records.lock().unwrap().values().cloned().collect();
        let total_pages = all.len().div_ceil(PAGE_SIZE) as u32;
        let dropped = *self.state.empty_page.lock().unwrap() == Some(page);
        let records = if dropped {
            Vec::new()
        } else {
            all.into_iter()
                .skip((page as usize - 1) * PAGE_SIZE)
                .take(PAGE_SIZE)
                .collect()
        };
        let total_count = self.record_count() as u32;

        Ok(RecordPage {
            records,
            page,
            total_pages,
            total_count: Some(total_count),
        })
    }

    async fn create_record(&self, record: &NewRecord) -> Result<DnsRecord> {
        self.state.create_calls.fetch_add(1, Ordering::SeqCst);
        self.mutation_delay().await;
        self.check_failing(&record.name)?;

        let id = format!("rec-{}", self.state.next_id.fetch_add(1, Ordering::SeqCst));
        let created = DnsRecord {
            id: id.clone(),
            name: record.name.clone(),
            address: record.address,
            ttl: record.ttl,
            proxied: record.proxied,
        };
        self.state.records.lock().unwrap().insert(id, created.clone());
        Ok(created)
    }

    async fn update_record(&self, record_id: &str, address: IpAddr) -> Result<()> {
        self.state.update_calls.fetch_add(1, Ordering::SeqCst);
        self.mutation_delay().await;
        let name = self.name_of(record_id)?;
        self.check_failing(&name)?;

        if let Some(record) = self.state.records.lock().unwrap().get_mut(record_id) {
            record.address = address;
        }
        Ok(())
    }

    async fn delete_record(&self, record_id: &str) -> Result<()> {
        self.state.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.mutation_delay().await;
        let name = self.name_of(record_id)?;
        self.check_failing(&name)?;

        self.state.records.lock().unwrap().remove(record_id);
        Ok(())
    }

    async fn verify(&self) -> Result<()> {
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock-zone"
    }
}

/// Configuration managing `*.ts.example.com` with a one second call timeout
pub fn test_config(dry_run: bool) -> MeshDnsConfig {
    MeshDnsConfig {
        source: SourceConfig::default(),
        provider: ProviderConfig::Cloudflare {
            api_token: "test-token".to_string(),
            zone_id: "test-zone".to_string(),
            api_base: None,
        },
        zone: ZoneConfig {
            domain: "example.com".to_string(),
            subdomain_prefix: "ts".to_string(),
        },
        sync: SyncConfig {
            dry_run,
            timeout_secs: 1,
            interval_secs: 1,
            ..SyncConfig::default()
        },
    }
}

/// A shutdown receiver that never fires
pub fn no_shutdown() -> tokio::sync::watch::Receiver<bool> {
    tokio::sync::watch::channel(false).1
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}
