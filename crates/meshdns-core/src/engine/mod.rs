//! Reconciliation engine
//!
//! The SyncEngine is responsible for:
//! - Fetching the device inventory via InventorySource
//! - Scanning the managed zone via DnsProvider
//! - Computing the reconciliation plan
//! - Applying the plan and reporting a RunSummary
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐            ┌──────────────┐
//! │ InventorySource │            │ DnsProvider  │
//! └─────────────────┘            └──────────────┘
//!          │ devices()                  │ list_records()
//!          ▼                            ▼
//! ┌─────────────────┐            ┌──────────────┐
//! │ DeviceSnapshot  │            │ ZoneSnapshot │
//! └─────────────────┘            └──────────────┘
//!          │                            │
//!          └────────────┬───────────────┘
//!                       ▼
//!               ┌──────────────┐
//!               │  reconcile() │
//!               └──────────────┘
//!                       │ ReconciliationPlan
//!                       ▼
//!               ┌──────────────┐           ┌─────────────┐
//!               │   Executor   │──────────▶│ RunSummary  │
//!               └──────────────┘           └─────────────┘
//! ```
//!
//! ## Run Flow
//!
//! 1. Take the run guard (a second concurrent run fails with `RunInProgress`)
//! 2. Fetch devices and scan the zone concurrently, each bounded by the timeout
//! 3. Abort on any fatal error; nothing has been changed at that point
//! 4. Compute the plan and apply it
//! 5. Emit events for monitoring/logging

use crate::config::{MeshDnsConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorSettings, RunSummary};
use crate::inventory::DeviceSnapshot;
use crate::reconcile::{reconcile, OperationKind, ReconciliationPlan};
use crate::traits::{DnsProvider, InventorySource, MeshDevice};
use crate::zone::{self, ManagedZone, ZoneSnapshot};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// Capacity of the engine event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A run started
    RunStarted { dry_run: bool },

    /// A plan was computed
    PlanComputed {
        creates: usize,
        updates: usize,
        deletes: usize,
        unchanged: usize,
    },

    /// A run finished (possibly with per-operation failures)
    RunCompleted { summary: RunSummary },

    /// A run was aborted by a fatal error
    RunFailed { error: String },

    /// The watch loop stopped
    Stopped { reason: String },
}

/// Result of validate-only mode, one entry per collaborator
#[derive(Debug)]
pub struct ValidationReport {
    /// Number of devices reported by the source
    pub source: Result<usize>,
    /// Provider credential and zone check
    pub provider: Result<()>,
}

impl ValidationReport {
    /// Whether both collaborators answered
    pub fn is_ok(&self) -> bool {
        self.source.is_ok() && self.provider.is_ok()
    }
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Call [`SyncEngine::run_once()`] for a single pass, or
///    [`SyncEngine::watch()`] to repeat on the configured interval
/// 3. Flip the shutdown channel to stop between operations
///
/// ## Threading
///
/// The engine is `Send + Sync`. Runs are serialized by an internal guard,
/// so it can be shared behind an `Arc` without two runs racing on the same
/// records.
pub struct SyncEngine {
    /// Inventory source for the desired state
    source: Box<dyn InventorySource>,

    /// DNS provider for the observed state and mutations
    provider: Box<dyn DnsProvider>,

    /// Ownership scope
    zone: ManagedZone,

    /// Run settings
    sync: SyncConfig,

    /// Held for the whole duration of a run
    run_guard: Mutex<()>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// The configuration is validated before anything else.
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        source: Box<dyn InventorySource>,
        provider: Box<dyn DnsProvider>,
        config: MeshDnsConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let engine = Self {
            source,
            provider,
            zone: ManagedZone::from_config(&config.zone),
            sync: config.sync,
            run_guard: Mutex::new(()),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Ownership scope managed by this engine
    pub fn zone(&self) -> &ManagedZone {
        &self.zone
    }

    /// Whether runs are simulated
    pub fn is_dry_run(&self) -> bool {
        self.sync.dry_run
    }

    /// Fetch the raw device list, bounded by the timeout
    pub async fn devices(&self) -> Result<Vec<MeshDevice>> {
        let timeout = self.sync.timeout();
        let name = self.source.source_name();

        match tokio::time::timeout(timeout, self.source.devices()).await {
            Ok(Ok(devices)) => {
                debug!("{} reported {} device(s)", name, devices.len());
                Ok(devices)
            }
            Ok(Err(e @ Error::SourceUnavailable(_))) => Err(e),
            Ok(Err(e)) => Err(Error::source_unavailable(format!("{}: {}", name, e))),
            Err(_) => Err(Error::source_unavailable(format!(
                "{}: timed out after {:?}",
                name, timeout
            ))),
        }
    }

    /// Build the canonical device snapshot (list-devices mode)
    pub async fn inventory(&self) -> Result<DeviceSnapshot> {
        let devices = self.devices().await?;
        Ok(DeviceSnapshot::build(&devices))
    }

    /// Scan the managed part of the zone
    pub async fn scan(&self) -> Result<ZoneSnapshot> {
        zone::scan(self.provider.as_ref(), &self.zone, self.sync.timeout()).await
    }

    /// Compute the plan without applying it
    pub async fn plan(&self) -> Result<ReconciliationPlan> {
        let (devices, records) = tokio::join!(self.inventory(), self.scan());
        self.build_plan(&devices?, &records?)
    }

    /// Run one reconciliation pass
    ///
    /// # Returns
    ///
    /// - `Ok(RunSummary)`: The plan was applied; check `failed` for
    ///   per-operation errors
    /// - `Err(Error)`: A fatal error aborted the run before any change
    pub async fn run_once(&self, shutdown: &watch::Receiver<bool>) -> Result<RunSummary> {
        let _guard = self.run_guard.try_lock().map_err(|_| Error::RunInProgress)?;
        self.emit_event(EngineEvent::RunStarted {
            dry_run: self.sync.dry_run,
        });

        let result: Result<RunSummary> = async {
            let plan = self.plan().await?;
            Ok(self.execute(&plan, shutdown).await)
        }
        .await;

        self.finish_run(result)
    }

    /// Delete every managed record
    ///
    /// Reconciliation against the empty device set. The inventory source is
    /// not contacted.
    pub async fn cleanup(&self, shutdown: &watch::Receiver<bool>) -> Result<RunSummary> {
        let _guard = self.run_guard.try_lock().map_err(|_| Error::RunInProgress)?;
        self.emit_event(EngineEvent::RunStarted {
            dry_run: self.sync.dry_run,
        });

        let result: Result<RunSummary> = async {
            let records = self.scan().await?;
            warn!(
                "Cleanup requested: removing {} managed record(s) under {}",
                records.record_count(),
                self.zone.suffix()
            );
            let plan = reconcile(&self.zone, &DeviceSnapshot::empty(), &records);
            self.announce_plan(&plan);
            Ok(self.execute(&plan, shutdown).await)
        }
        .await;

        self.finish_run(result)
    }

    /// Exercise both collaborators without planning or applying anything
    pub async fn validate(&self) -> ValidationReport {
        let source = async {
            let devices = self.devices().await?;
            Ok::<usize, Error>(devices.len())
        };
        let provider = async {
            let timeout = self.sync.timeout();
            let name = self.provider.provider_name();
            match tokio::time::timeout(timeout, self.provider.verify()).await {
                Ok(result) => result,
                Err(_) => Err(Error::provider_query(
                    name,
                    format!("verification timed out after {:?}", timeout),
                )),
            }
        };

        let (source, provider) = tokio::join!(source, provider);
        ValidationReport { source, provider }
    }

    /// Run on the configured interval until shutdown
    ///
    /// The first run starts immediately. Missed ticks are skipped, so a
    /// slow run never triggers a burst of catch-up runs. Fatal run errors
    /// are logged and the loop waits for the next tick.
    pub async fn watch(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut interval = tokio::time::interval(self.sync.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);

        info!(
            "Watching {} every {:?}",
            self.zone.suffix().trim_start_matches('.'),
            self.sync.interval()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                Some(_) = ticks.next() => {
                    if let Err(e) = self.run_once(&shutdown).await {
                        error!("Reconciliation run failed: {}", e);
                    }
                }

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown channel closed");
                        break;
                    }
                }
            }
        }

        info!("Shutdown signal received");
        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        Ok(())
    }

    fn build_plan(
        &self,
        devices: &DeviceSnapshot,
        records: &ZoneSnapshot,
    ) -> Result<ReconciliationPlan> {
        if devices.is_empty() && !records.is_empty() {
            if !self.sync.allow_empty_inventory {
                return Err(Error::validation(format!(
                    "Inventory is empty but {} managed record(s) exist; refusing to delete them \
                     (sync.allow_empty_inventory = false)",
                    records.record_count()
                )));
            }
            warn!(
                "Inventory is empty: every managed record ({}) under {} will be deleted",
                records.record_count(),
                self.zone.suffix()
            );
        }

        let plan = reconcile(&self.zone, devices, records);
        self.announce_plan(&plan);
        Ok(plan)
    }

    fn announce_plan(&self, plan: &ReconciliationPlan) {
        let event = EngineEvent::PlanComputed {
            creates: plan.count(OperationKind::Create),
            updates: plan.count(OperationKind::Update),
            deletes: plan.count(OperationKind::Delete),
            unchanged: plan.count(OperationKind::Skip),
        };
        debug!("Plan: {:?}", event);
        self.emit_event(event);
    }

    async fn execute(
        &self,
        plan: &ReconciliationPlan,
        shutdown: &watch::Receiver<bool>,
    ) -> RunSummary {
        let executor = Executor::new(self.provider.as_ref(), ExecutorSettings::from(&self.sync));
        executor.apply(plan, shutdown).await
    }

    fn finish_run(&self, result: Result<RunSummary>) -> Result<RunSummary> {
        match result {
            Ok(summary) => {
                if summary.has_failures() {
                    warn!("{}", summary);
                } else {
                    info!("{}", summary);
                }
                self.emit_event(EngineEvent::RunCompleted {
                    summary: summary.clone(),
                });
                Ok(summary)
            }
            Err(e) => {
                self.emit_event(EngineEvent::RunFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Emit an engine event
    ///
    /// Never blocks: a full channel drops the event with a warning.
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_report_requires_both() {
        let report = ValidationReport {
            source: Ok(3),
            provider: Err(Error::provider_query("cloudflare", "HTTP 403")),
        };
        assert!(!report.is_ok());

        let report = ValidationReport {
            source: Ok(0),
            provider: Ok(()),
        };
        assert!(report.is_ok());
    }

    #[test]
    fn engine_events_compare() {
        let event = EngineEvent::PlanComputed {
            creates: 1,
            updates: 0,
            deletes: 2,
            unchanged: 3,
        };
        assert_eq!(event.clone(), event);
    }
}
