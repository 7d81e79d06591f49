//! Plan executor
//!
//! Applies a [`ReconciliationPlan`] one operation at a time, one provider
//! call per operation. Failures are collected in the [`RunSummary`] and the
//! remaining operations still run.
//!
//! In simulate mode nothing is sent to the provider. The log lines are the
//! same as in a live run except for the verb ("would create" vs "created"),
//! and the counts match what a live run without failures would report.
//!
//! A shutdown request is honored between operations. The call in flight
//! completes; everything after it is left unapplied and the summary is
//! marked as interrupted.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::reconcile::{Operation, OperationKind, ReconciliationPlan};
use crate::traits::{DnsProvider, NewRecord};

/// Settings the executor needs from the sync configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Simulate only
    pub dry_run: bool,
    /// TTL for created records
    pub ttl: u32,
    /// Proxied flag for created records
    pub proxied: bool,
    /// Upper bound for each provider call
    pub timeout: Duration,
}

impl From<&SyncConfig> for ExecutorSettings {
    fn from(sync: &SyncConfig) -> Self {
        Self {
            dry_run: sync.dry_run,
            ttl: sync.ttl,
            proxied: sync.proxied,
            timeout: sync.timeout(),
        }
    }
}

/// A failed operation, with enough context to diagnose it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationError {
    /// Kind of the failed operation
    pub kind: String,
    /// Managed name the operation targeted
    pub name: String,
    /// Provider id of the record, when the operation addressed one
    pub record_id: Option<String>,
    /// Provider error, including status and error codes
    pub message: String,
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.record_id {
            Some(id) => write!(f, "{} {} (record {}): {}", self.kind, self.name, id, self.message),
            None => write!(f, "{} {}: {}", self.kind, self.name, self.message),
        }
    }
}

/// Outcome of one reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Records that already matched
    pub skipped: usize,
    pub failed: usize,
    /// Per-operation failures, in plan order
    pub errors: Vec<OperationError>,
    /// Whether this was a simulated run
    pub dry_run: bool,
    /// Whether a shutdown request cut the run short
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    /// Start a new, empty summary
    pub fn new(dry_run: bool) -> Self {
        Self {
            created: 0,
            updated: 0,
            deleted: 0,
            skipped: 0,
            failed: 0,
            errors: Vec::new(),
            dry_run,
            interrupted: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Whether at least one operation failed
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Number of successful (or simulated) mutations
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    fn record_success(&mut self, kind: OperationKind) {
        match kind {
            OperationKind::Create => self.created += 1,
            OperationKind::Update => self.updated += 1,
            OperationKind::Delete => self.deleted += 1,
            OperationKind::Skip => self.skipped += 1,
        }
    }

    fn record_failure(&mut self, op: &Operation, err: &Error) {
        self.failed += 1;
        self.errors.push(OperationError {
            kind: op.kind().to_string(),
            name: op.name().to_string(),
            record_id: op.record_id().map(str::to_string),
            message: err.to_string(),
        });
    }

    fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run { "planned" } else { "performed" };
        write!(
            f,
            "Synchronization {}: {} created, {} updated, {} deleted, {} unchanged, {} failed",
            verb, self.created, self.updated, self.deleted, self.skipped, self.failed
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

/// Applies plans against a provider
pub struct Executor<'a> {
    provider: &'a dyn DnsProvider,
    settings: ExecutorSettings,
}

impl<'a> Executor<'a> {
    pub fn new(provider: &'a dyn DnsProvider, settings: ExecutorSettings) -> Self {
        Self { provider, settings }
    }

    /// Apply every operation of the plan
    ///
    /// Never fails as a whole: per-operation errors end up in the summary.
    pub async fn apply(
        &self,
        plan: &ReconciliationPlan,
        shutdown: &watch::Receiver<bool>,
    ) -> RunSummary {
        let mut summary = RunSummary::new(self.settings.dry_run);

        for (index, op) in plan.iter().enumerate() {
            if *shutdown.borrow() {
                warn!(
                    "Shutdown requested, leaving {} operation(s) unapplied",
                    plan.len() - index
                );
                summary.interrupted = true;
                break;
            }

            match self.apply_one(op).await {
                Ok(()) => summary.record_success(op.kind()),
                Err(e) => {
                    error!("Failed to {} {}: {}", op.kind(), op.name(), e);
                    summary.record_failure(op, &e);
                }
            }
        }

        summary.finish();
        summary
    }

    async fn apply_one(&self, op: &Operation) -> Result<()> {
        let dry_run = self.settings.dry_run;

        match op {
            Operation::Skip { name, address } => {
                debug!("{} {} -> {}", verb(dry_run, OperationKind::Skip), name, address);
                Ok(())
            }

            Operation::Create { name, address } => {
                if !dry_run {
                    let record = NewRecord {
                        name: name.clone(),
                        address: *address,
                        ttl: self.settings.ttl,
                        proxied: self.settings.proxied,
                    };
                    self.call(self.provider.create_record(&record)).await?;
                }
                info!("{} {} -> {}", verb(dry_run, OperationKind::Create), name, address);
                Ok(())
            }

            Operation::Update {
                record_id,
                name,
                old_address,
                new_address,
            } => {
                if !dry_run {
                    self.call(self.provider.update_record(record_id, *new_address))
                        .await?;
                }
                info!(
                    "{} {}: {} -> {}",
                    verb(dry_run, OperationKind::Update),
                    name,
                    old_address,
                    new_address
                );
                Ok(())
            }

            Operation::Delete {
                record_id,
                name,
                address,
                reason,
            } => {
                if !dry_run {
                    self.call(self.provider.delete_record(record_id)).await?;
                }
                info!(
                    "{} {} ({}, {} record {})",
                    verb(dry_run, OperationKind::Delete),
                    name,
                    address,
                    reason,
                    record_id
                );
                Ok(())
            }
        }
    }

    /// Bound a mutation call by the timeout and keep errors in the mutation class
    async fn call<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let provider = self.provider.provider_name();
        match tokio::time::timeout(self.settings.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e @ Error::ProviderMutation { .. })) => Err(e),
            Ok(Err(other)) => Err(Error::provider_mutation(provider, other.to_string())),
            Err(_) => Err(Error::provider_mutation(
                provider,
                format!("timed out after {:?}", self.settings.timeout),
            )),
        }
    }
}

fn verb(dry_run: bool, kind: OperationKind) -> &'static str {
    match (dry_run, kind) {
        (false, OperationKind::Create) => "Created",
        (false, OperationKind::Update) => "Updated",
        (false, OperationKind::Delete) => "Deleted",
        (true, OperationKind::Create) => "Would create",
        (true, OperationKind::Update) => "Would update",
        (true, OperationKind::Delete) => "Would delete",
        (_, OperationKind::Skip) => "Unchanged",
    }
}
