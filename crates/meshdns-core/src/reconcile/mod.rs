//! Reconciler
//!
//! Pure three-way diff between the desired state (device snapshot) and the
//! observed state (managed zone snapshot), keyed by the fully-qualified
//! managed record name.
//!
//! | devices | zone | operation |
//! |---------|------|-----------|
//! | yes     | no   | `Create`  |
//! | yes     | yes, same address | `Skip` |
//! | yes     | yes, other address | `Update` |
//! | no      | yes  | `Delete` (stale) |
//!
//! Only the address drives updates; TTL and proxied are left alone.
//!
//! When the zone holds several records under one managed name, the record
//! with the smallest provider id is canonical and every other one is
//! planned for deletion as a duplicate, right after the name's primary
//! operation.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use tracing::warn;

use crate::inventory::DeviceSnapshot;
use crate::traits::DnsRecord;
use crate::zone::{ManagedZone, ZoneSnapshot};

/// Kind of a planned operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Skip,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// Why a record is planned for deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReason {
    /// No device maps to the name anymore
    Stale,
    /// Another record with the same name is canonical
    Duplicate,
}

impl fmt::Display for DeleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteReason::Stale => f.write_str("stale"),
            DeleteReason::Duplicate => f.write_str("duplicate"),
        }
    }
}

/// One step of a reconciliation plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Publish a new record
    Create { name: String, address: IpAddr },

    /// Change the address of an existing record
    Update {
        record_id: String,
        name: String,
        old_address: IpAddr,
        new_address: IpAddr,
    },

    /// Remove a record
    Delete {
        record_id: String,
        name: String,
        address: IpAddr,
        reason: DeleteReason,
    },

    /// Record already matches
    Skip { name: String, address: IpAddr },
}

impl Operation {
    /// Managed name targeted by the operation
    pub fn name(&self) -> &str {
        match self {
            Operation::Create { name, .. }
            | Operation::Update { name, .. }
            | Operation::Delete { name, .. }
            | Operation::Skip { name, .. } => name,
        }
    }

    /// Provider id of the targeted record, if one exists yet
    pub fn record_id(&self) -> Option<&str> {
        match self {
            Operation::Update { record_id, .. } | Operation::Delete { record_id, .. } => {
                Some(record_id)
            }
            Operation::Create { .. } | Operation::Skip { .. } => None,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create { .. } => OperationKind::Create,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Skip { .. } => OperationKind::Skip,
        }
    }

    /// Whether applying the operation calls the provider
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Skip { .. })
    }
}

/// Ordered list of operations for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    operations: Vec<Operation>,
}

impl ReconciliationPlan {
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of operations of one kind
    pub fn count(&self, kind: OperationKind) -> usize {
        self.operations.iter().filter(|op| op.kind() == kind).count()
    }

    /// Number of operations that call the provider
    pub fn mutation_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_mutation()).count()
    }

    /// Whether the zone already matches the inventory
    pub fn is_converged(&self) -> bool {
        self.mutation_count() == 0
    }
}

impl<'a> IntoIterator for &'a ReconciliationPlan {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

/// Compute the plan turning `records` into `devices`
///
/// Pure function of its inputs. Operations come out sorted by name.
pub fn reconcile(
    zone: &ManagedZone,
    devices: &DeviceSnapshot,
    records: &ZoneSnapshot,
) -> ReconciliationPlan {
    let desired: std::collections::BTreeMap<String, IpAddr> = devices
        .iter()
        .map(|(hostname, address)| (zone.record_name(hostname), address))
        .collect();

    let names: BTreeSet<&str> = desired
        .keys()
        .map(String::as_str)
        .chain(records.iter().map(|(name, _)| name))
        .collect();

    let mut operations = Vec::with_capacity(names.len());

    for name in names {
        let mut existing: Vec<&DnsRecord> = records.get(name).iter().collect();
        existing.sort_by(|a, b| a.id.cmp(&b.id));

        let (canonical, duplicates) = match existing.split_first() {
            Some((first, rest)) => (Some(*first), rest),
            None => (None, &[][..]),
        };

        let primary = match (desired.get(name), canonical) {
            (Some(&address), None) => Operation::Create {
                name: name.to_string(),
                address,
            },
            (Some(&address), Some(record)) if record.address == address => Operation::Skip {
                name: name.to_string(),
                address,
            },
            (Some(&address), Some(record)) => Operation::Update {
                record_id: record.id.clone(),
                name: name.to_string(),
                old_address: record.address,
                new_address: address,
            },
            (None, Some(record)) => Operation::Delete {
                record_id: record.id.clone(),
                name: name.to_string(),
                address: record.address,
                reason: DeleteReason::Stale,
            },
            // every name comes from one of the two sides
            (None, None) => continue,
        };
        operations.push(primary);

        for duplicate in duplicates {
            warn!(
                "Duplicate record {} for {} ({}): planning deletion",
                duplicate.id, name, duplicate.address
            );
            operations.push(Operation::Delete {
                record_id: duplicate.id.clone(),
                name: name.to_string(),
                address: duplicate.address,
                reason: DeleteReason::Duplicate,
            });
        }
    }

    ReconciliationPlan { operations }
}
