//! Inventory snapshot builder
//!
//! Turns the raw device list of the mesh network into a canonical mapping
//! `sanitized hostname -> address`. Devices that cannot be published are
//! kept aside as [`Exclusion`]s so callers can report them.
//!
//! ## Rules
//!
//! - Hostnames are lowercased; anything outside `[a-z0-9-]` becomes `-`;
//!   leading/trailing hyphens are trimmed; the label is cut to 63 bytes.
//! - The canonical address is the first IPv4 address that is not link-local.
//! - When two devices sanitize to the same label, the first one seen wins.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use tracing::{debug, warn};

use crate::config::MAX_LABEL_LEN;
use crate::traits::MeshDevice;

const FILLER: char = '-';

/// Why a device was left out of the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    /// The name sanitizes to an empty label
    InvalidName,
    /// The device has no usable IPv4 address
    NoAddress,
    /// Another device already claimed the same label
    DuplicateName {
        /// Label both devices map to
        label: String,
        /// Id of the device that kept the label
        kept_device_id: String,
    },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::InvalidName => write!(f, "name is not a usable DNS label"),
            ExclusionReason::NoAddress => write!(f, "no usable IPv4 address"),
            ExclusionReason::DuplicateName {
                label,
                kept_device_id,
            } => write!(f, "label '{}' already taken by device {}", label, kept_device_id),
        }
    }
}

/// A device left out of the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    /// Control-plane id of the device
    pub device_id: String,
    /// Raw device name
    pub name: String,
    /// Why it was excluded
    pub reason: ExclusionReason,
}

/// Canonical view of the inventory for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSnapshot {
    devices: BTreeMap<String, IpAddr>,
    excluded: Vec<Exclusion>,
}

impl DeviceSnapshot {
    /// A snapshot with no devices (used by cleanup)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the snapshot from the raw device list
    pub fn build(devices: &[MeshDevice]) -> Self {
        let mut snapshot = Self::default();
        let mut owners: BTreeMap<String, String> = BTreeMap::new();

        for device in devices {
            let Some(label) = sanitize_label(&device.name) else {
                warn!(
                    "Excluding device {} ({:?}): name is not a usable DNS label",
                    device.id, device.name
                );
                snapshot.exclude(device, ExclusionReason::InvalidName);
                continue;
            };

            let Some(address) = canonical_address(&device.addresses) else {
                debug!(
                    "Excluding device {} ({}): no usable IPv4 address in {:?}",
                    device.id, device.name, device.addresses
                );
                snapshot.exclude(device, ExclusionReason::NoAddress);
                continue;
            };

            if let Some(kept) = owners.get(&label) {
                warn!(
                    "Duplicate hostname '{}': keeping device {}, ignoring device {} ({})",
                    label, kept, device.id, address
                );
                let reason = ExclusionReason::DuplicateName {
                    label: label.clone(),
                    kept_device_id: kept.clone(),
                };
                snapshot.exclude(device, reason);
                continue;
            }

            owners.insert(label.clone(), device.id.clone());
            snapshot.devices.insert(label, address);
        }

        snapshot
    }

    fn exclude(&mut self, device: &MeshDevice, reason: ExclusionReason) {
        self.excluded.push(Exclusion {
            device_id: device.id.clone(),
            name: device.name.clone(),
            reason,
        });
    }

    /// Address published for a sanitized hostname
    pub fn get(&self, hostname: &str) -> Option<IpAddr> {
        self.devices.get(hostname).copied()
    }

    /// Iterate `(hostname, address)` pairs in hostname order
    pub fn iter(&self) -> impl Iterator<Item = (&str, IpAddr)> {
        self.devices.iter().map(|(name, ip)| (name.as_str(), *ip))
    }

    /// Number of publishable devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is publishable
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices left out of the snapshot
    pub fn excluded(&self) -> &[Exclusion] {
        &self.excluded
    }
}

/// Sanitize a device name into a DNS label
///
/// Returns `None` when nothing but filler would remain.
pub fn sanitize_label(name: &str) -> Option<String> {
    let mapped: String = name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == FILLER {
                c
            } else {
                FILLER
            }
        })
        .collect();

    let trimmed = mapped.trim_matches(FILLER);
    // ASCII only at this point, so byte truncation is safe
    let truncated = &trimmed[..trimmed.len().min(MAX_LABEL_LEN)];
    let label = truncated.trim_end_matches(FILLER);

    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

/// Pick the address to publish for a device
///
/// First IPv4 address that is not link-local (169.254.0.0/16).
pub fn canonical_address(addresses: &[IpAddr]) -> Option<IpAddr> {
    addresses.iter().copied().find(|ip| match ip {
        IpAddr::V4(v4) => !v4.is_link_local() && !v4.is_unspecified(),
        IpAddr::V6(_) => false,
    })
}
