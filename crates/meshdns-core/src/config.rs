//! Configuration types for the meshdns system
//!
//! This module defines the configuration consumed by the engine, the
//! provider and the inventory source. Loading (file, environment, flags)
//! lives in the daemon; everything here is plain data plus validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Error;

/// Longest allowed DNS label (RFC 1035)
pub const MAX_LABEL_LEN: usize = 63;

/// Longest allowed DNS name (RFC 1035)
pub const MAX_NAME_LEN: usize = 253;

/// Main meshdns configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshDnsConfig {
    /// Inventory source configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// DNS provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Ownership scope inside the DNS zone
    #[serde(default)]
    pub zone: ZoneConfig,

    /// Reconciliation settings
    #[serde(default)]
    pub sync: SyncConfig,
}

impl MeshDnsConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    ///
    /// Runs before any collaborator is contacted.
    pub fn validate(&self) -> Result<(), Error> {
        self.zone.validate()?;
        self.provider.validate()?;
        self.source.validate()?;
        self.sync.validate()?;
        Ok(())
    }
}

/// Inventory source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Local `tailscale` CLI (`tailscale status --json`)
    TailscaleCli {
        /// Path or name of the tailscale binary
        #[serde(default = "default_tailscale_binary")]
        binary: String,
    },

    /// Custom inventory source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            SourceConfig::TailscaleCli { binary } => {
                if binary.trim().is_empty() {
                    return Err(Error::validation("Tailscale binary path cannot be empty"));
                }
                Ok(())
            }
            SourceConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(Error::validation("Custom source factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::TailscaleCli { .. } => "tailscale_cli",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::TailscaleCli {
            binary: default_tailscale_binary(),
        }
    }
}

fn default_tailscale_binary() -> String {
    "tailscale".to_string()
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        #[serde(default)]
        api_token: String,
        /// Zone ID holding the managed records
        #[serde(default)]
        zone_id: String,
        /// API base URL override (tests, proxies)
        #[serde(default)]
        api_base: Option<String>,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            ProviderConfig::Cloudflare {
                api_token, zone_id, ..
            } => {
                if api_token.is_empty() {
                    return Err(Error::validation(
                        "Missing Cloudflare API token (set CLOUDFLARE_API_TOKEN)",
                    ));
                }
                if zone_id.is_empty() {
                    return Err(Error::validation(
                        "Missing Cloudflare zone ID (set CLOUDFLARE_ZONE_ID)",
                    ));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(Error::validation("Custom provider factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Cloudflare {
            api_token: String::new(),
            zone_id: String::new(),
            api_base: None,
        }
    }
}

/// Ownership scope: records are named `<host>.<subdomain_prefix>.<domain>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Target domain (required)
    #[serde(default)]
    pub domain: String,

    /// Subdomain prefix marking records owned by meshdns
    #[serde(default = "default_subdomain_prefix")]
    pub subdomain_prefix: String,
}

impl ZoneConfig {
    /// Validate the zone configuration
    pub fn validate(&self) -> Result<(), Error> {
        if self.domain.trim().is_empty() {
            return Err(Error::validation(
                "Missing target domain (set CLOUDFLARE_DOMAIN)",
            ));
        }
        validate_dns_name(&self.domain)
            .map_err(|e| Error::validation(format!("Invalid domain '{}': {}", self.domain, e)))?;
        validate_dns_name(&self.subdomain_prefix).map_err(|e| {
            Error::validation(format!(
                "Invalid subdomain prefix '{}': {}",
                self.subdomain_prefix, e
            ))
        })?;

        // every sanitized host label (up to 63 chars plus a dot) must still fit
        let suffix_len = self.subdomain_prefix.len() + 1 + self.domain.len();
        if suffix_len + MAX_LABEL_LEN + 1 > MAX_NAME_LEN {
            return Err(Error::validation(format!(
                "Managed suffix '{}.{}' is too long: {} chars leaves no room for a {}-char host label (max name {})",
                self.subdomain_prefix, self.domain, suffix_len, MAX_LABEL_LEN, MAX_NAME_LEN
            )));
        }
        Ok(())
    }
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            subdomain_prefix: default_subdomain_prefix(),
        }
    }
}

fn default_subdomain_prefix() -> String {
    "ts".to_string()
}

/// Reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Interval between runs in watch mode (in seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound for every collaborator call (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Simulate only: plan and report, never mutate
    #[serde(default)]
    pub dry_run: bool,

    /// TTL for created records (1 means "automatic" on Cloudflare)
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Proxied flag for created records
    #[serde(default)]
    pub proxied: bool,

    /// Whether an empty inventory may delete every managed record
    ///
    /// When false, a run seeing zero devices and a non-empty managed zone
    /// fails with a validation error instead of planning the deletions.
    #[serde(default = "default_allow_empty_inventory")]
    pub allow_empty_inventory: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl SyncConfig {
    /// Validate the sync settings
    pub fn validate(&self) -> Result<(), Error> {
        if self.interval_secs == 0 {
            return Err(Error::validation("sync.interval_secs must be a positive integer"));
        }
        if self.timeout_secs == 0 {
            return Err(Error::validation("sync.timeout_secs must be a positive integer"));
        }
        if self.ttl != 1 && !(60..=86400).contains(&self.ttl) {
            return Err(Error::validation(format!(
                "sync.ttl must be 1 (automatic) or between 60 and 86400. Got: {}",
                self.ttl
            )));
        }
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "warning" | "error" => Ok(()),
            _ => Err(Error::validation(format!(
                "sync.log_level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                self.log_level
            ))),
        }
    }

    /// Per-call timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Watch interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            dry_run: false,
            ttl: default_ttl(),
            proxied: false,
            allow_empty_inventory: default_allow_empty_inventory(),
            log_level: default_log_level(),
        }
    }
}

fn default_interval_secs() -> u64 {
    300
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_ttl() -> u32 {
    300
}

fn default_allow_empty_inventory() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Validate that a string is a valid DNS name
///
/// Basic RFC 1035 checks: non-empty labels of at most 63 characters,
/// alphanumeric or hyphen, no leading/trailing hyphen, 253 characters total.
pub fn validate_dns_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("name too long: {} chars (max {})", name.len(), MAX_NAME_LEN));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err("name has an empty label".to_string());
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(format!(
                "label '{}' too long: {} chars (max {})",
                label,
                label.len(),
                MAX_LABEL_LEN
            ));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(format!(
                "label '{}' contains invalid characters (alphanumeric and hyphen only)",
                label
            ));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("label '{}' cannot start or end with a hyphen", label));
        }
    }

    Ok(())
}
