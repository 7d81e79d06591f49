//! Layered daemon settings
//!
//! Precedence, lowest first: built-in defaults, JSON file, environment
//! variables, command-line flags. The merged result is validated once.

use anyhow::{Context, Result};
use meshdns_core::config::{MeshDnsConfig, ProviderConfig, SourceConfig};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::cli::Cli;

/// Configuration plus where it came from
#[derive(Debug)]
pub struct Settings {
    pub config: MeshDnsConfig,
    /// The config file, if one was found
    pub file: Option<PathBuf>,
}

/// Load settings from the real process environment
pub fn load(cli: &Cli) -> Result<Settings> {
    load_with(cli, |key| std::env::var(key).ok())
}

/// Load settings with an injectable environment lookup
pub fn load_with<F>(cli: &Cli, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let (mut config, file) = read_file(&cli.config)?;
    apply_env(&mut config, |key| env(key).filter(|v| !v.trim().is_empty()))?;
    apply_flags(&mut config, cli);
    config.validate()?;
    Ok(Settings { config, file })
}

fn read_file(path: &Path) -> Result<(MeshDnsConfig, Option<PathBuf>)> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((MeshDnsConfig::default(), None)),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read config file {}", path.display()));
        }
    };

    let config = if contents.trim().is_empty() {
        MeshDnsConfig::default()
    } else {
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?
    };
    Ok((config, Some(path.to_path_buf())))
}

fn apply_env<F>(config: &mut MeshDnsConfig, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let ProviderConfig::Cloudflare {
        api_token, zone_id, ..
    } = &mut config.provider
    {
        if let Some(token) = env("CLOUDFLARE_API_TOKEN") {
            *api_token = token;
        }
        if let Some(zone) = env("CLOUDFLARE_ZONE_ID") {
            *zone_id = zone;
        }
    }

    if let Some(domain) = env("CLOUDFLARE_DOMAIN") {
        config.zone.domain = domain;
    }
    if let Some(prefix) = env("CLOUDFLARE_SUBDOMAIN_PREFIX") {
        config.zone.subdomain_prefix = prefix;
    }

    if let Some(interval) = parse_env(&env, "SYNC_INTERVAL_SECONDS")? {
        config.sync.interval_secs = interval;
    }
    if let Some(timeout) = parse_env(&env, "MESHDNS_TIMEOUT_SECS")? {
        config.sync.timeout_secs = timeout;
    }
    if let Some(level) = env("SYNC_LOG_LEVEL") {
        config.sync.log_level = level.to_lowercase();
    }

    if let SourceConfig::TailscaleCli { binary } = &mut config.source
        && let Some(path) = env("TAILSCALE_BINARY")
    {
        *binary = path;
    }

    Ok(())
}

fn parse_env<F, T>(env: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got '{}'", key, raw))
        })
        .transpose()
}

fn apply_flags(config: &mut MeshDnsConfig, cli: &Cli) {
    if cli.dry_run {
        config.sync.dry_run = true;
    }
    if let Some(interval) = cli.interval {
        config.sync.interval_secs = interval;
    }
    if let Some(level) = &cli.log_level {
        config.sync.log_level = level.to_lowercase();
    }
}
