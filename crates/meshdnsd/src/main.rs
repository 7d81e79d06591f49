// # meshdnsd - Mesh DNS Sync Daemon
//
// Thin integration layer: all reconciliation logic lives in meshdns-core.
//
// The meshdnsd binary is responsible for:
// 1. Parsing flags and loading layered configuration (file, env, flags)
// 2. Initializing logging and the runtime
// 3. Registering providers and inventory sources
// 4. Running the engine in the selected mode
//
// ## Modes
//
// - default: one reconciliation run
// - `--watch`: a run every `sync.interval_secs` until SIGINT/SIGTERM
// - `--list-devices`: print the devices that would get records
// - `--cleanup`: delete every managed record
// - `--validate`: check both collaborators, change nothing
//
// ## Environment
//
// - `CLOUDFLARE_API_TOKEN`, `CLOUDFLARE_ZONE_ID`: provider credentials
// - `CLOUDFLARE_DOMAIN`, `CLOUDFLARE_SUBDOMAIN_PREFIX`: managed zone
// - `SYNC_INTERVAL_SECONDS`, `SYNC_LOG_LEVEL`: watch interval and logging
// - `MESHDNS_TIMEOUT_SECS`: per-call timeout
// - `TAILSCALE_BINARY`: path to the tailscale CLI
//
// ## Example
//
// ```bash
// export CLOUDFLARE_API_TOKEN=your_token
// export CLOUDFLARE_ZONE_ID=your_zone_id
// export CLOUDFLARE_DOMAIN=example.com
//
// meshdnsd --dry-run
// meshdnsd --watch --interval 120
// ```

mod cli;
mod settings;

use anyhow::Result;
use clap::Parser;
use meshdns_core::{
    DeviceSnapshot, EngineEvent, MeshDnsConfig, PluginRegistry, RunSummary, SyncEngine,
};
use std::process::ExitCode;
use tokio::sync::{mpsc, watch};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use cli::{Cli, Mode};

/// Exit codes for different termination scenarios
///
/// - 0: Every operation succeeded (or nothing to do)
/// - 1: Configuration error or a collaborator was unreachable
/// - 2: Some operations failed, or shutdown stopped the run before every
///   planned operation was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MeshDnsExitCode {
    Success = 0,
    Fatal = 1,
    PartialFailure = 2,
}

impl From<MeshDnsExitCode> for ExitCode {
    fn from(code: MeshDnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

impl MeshDnsExitCode {
    fn for_summary(summary: &RunSummary) -> Self {
        if summary.has_failures() || summary.interrupted {
            MeshDnsExitCode::PartialFailure
        } else {
            MeshDnsExitCode::Success
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match settings::load(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return MeshDnsExitCode::Fatal.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&settings.config.sync.log_level))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return MeshDnsExitCode::Fatal.into();
    }

    match &settings.file {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => warn!(
            "Config file {} not found. Relying on environment variables",
            cli.config.display()
        ),
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return MeshDnsExitCode::Fatal.into();
        }
    };

    let code = rt.block_on(async {
        match run_daemon(cli.mode(), settings.config).await {
            Ok(code) => code,
            Err(e) => {
                error!("{:#}", e);
                MeshDnsExitCode::Fatal
            }
        }
    });

    code.into()
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn build_registry() -> PluginRegistry {
    let registry = PluginRegistry::new();

    #[cfg(feature = "cloudflare")]
    meshdns_provider_cloudflare::register(&registry);

    #[cfg(feature = "tailscale")]
    meshdns_source_tailscale::register(&registry);

    debug!(
        "Registered providers {:?} and sources {:?}",
        registry.list_providers(),
        registry.list_sources()
    );
    registry
}

/// Run the daemon in the selected mode
async fn run_daemon(mode: Mode, config: MeshDnsConfig) -> Result<MeshDnsExitCode> {
    let registry = build_registry();
    let source = registry.create_source(&config.source, &config.sync)?;
    let provider = registry.create_provider(&config.provider, &config.sync)?;

    info!(
        "Starting meshdnsd (source: {}, provider: {}, dry run: {})",
        source.source_name(),
        provider.provider_name(),
        config.sync.dry_run
    );

    let (engine, events) = SyncEngine::new(source, provider, config)?;
    let event_task = tokio::spawn(log_events(events));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => {
                info!("Received {}, finishing the current operation", signal);
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!("Signal handling unavailable: {:#}", e);
                // keep the sender alive so the engine does not see a closed channel
                std::future::pending::<()>().await;
            }
        }
    });

    let result = match mode {
        Mode::Once => engine
            .run_once(&shutdown_rx)
            .await
            .map(|summary| MeshDnsExitCode::for_summary(&summary)),
        Mode::Cleanup => engine
            .cleanup(&shutdown_rx)
            .await
            .map(|summary| MeshDnsExitCode::for_summary(&summary)),
        Mode::Watch => engine
            .watch(shutdown_rx)
            .await
            .map(|()| MeshDnsExitCode::Success),
        Mode::ListDevices => engine.inventory().await.map(|snapshot| {
            print_devices(&engine, &snapshot);
            MeshDnsExitCode::Success
        }),
        Mode::Validate => Ok(validate(&engine).await),
    };

    signal_task.abort();
    drop(engine);
    let _ = event_task.await;

    Ok(result?)
}

fn print_devices(engine: &SyncEngine, snapshot: &DeviceSnapshot) {
    println!("{} device(s) eligible for DNS records:", snapshot.len());
    for (host, address) in snapshot.iter() {
        println!("  {:<48} {}", engine.zone().record_name(host), address);
    }

    let excluded = snapshot.excluded();
    if !excluded.is_empty() {
        println!("{} device(s) excluded:", excluded.len());
        for exclusion in excluded {
            println!(
                "  {} ({}): {}",
                exclusion.name, exclusion.device_id, exclusion.reason
            );
        }
    }
}

async fn validate(engine: &SyncEngine) -> MeshDnsExitCode {
    let report = engine.validate().await;

    match &report.source {
        Ok(count) => println!("Inventory source: OK ({} device(s))", count),
        Err(e) => println!("Inventory source: FAILED ({})", e),
    }
    match &report.provider {
        Ok(()) => println!("DNS provider: OK"),
        Err(e) => println!("DNS provider: FAILED ({})", e),
    }

    if report.is_ok() {
        println!("Configuration and connectivity are valid");
        MeshDnsExitCode::Success
    } else {
        MeshDnsExitCode::Fatal
    }
}

async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Engine event: {:?}", event);
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
