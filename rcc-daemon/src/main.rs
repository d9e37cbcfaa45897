//! Radio Control Container daemon
//!
//! Loads the fleet configuration, connects every radio, and keeps the fleet
//! healthy with background probing until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rcc_fleet::{
    build_registry, AuditLog, FleetConfig, Orchestrator, ProbeSchedule, Prober,
    StaticTokenGate, TelemetryHub,
};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "rccd=info,rcc_fleet=info,rcc_adapter=info,rcc_sim=info";

#[derive(Parser, Debug)]
#[command(name = "rccd", about = "Radio control container daemon")]
struct Cli {
    /// Fleet configuration file (defaults to $XDG_CONFIG_HOME/rcc/fleet.json)
    #[arg(long, env = "RCC_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, overrides RUST_LOG
    #[arg(long, env = "RCC_LOG")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Run the fleet until interrupted
    #[default]
    Run,
    /// Validate the configuration, print the radio list and exit
    Check,
}

fn init_tracing(cli: &Cli) {
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_config(cli: &Cli) -> Result<FleetConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => FleetConfig::default_path().context("no configuration directory available")?,
    };
    FleetConfig::load(&path).with_context(|| format!("loading {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = load_config(&cli)?;
    match cli.command.unwrap_or_default() {
        Command::Check => check(&config),
        Command::Run => run(config).await,
    }
}

fn check(config: &FleetConfig) -> Result<()> {
    let registry = build_registry(config).context("building radio registry")?;
    let radios = serde_json::to_string_pretty(&registry.list_radios())?;
    println!("{}", radios);
    log_grants(&StaticTokenGate::from_config(&config.security));
    info!("Configuration valid: {} radio(s)", registry.len());
    Ok(())
}

async fn run(config: FleetConfig) -> Result<()> {
    info!("Starting radio control container {}", config.container_id);

    let registry = Arc::new(build_registry(&config).context("building radio registry")?);
    log_grants(&StaticTokenGate::from_config(&config.security));

    let audit_dir = config
        .audit
        .resolved_directory()
        .context("no directory available for the audit log")?;
    let (audit, audit_writer) = AuditLog::open(&audit_dir, config.audit.queue_capacity)
        .await
        .with_context(|| format!("opening audit log in {}", audit_dir.display()))?;
    info!("Audit log: {}", audit.path().display());

    let hub = Arc::new(TelemetryHub::from_config(&config.telemetry));
    let telemetry_log = tokio::spawn(log_telemetry(hub.subscribe()));

    let orchestrator = Orchestrator::new(registry, Arc::new(audit), hub.clone())
        .with_busy_policy(config.dispatch.busy_policy)
        .with_container_id(&config.container_id);

    for (radio_id, result) in orchestrator.start().await {
        if !result.is_ok() {
            warn!("Radio {} not connected at startup: {}", radio_id, result);
        }
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let prober = Prober::new(
        orchestrator.clone(),
        ProbeSchedule::from_config(&config.recovery),
    );
    let prober_task = tokio::spawn(prober.run(stop_rx));
    let heartbeat = hub.spawn_heartbeat(config.heartbeat_interval());

    wait_for_shutdown().await;
    info!("Shutting down");

    stop_tx.send_replace(true);
    hub.shutdown();
    if let Err(e) = prober_task.await {
        warn!("Prober task failed: {}", e);
    }
    if let Err(e) = heartbeat.await {
        warn!("Heartbeat task failed: {}", e);
    }

    orchestrator.shutdown().await;
    drop(orchestrator);
    drop(hub);

    // The writer drains once every handle to the log is gone
    if let Err(e) = audit_writer.await {
        warn!("Audit writer failed: {}", e);
    }
    telemetry_log.abort();

    info!("Radio control container stopped");
    Ok(())
}

fn log_grants(gate: &StaticTokenGate) {
    for (subject, scope) in gate.subjects() {
        info!("Access grant: {} ({})", subject, scope);
    }
    if gate.allows_unauthenticated_viewer() {
        warn!("Unauthenticated callers get viewer access");
    }
}

async fn log_telemetry(mut rx: broadcast::Receiver<rcc_fleet::TelemetryRecord>) {
    loop {
        match rx.recv().await {
            Ok(record) => debug!("telemetry {}", record.to_json()),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Telemetry logger lagged, {} event(s) skipped", missed)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn wait_for_shutdown() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
    }
}
