//! Compressor Monitor
//!
//! Duty-cycle anomaly detection for a refrigeration compressor, driven by a
//! surface temperature probe and a piezo vibration pickup.
//!
//! # Usage
//!
//! ```bash
//! # Simulated compressor, 100x faster than real time
//! cargo run --release -- --speed 100
//!
//! # Replay a recorded capture (channel,value rows)
//! ./compressor-monitor --replay capture.csv --speed 0
//!
//! # Live probe pacing: timestamps come from the monotonic clock
//! ./compressor-monitor --wall-clock
//!
//! # Print the effective configuration
//! ./compressor-monitor --dump-config
//! ```
//!
//! # Environment Variables
//!
//! - `COMPRESSOR_CONFIG`: Path to a TOML config file
//! - `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID`: Post status to a Telegram
//!   chat instead of the log
//! - `RUST_LOG`: Logging level (default: info)
//! - `RESET_DB`: Set to "true" to wipe all persistent data on startup

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use compressor_monitor::acquisition::{ReplaySource, Sampler, SensorSource, SimulatedCompressor, SimulationProfile};
use compressor_monitor::config::{self, MonitorConfig};
use compressor_monitor::cycle::{
    run_control_loop, Clock, ControlContext, CycleController, MonotonicClock, RunnerSettings, TickClock,
};
use compressor_monitor::notify::{
    notification_bridge, LogNotifier, NotificationWorker, Notifier, TelegramNotifier, WorkerSettings,
};
use compressor_monitor::storage::{ProcessLock, SledStore, Store};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "compressor-monitor")]
#[command(about = "Compressor duty-cycle monitor")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides COMPRESSOR_CONFIG and ./monitor_config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Replay a CSV capture instead of the simulated compressor
    #[arg(long, value_name = "CSV")]
    replay: Option<PathBuf>,

    /// Seed for the simulated compressor's noise
    #[arg(long)]
    seed: Option<u64>,

    /// Speed multiplier (1 = realtime, 100 = 100x faster, 0 = no delay)
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Stop after this many completed cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Take time from the monotonic clock instead of virtual ticks (implies --speed 1)
    #[arg(long)]
    wall_clock: bool,

    /// Override the storage directory
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Reset all persistent data (baselines, spectra, message ids) on startup.
    /// WARNING: This is destructive and cannot be undone!
    /// Can also be set via RESET_DB=true environment variable.
    #[arg(long)]
    reset_db: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    telegram_chat_id: Option<i64>,
}

// ============================================================================
// Database Reset
// ============================================================================

/// Check if database reset is requested via CLI flag or environment variable.
fn should_reset_db(cli_flag: bool) -> bool {
    if cli_flag {
        return true;
    }
    if let Ok(val) = std::env::var("RESET_DB") {
        let val_lower = val.to_lowercase();
        return val_lower == "true" || val_lower == "1" || val_lower == "yes";
    }
    false
}

/// Remove the data directory and everything in it.
fn reset_data_directory(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        info!("Data directory does not exist, nothing to reset");
        return Ok(());
    }

    warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    warn!("  RESET_DB DETECTED - WIPING ALL PERSISTENT DATA");
    warn!("  Removing: {}", data_dir.display());
    warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    std::fs::remove_dir_all(data_dir).context("Failed to remove data directory")?;
    info!("Data directory removed, a fresh store will be created");
    Ok(())
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    ControlLoop,
    NotificationWorker,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::ControlLoop => write!(f, "ControlLoop"),
            TaskName::NotificationWorker => write!(f, "NotificationWorker"),
        }
    }
}

// ============================================================================
// Startup Helpers
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => MonitorConfig::load(),
    };
    if let Some(dir) = &args.data_dir {
        config.storage.data_dir.clone_from(dir);
    }
    Ok(config)
}

fn build_source(args: &CliArgs, clock: Arc<dyn Clock>) -> Result<Box<dyn SensorSource>> {
    match &args.replay {
        Some(path) => {
            let source = ReplaySource::from_csv(path)
                .with_context(|| format!("Failed to open replay file {}", path.display()))?;
            info!("📥 Input: replay ({})", path.display());
            Ok(Box::new(source))
        }
        None => {
            info!("📥 Input: simulated compressor (seed: {:?})", args.seed);
            Ok(Box::new(SimulatedCompressor::new(
                SimulationProfile::default(),
                clock,
                args.seed,
            )))
        }
    }
}

fn build_clock(args: &CliArgs) -> Arc<dyn Clock> {
    if args.wall_clock {
        info!("⏱️  Clock: monotonic");
        Arc::new(MonotonicClock::new())
    } else {
        info!("⏱️  Clock: virtual ticks (speed {}x)", args.speed);
        Arc::new(TickClock::new())
    }
}

/// A wall clock cannot be sped up; the loop sleeps the real delays.
fn effective_speed(args: &CliArgs) -> f64 {
    if args.wall_clock && (args.speed - 1.0).abs() > f64::EPSILON {
        warn!(requested = args.speed, "--wall-clock ignores --speed, running at 1x");
        return 1.0;
    }
    args.speed
}

fn build_notifier(args: &CliArgs, config: &MonitorConfig) -> Result<Arc<dyn Notifier>> {
    match (&args.telegram_token, args.telegram_chat_id) {
        (Some(token), Some(chat_id)) => {
            let timeout = Duration::from_secs(config.notifier.http_timeout_secs);
            let notifier = TelegramNotifier::new(token, chat_id, timeout)
                .context("Failed to build Telegram client")?;
            info!("💬 Notifier: Telegram (chat {chat_id})");
            Ok(Arc::new(notifier))
        }
        (Some(_), None) | (None, Some(_)) => {
            bail!("TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must be set together")
        }
        (None, None) => {
            info!("💬 Notifier: log only (set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID for chat)");
            Ok(Arc::new(LogNotifier::new()))
        }
    }
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task_name)) => {
                info!("🔒 Supervisor: Task {} completed normally", task_name);
            }
            Ok(Err(e)) => {
                error!("🔒 Supervisor: Task failed with error: {}", e);
                cancel_token.cancel();
                return Err(e);
            }
            Err(e) => {
                error!("🔒 Supervisor: Task panicked: {}", e);
                cancel_token.cancel();
                return Err(anyhow::anyhow!("Task panicked: {}", e));
            }
        }
    }

    info!("🔒 Supervisor: All tasks completed");
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let monitor_config = load_config(&args)?;
    if args.dump_config {
        print!("{}", monitor_config.to_toml()?);
        return Ok(());
    }
    config::init(monitor_config);
    let cfg = config::get();

    let data_dir = cfg.storage.data_dir.clone();
    if should_reset_db(args.reset_db) {
        reset_data_directory(&data_dir)?;
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Compressor Monitor");
    info!("  Device: {}", cfg.device.name);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    info!("🔒 Acquiring process lock...");
    let _process_lock = ProcessLock::acquire(&data_dir).context("Failed to acquire process lock")?;

    let sled = Arc::new(
        SledStore::open(data_dir.join("monitor.sled")).context("Failed to open monitor store")?,
    );
    let store: Arc<dyn Store> = sled.clone();
    info!("💾 Store opened at {}", data_dir.display());

    let clock = build_clock(&args);
    let source = build_source(&args, Arc::clone(&clock))?;
    let notifier = build_notifier(&args, cfg)?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let (bridge, receiver) = notification_bridge(cfg.notifier.queue_capacity);

    let mut worker = NotificationWorker::new(
        notifier,
        Arc::clone(&store),
        WorkerSettings {
            device_name: cfg.device.name.clone(),
            alerts: cfg.alerts.clone(),
            poll_inbox: cfg.notifier.poll_inbox,
        },
    );
    worker.bootstrap().await;

    let sampler = Sampler::new(source, &cfg.sampler);
    let ctx = ControlContext::new(sampler, Arc::clone(&store), clock);
    let controller = CycleController::new(cfg, &ctx);
    let settings = RunnerSettings {
        speed: effective_speed(&args),
        max_cycles: args.cycles,
    };

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    let worker_cancel = cancel_token.clone();
    task_set.spawn(async move {
        info!("[NotificationWorker] Task starting");
        worker.run(receiver, worker_cancel).await;
        Ok(TaskName::NotificationWorker)
    });

    let loop_cancel = cancel_token.clone();
    task_set.spawn(async move {
        info!("[ControlLoop] Task starting");
        let summary = run_control_loop(controller, ctx, bridge, settings, loop_cancel).await;
        info!(reason = ?summary.stop_reason, "[ControlLoop] Finished");
        Ok(TaskName::ControlLoop)
    });

    let outcome = run_supervisor(&mut task_set, cancel_token).await;

    match sled.flush() {
        Ok(()) => info!("💾 Store flushed ({} bytes on disk)", sled.size_bytes()),
        Err(e) => warn!(error = %e, "Failed to flush store"),
    }

    outcome?;
    info!("✓ Compressor monitor shutdown complete");
    Ok(())
}
