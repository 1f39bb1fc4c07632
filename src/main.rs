#![forbid(unsafe_code)]

//! `daily-relay`: posts one unseen item from a source channel every day.
//!
//! Bootstraps configuration and credentials, scans the source channel into
//! the in-memory inventory, then runs the daily task until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use daily_relay::config::GlobalConfig;
use daily_relay::discord::{self, DiscordSource, DiscordTarget};
use daily_relay::inventory::{loader, Inventory};
use daily_relay::relay::delivery::DeliveryPipeline;
use daily_relay::relay::{CycleOutcome, Relay};
use daily_relay::scheduler::{DailySchedule, DailyTask, SystemClock};
use daily_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "daily-relay", about = "Daily Discord relay bot", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Run one cycle right after loading, before the first scheduled time.
    #[arg(long)]
    fire_now: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("daily-relay bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;
    info!(
        source = config.discord.source_channel_id,
        target = config.discord.target_channel_id,
        timezone = %config.schedule.timezone,
        fire_time = %config.schedule.fire_time,
        "configuration loaded"
    );

    // ── Discord feeds ───────────────────────────────────
    let http = discord::http_client(&config.discord.token);
    let source = Arc::new(DiscordSource::new(
        Arc::clone(&http),
        config.discord.source_channel_id,
        config.delivery.send_timeout(),
    )?);
    let target = Arc::new(DiscordTarget::new(
        Arc::clone(&http),
        config.discord.target_channel_id,
        config.delivery.send_timeout(),
    )?);

    // ── Fill the inventory ──────────────────────────────
    let inventory = Inventory::new().shared();
    let summary = loader::load_inventory(source.as_ref(), &inventory, &config.loader)
        .await
        .map_err(|err| {
            error!(%err, "inventory load failed");
            err
        })?;
    info!(
        records = summary.records_scanned,
        items = summary.items_cached,
        "inventory ready"
    );

    let pipeline = DeliveryPipeline::new(&config.delivery, config.discord.notify_role_id)?;
    let relay = Arc::new(Relay::new(
        inventory,
        source,
        target,
        pipeline,
        config.delivery.origin_gone_policy,
    ));

    if args.fire_now {
        log_outcome(&relay.run_cycle().await);
    }

    // ── Start the daily task ────────────────────────────
    let ct = CancellationToken::new();
    let schedule = DailySchedule::from_config(&config.schedule);
    let cycle_relay = Arc::clone(&relay);
    let task = DailyTask::new(schedule, Arc::new(SystemClock), ct.clone()).spawn(move || {
        let relay = Arc::clone(&cycle_relay);
        async move {
            log_outcome(&relay.run_cycle().await);
        }
    });
    info!("daily task started");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();
    task.shutdown().await;
    info!("daily-relay shut down");

    Ok(())
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Empty => info!("cycle finished: inventory empty"),
        CycleOutcome::Delivered {
            source_message_id,
            report,
        } => info!(source_message_id, status = ?report.status, "cycle finished: delivered"),
        CycleOutcome::Skipped {
            source_message_id,
            reason,
        } => info!(source_message_id, %reason, "cycle finished: skipped"),
        CycleOutcome::Failed {
            source_message_id,
            error,
        } => error!(source_message_id, %error, "cycle finished: send failed"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
