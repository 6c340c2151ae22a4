use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wearlog_lib::{
    init_logging, settings::default_settings_path, storage::format_bytes, AppState,
    CollectionEvent, DeviceEvent, SettingsStore, SimulatedDevice,
};

#[derive(Parser)]
#[command(name = "wearlog", version, about = "Session-scoped wearable sensor logger")]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show free space and log usage
    Stats,
    /// List sessions found in the log directory
    History {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Delete old logs, or evict oldest-first until the free-space target is met
    Cleanup {
        #[arg(long)]
        max_age_days: Option<u64>,
        #[arg(long)]
        emergency: bool,
    },
    /// Record a session from a simulated device
    Simulate {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        /// Starting battery level of the simulated device
        #[arg(long, default_value_t = 100)]
        battery: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let settings_path = cli.config.unwrap_or_else(default_settings_path);
    let settings = SettingsStore::new(settings_path)?;
    let app = AppState::new(settings)?;

    match cli.command {
        Command::Stats => print_stats(&app),
        Command::History { json } => print_history(&app, json),
        Command::Cleanup {
            max_age_days,
            emergency,
        } => cleanup(&app, max_age_days, emergency),
        Command::Simulate { seconds, battery } => simulate(&app, seconds, battery).await,
    }
}

fn print_stats(app: &AppState) -> Result<()> {
    let stats = app.monitor.stats().context("failed to read storage stats")?;
    println!("total:     {}", format_bytes(stats.total_space));
    println!("free:      {}", format_bytes(stats.free_space));
    println!("used:      {}", format_bytes(stats.used_space));
    println!(
        "logs:      {} in {} files",
        format_bytes(stats.app_data_size),
        stats.file_count
    );
    if stats.is_low_space {
        println!("warning:   storage is low");
    }
    Ok(())
}

fn print_history(app: &AppState, json: bool) -> Result<()> {
    let sessions = app
        .history
        .reconstruct()
        .context("failed to rebuild session history")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    for session in &sessions {
        println!(
            "{:<24} {}  {:>8}s  {:>8} points",
            session.session_id,
            session.start_time.format("%Y-%m-%d %H:%M:%S"),
            session.duration_ms / 1000,
            session.data_points_collected
        );
    }
    if sessions.is_empty() {
        println!("no sessions recorded");
    }
    Ok(())
}

fn cleanup(app: &AppState, max_age_days: Option<u64>, emergency: bool) -> Result<()> {
    if emergency {
        let result = app.monitor.emergency_cleanup()?;
        println!(
            "deleted {} files, freed {}, {} now free",
            result.files_deleted,
            format_bytes(result.space_freed),
            format_bytes(result.final_free_space)
        );
        return Ok(());
    }

    let max_age = match max_age_days {
        Some(days) => Duration::from_secs(days * 24 * 60 * 60),
        None => app.settings.get().collection().max_log_age,
    };
    let deleted = app.monitor.cleanup_older_than(max_age)?;
    println!("deleted {deleted} files older than {} days", max_age.as_secs() / 86_400);
    Ok(())
}

async fn simulate(app: &AppState, seconds: u64, battery: u8) -> Result<()> {
    let (device_tx, device_rx) = mpsc::channel(1024);
    let device = Arc::new(
        SimulatedDevice::new("simulated-watch", device_tx.clone()).with_battery(battery, 50),
    );
    let controller = app.controller(device);
    let mut events = controller.subscribe();

    controller.start_monitoring().await?;

    let cancel_token = CancellationToken::new();
    let runner = {
        let controller = controller.clone();
        let token = cancel_token.clone();
        tokio::spawn(async move { controller.run_event_loop(device_rx, token).await })
    };

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
            if matches!(event, CollectionEvent::SessionCompleted(_)) {
                break;
            }
        }
    });

    let record = controller
        .start_collection()
        .await
        .context("failed to start collection")?;
    info!("simulating {} for {seconds}s", record.session_id);

    tokio::time::sleep(Duration::from_secs(seconds)).await;
    if device_tx.send(DeviceEvent::StopRequested).await.is_err() {
        warn!("event loop ended before stop was requested");
    }

    let _ = printer.await;
    cancel_token.cancel();
    runner.await.context("collection event loop failed to join")?;
    Ok(())
}
