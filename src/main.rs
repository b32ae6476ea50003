//! Scheduled MySQL backups to S3-compatible storage
//!
//! Dumps each configured database at its configured times of day, compresses
//! the dump, uploads it and prunes backups past their retention window.

// mysql-s3-backup/src/main.rs
mod backup;
mod clock;
mod config;
mod errors;
mod scheduler;
mod storage;
mod utils;

use anyhow::{Context, Result};
use backup::{BackupRunner, DumpTool, JobRunner};
use clock::SystemClock;
use config::AppConfig;
use scheduler::Scheduler;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use storage::S3Store;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "./config.json";
const CONFIG_PATH_ENV: &str = "MYSQL_BACKUP_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    /// Run the daily triggers until interrupted.
    Schedule,
    /// Back up every database once, right now, then exit.
    Once,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run_app().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

/// `[schedule|once] [config-path]`; a lone argument that is not a mode is the config path.
fn parse_args(args: &[String], env_config: Option<String>) -> Result<(Mode, PathBuf)> {
    let mut rest = args.iter().skip(1).map(|a| a.trim());
    let (mode, path_arg) = match rest.next() {
        None => (Mode::Schedule, None),
        Some("schedule") => (Mode::Schedule, rest.next()),
        Some("once") => (Mode::Once, rest.next()),
        Some(other) => (Mode::Schedule, Some(other)),
    };
    if let Some(extra) = rest.next() {
        anyhow::bail!(
            "Unexpected argument: {}. Usage: mysql-s3-backup [schedule|once] [config-path]",
            extra
        );
    }

    let config_path = path_arg
        .map(PathBuf::from)
        .or_else(|| env_config.filter(|p| !p.trim().is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    Ok((mode, config_path))
}

async fn run_app() -> Result<()> {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let (mode, config_path) = parse_args(&args, env::var(CONFIG_PATH_ENV).ok())?;

    let app_config = AppConfig::load_from_json(&config_path)
        .context(format!("Failed to load application configuration from {}", config_path.display()))?;

    let dump_executable = utils::find_dump_executable(app_config.mysql_bin_path.as_deref())?;
    info!("Using dump tool at {}", dump_executable.display());

    let store = Arc::new(S3Store::connect(&app_config.storage).await);
    let runner = Arc::new(JobRunner::new(
        store,
        app_config.customer_name.clone(),
        DumpTool {
            executable: dump_executable,
            temp_dir: app_config.temp_dir.clone(),
            timeout: app_config.timeouts.dump,
        },
        app_config.timeouts.upload,
        Arc::new(SystemClock),
    ));

    match mode {
        Mode::Once => run_once(&app_config, runner.as_ref()).await,
        Mode::Schedule => {
            let scheduler = Scheduler::new(&app_config.databases, runner, Arc::new(SystemClock));
            info!(
                "Scheduler started with {} trigger(s); press Ctrl+C to stop",
                scheduler.triggers().len()
            );
            tokio::select! {
                _ = scheduler.run_forever() => {
                    warn!("Scheduler stopped on its own");
                }
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for the shutdown signal")?;
                    info!("Shutdown signal received, stopping scheduler");
                }
            }
            Ok(())
        }
    }
}

async fn run_once(app_config: &AppConfig, runner: &dyn BackupRunner) -> Result<()> {
    let mut failed = Vec::new();
    for db in &app_config.databases {
        match runner.run_backup(db).await {
            Ok(location) => info!("Backup of {} stored at {}", db.name, location),
            Err(_) => failed.push(db.name.as_str()),
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Backup failed for: {}", failed.join(", "));
    }
    info!("All {} database(s) backed up", app_config.databases.len());
    Ok(())
}
