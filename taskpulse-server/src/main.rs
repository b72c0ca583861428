//! `TaskPulse` server: task API and deadline flag updater.
//!
//! # Usage
//!
//! ```bash
//! # Serve the API on the default address 0.0.0.0:8000, sweeping hourly
//! cargo run --bin taskpulse-server
//!
//! # Serve on a custom address without the embedded sweeper
//! cargo run --bin taskpulse-server -- serve --bind 127.0.0.1:8080 --sweeper false
//!
//! # Recompute all flags once
//! cargo run --bin taskpulse-server -- update-flags
//!
//! # Run only the hourly updater
//! cargo run --bin taskpulse-server -- run-updater
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use taskpulse::recompute::BatchRecomputer;
use taskpulse::sweeper::RecurringSweeper;
use taskpulse::{SqliteTaskStore, SystemClock, TaskRepository, TaskService};
use taskpulse_server::api::{self, AppState};
use taskpulse_server::config::{Command, ServerCliArgs, ServerConfig};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type Repo = TaskRepository<SqliteTaskStore, SystemClock>;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Held until exit so buffered file logs are flushed.
    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());

    let command = cli.command.unwrap_or_default();
    if let Err(e) = run(command, &config).await {
        tracing::error!(error = %e, "taskpulse-server failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Initialize logging to stderr, or to `file_path` through a non-blocking
/// writer when given.
///
/// Returns the [`WorkerGuard`] of the file writer, which must be held until
/// shutdown to ensure all buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file = file_path.and_then(|path| {
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty())?;
        let name = path.file_name()?.to_str()?;
        Some((dir.to_path_buf(), name.to_string()))
    });

    match file {
        Some((dir, name)) => {
            let file_appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_writer(non_blocking)
                .with_env_filter(env_filter)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            None
        }
    }
}

/// Opens the database, creating its directory on first use.
fn open_repository(config: &ServerConfig) -> Result<Arc<Repo>, BoxError> {
    if let Some(dir) = config.database_path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    let store = SqliteTaskStore::open(&config.database_path)?;
    tracing::info!(path = %config.database_path.display(), "opened task database");
    Ok(Arc::new(TaskRepository::new(store, SystemClock)))
}

/// Cancels `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            return;
        }
        tracing::info!("shutdown requested");
        token.cancel();
    });
}

async fn run(command: Command, config: &ServerConfig) -> Result<(), BoxError> {
    let repo = open_repository(config)?;
    let shutdown = CancellationToken::new();

    match command {
        Command::UpdateFlags { .. } => {
            let report = BatchRecomputer::new(repo)
                .recompute_all(config.page_size)
                .await?;
            println!(
                "Task flags updated: {} of {} tasks changed ({} skipped, {} failed)",
                report.updated, report.processed, report.skipped, report.failed
            );
        }

        Command::RunUpdater { .. } => {
            println!("Task flag updater running, press Ctrl-C to stop");
            cancel_on_ctrl_c(shutdown.clone());
            RecurringSweeper::new(BatchRecomputer::new(repo), SystemClock, shutdown)
                .with_interval(config.sweep_interval)
                .with_page_size(config.page_size)
                .run()
                .await;
        }

        Command::Serve { .. } => {
            cancel_on_ctrl_c(shutdown.clone());

            let sweeper = config.sweeper_enabled.then(|| {
                RecurringSweeper::new(
                    BatchRecomputer::new(Arc::clone(&repo)),
                    SystemClock,
                    shutdown.child_token(),
                )
                .with_interval(config.sweep_interval)
                .with_page_size(config.page_size)
                .spawn()
            });

            let state = Arc::new(AppState::new(TaskService::new(repo), config.display_offset));
            let (bound_addr, handle) =
                api::start_server_with_state(&config.bind_addr, state, shutdown.clone()).await?;
            tracing::info!(addr = %bound_addr, "task api listening");

            if let Err(e) = handle.await {
                tracing::error!(error = %e, "api server task failed");
            }
            shutdown.cancel();
            if let Some(sweeper) = sweeper
                && let Err(e) = sweeper.await
            {
                tracing::error!(error = %e, "sweeper task failed");
            }
        }
    }

    Ok(())
}
