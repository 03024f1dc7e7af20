use super::sync::build_orchestrator;
use crate::commands::load_config;
use crate::output::Output;
use color_eyre::Result;
use library_sync_config::{Config, PathManager, SchedulerConfig};
use library_sync_core::{SyncOptions, SyncOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Configured log file, or the default one under the log directory
pub fn log_file(path_manager: &PathManager) -> PathBuf {
    Config::load_or_default(&path_manager.config_file())
        .ok()
        .and_then(|config| config.scheduler.and_then(|s| s.log_file))
        .unwrap_or_else(|| path_manager.daemon_log_file())
}

/// Runs syncs for the cron job; a tick that fires while the previous run
/// is still going is skipped
struct Runner {
    orchestrator: SyncOrchestrator,
    options: SyncOptions,
    running: Mutex<()>,
}

impl Runner {
    async fn run(&self, trigger: &'static str) {
        let Ok(_guard) = self.running.try_lock() else {
            warn!(operation = "scheduled_sync_skipped", trigger, "Previous sync still running, skipping");
            return;
        };

        // Other feedqueue commands may have written the library since the last run
        if let Err(e) = self.orchestrator.handle().reload().await {
            error!(operation = "scheduled_sync_error", trigger, error = %e, "Failed to reload library, skipping sync");
            return;
        }

        info!(operation = "scheduled_sync_start", trigger, "Starting sync");
        match self.orchestrator.sync(&self.options).await {
            Ok(result) => {
                info!(
                    operation = "scheduled_sync_complete",
                    trigger,
                    new_items = result.total_new(),
                    failed_sources = result.failed_sources.len(),
                    cancelled = result.cancelled,
                    duration_ms = result.duration_ms,
                    "Sync completed"
                );
            }
            Err(e) => {
                error!(operation = "scheduled_sync_error", trigger, error = %e, "Sync failed");
            }
        }
    }
}

pub async fn run_daemon(
    path_manager: &PathManager,
    schedule_override: Option<String>,
    no_startup_sync: bool,
    output: &Output,
) -> Result<()> {
    path_manager
        .ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create data directories: {}", e))?;
    let config = load_config(path_manager)?;

    let defaults = config.scheduler_or_default();
    let scheduler_config = SchedulerConfig {
        schedule: schedule_override.unwrap_or(defaults.schedule),
        run_on_startup: defaults.run_on_startup && !no_startup_sync,
        log_file: defaults.log_file,
    };

    let cancel = CancellationToken::new();
    let runner = Arc::new(Runner {
        orchestrator: build_orchestrator(path_manager, &config, cancel.clone())?,
        options: SyncOptions {
            sources: None,
            use_feed_cache: config.sync.use_feed_cache,
        },
        running: Mutex::new(()),
    });

    let mut scheduler = JobScheduler::new()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create scheduler: {}", e))?;

    let job_runner = runner.clone();
    let job = Job::new_async(scheduler_config.schedule.as_str(), move |_uuid, _lock| {
        let runner = job_runner.clone();
        Box::pin(async move {
            runner.run("schedule").await;
        })
    })
    .map_err(|e| color_eyre::eyre::eyre!("Invalid schedule '{}': {}", scheduler_config.schedule, e))?;
    scheduler
        .add(job)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to add sync job: {}", e))?;

    output.info(format!("Daemon started with schedule '{}'", scheduler_config.schedule));
    info!(
        operation = "scheduler_started",
        schedule = scheduler_config.schedule,
        run_on_startup = scheduler_config.run_on_startup,
        "Scheduler started"
    );

    if scheduler_config.run_on_startup {
        runner.run("startup").await;
    }

    scheduler
        .start()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to start scheduler: {}", e))?;

    tokio::signal::ctrl_c().await?;
    info!(operation = "scheduler_shutdown", "Shutdown requested");
    cancel.cancel();
    scheduler
        .shutdown()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to stop scheduler: {}", e))?;

    // Wait for a run in progress to reach its cancellation point
    let _guard = runner.running.lock().await;
    output.success("Daemon stopped");
    Ok(())
}
