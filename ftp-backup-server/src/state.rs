use crate::config::AppConfig;
use crate::error::AppError;
use ftp_backup::executor::RunOptions;
use ftp_backup::{BackupOrchestrator, BackupOutcome};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<BackupOrchestrator>,
    /// Held for the duration of a backup run
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let orchestrator = BackupOrchestrator::new(config.backup.clone());
        Self::with_orchestrator(config, orchestrator)
    }

    pub fn with_orchestrator(config: AppConfig, orchestrator: BackupOrchestrator) -> Self {
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Run a backup on the blocking pool. Overlapping runs are rejected.
    pub async fn run_backup(&self, options: RunOptions) -> Result<BackupOutcome, AppError> {
        let guard = self
            .run_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| AppError::Conflict("A backup is already running".into()))?;

        let orchestrator = self.orchestrator.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            orchestrator.run(options)
        })
        .await?;

        if outcome.success {
            tracing::info!(message = %outcome.message, "Backup finished");
        } else {
            tracing::error!(message = %outcome.message, "Backup failed");
        }
        Ok(outcome)
    }
}
