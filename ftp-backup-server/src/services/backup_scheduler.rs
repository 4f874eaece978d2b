use crate::state::AppState;
use ftp_backup::executor::RunOptions;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    state: Arc<AppState>,
}

impl BackupScheduler {
    pub async fn new(state: Arc<AppState>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            state,
        })
    }

    /// Register the full backup pipeline under `cron_expression`
    /// (seconds-first, six fields).
    pub async fn schedule(&self, cron_expression: &str) -> anyhow::Result<()> {
        let state = self.state.clone();

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let state = state.clone();
            Box::pin(async move {
                tracing::info!("Starting scheduled backup");
                if let Err(e) = state.run_backup(RunOptions::default()).await {
                    tracing::warn!(error = %e, "Skipping scheduled backup");
                }
            })
        })?;

        self.scheduler.lock().await.add(job).await?;
        tracing::info!(cron = %cron_expression, "Backup scheduled");
        Ok(())
    }

    /// Schedule the configured expression, if any.
    pub async fn init_schedule(&self) -> anyhow::Result<bool> {
        match self.state.config.cron_schedule.clone() {
            Some(cron) => {
                self.schedule(&cron).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        Ok(())
    }
}
