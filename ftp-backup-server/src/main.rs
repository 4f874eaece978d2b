mod config;
mod error;
mod routes;
mod services;
mod state;


use crate::config::AppConfig;
use crate::services::backup_scheduler::BackupScheduler;
use crate::state::AppState;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    ftp_backup::utils::logger::init(&config.log_level)?;

    tracing::info!(
        "Starting ftp-backup-server v{} on port {}",
        env!("CARGO_PKG_VERSION"),
        config.port
    );
    tracing::info!(
        content_dir = %config.backup.backup.content_dir.display(),
        backup_dir = %config.backup.backup.backup_dir().display(),
        "Backup paths"
    );

    let port = config.port;
    let state = Arc::new(AppState::new(config));

    let scheduler = match BackupScheduler::new(state.clone()).await {
        Ok(s) => {
            match s.init_schedule().await {
                Ok(true) => {
                    if let Err(e) = s.start().await {
                        tracing::warn!("Failed to start scheduler: {}", e);
                    }
                }
                Ok(false) => tracing::info!("No backup schedule configured"),
                Err(e) => tracing::warn!("Failed to initialize schedule: {}", e),
            }
            Some(s)
        }
        Err(e) => {
            tracing::warn!("Failed to create scheduler: {}", e);
            None
        }
    };

    let app = routes::create_router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");

    if let Some(s) = scheduler {
        if let Err(e) = s.shutdown().await {
            tracing::warn!("Scheduler shutdown error: {}", e);
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
