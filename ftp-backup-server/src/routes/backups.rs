use crate::error::AppError;
use crate::services::download_key::generate_download_key;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Local;
use ftp_backup::executor::RunOptions;
use ftp_backup::fs::BackupStats;
use ftp_backup::utils::format::{format_size, format_timestamp};
use ftp_backup::BackupOutcome;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_backups).post(create_backup))
}

#[derive(Debug, Serialize)]
pub struct BackupEntry {
    pub filename: String,
    pub size: u64,
    pub size_formatted: String,
    pub modified: i64,
    pub modified_formatted: String,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct BackupList {
    pub backups: Vec<BackupEntry>,
    pub stats: BackupStats,
}

async fn list_backups(State(state): State<Arc<AppState>>) -> Result<Json<BackupList>, AppError> {
    let orchestrator = state.orchestrator.clone();
    let (archives, stats) = tokio::task::spawn_blocking(move || {
        let store = orchestrator.store();
        Ok::<_, ftp_backup::BackupError>((store.list()?, store.stats()?))
    })
    .await??;

    let today = Local::now().date_naive();
    let site_url = &state.config.site_url;
    let backups = archives
        .into_iter()
        .map(|archive| {
            let key = generate_download_key(&archive.name, today, site_url);
            BackupEntry {
                download_url: format!("/download/{}?key={}", archive.name, key),
                size_formatted: format_size(archive.size_bytes),
                modified_formatted: format_timestamp(archive.mtime),
                size: archive.size_bytes,
                modified: archive.mtime,
                filename: archive.name,
            }
        })
        .collect();

    Ok(Json(BackupList { backups, stats }))
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    #[serde(default = "default_upload")]
    pub upload: bool,
}

fn default_upload() -> bool {
    true
}

async fn create_backup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateRequest>,
) -> Result<(StatusCode, Json<BackupOutcome>), AppError> {
    let outcome = state
        .run_backup(RunOptions {
            upload: request.upload,
        })
        .await?;
    Ok((outcome_status(&outcome), Json(outcome)))
}

pub(crate) fn outcome_status(outcome: &BackupOutcome) -> StatusCode {
    if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
