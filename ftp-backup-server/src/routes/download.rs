use crate::error::AppError;
use crate::services::download_key::validate_download_key;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use chrono::Local;
use ftp_backup::fs::is_safe_archive_name;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

#[derive(Deserialize)]
pub struct DownloadQuery {
    pub key: Option<String>,
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !is_safe_archive_name(&filename) {
        return Err(AppError::BadRequest("Invalid backup file name".into()));
    }

    let key = query.key.unwrap_or_default();
    let today = Local::now().date_naive();
    if !validate_download_key(&key, &filename, today, &state.config.site_url) {
        tracing::warn!(file = %filename, "Rejected download with invalid key");
        return Err(AppError::Forbidden("Invalid or expired download key".into()));
    }

    let path = state.orchestrator.store().path_of(&filename)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to open backup: {}", e)))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to stat backup: {}", e)))?
        .len();

    tracing::info!(file = %filename, "Serving backup download");

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    ))
}
