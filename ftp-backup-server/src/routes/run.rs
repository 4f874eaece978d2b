use super::backups::outcome_status;
use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use ftp_backup::executor::RunOptions;
use ftp_backup::BackupOutcome;
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;

#[derive(Deserialize)]
pub struct RunQuery {
    pub token: Option<String>,
}

/// Execute a full backup from a URL, e.g. an external cron hitting
/// `/run?token=...`.
pub async fn run_via_url(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunQuery>,
) -> Result<(StatusCode, Json<BackupOutcome>), AppError> {
    let Some(expected) = state.config.run_token.as_deref() else {
        return Err(AppError::Forbidden("Execute via URL is disabled".into()));
    };

    let provided = query.token.unwrap_or_default();
    let matches = provided.len() == expected.len()
        && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()));
    if !matches {
        tracing::warn!("Rejected run request with invalid token");
        return Err(AppError::Forbidden("Invalid token".into()));
    }

    let outcome = state.run_backup(RunOptions::default()).await?;
    Ok((outcome_status(&outcome), Json(outcome)))
}
