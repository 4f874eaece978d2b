use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use ftp_backup::executor::RemoteStats;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/stats", get(remote_stats))
}

async fn remote_stats(State(state): State<Arc<AppState>>) -> Result<Json<RemoteStats>, AppError> {
    let remote = &state.config.backup.remote;
    if !remote.is_enabled() {
        return Err(AppError::BadRequest("No remote server configured".into()));
    }
    if let Some(message) = remote.missing_credentials() {
        return Err(AppError::BadRequest(message));
    }

    let orchestrator = state.orchestrator.clone();
    let stats = tokio::task::spawn_blocking(move || orchestrator.remote_stats()).await??;
    Ok(Json(stats))
}
