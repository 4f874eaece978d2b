use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(settings_status))
}

/// Which settings are present. Secrets are reported as set or unset only.
#[derive(Debug, Serialize)]
pub struct SettingsStatus {
    pub configured: bool,
    pub message: Option<String>,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub directory: String,
    pub username_set: bool,
    pub password_set: bool,
    pub private_key_set: bool,
    pub delete_from_remote: bool,
    pub retention_strategy: &'static str,
    pub schedule: Option<String>,
    pub run_via_url: bool,
}

async fn settings_status(State(state): State<Arc<AppState>>) -> Json<SettingsStatus> {
    let remote = &state.config.backup.remote;
    let message = remote.missing_credentials();

    Json(SettingsStatus {
        configured: message.is_none(),
        message,
        protocol: remote.protocol.label().to_string(),
        host: remote.host.clone(),
        port: remote.port(),
        directory: remote.directory.clone(),
        username_set: !remote.username.is_empty(),
        password_set: !remote.password.is_empty(),
        private_key_set: remote.private_key.is_some(),
        delete_from_remote: remote.delete_from_remote,
        retention_strategy: state.config.backup.retention.policy().name(),
        schedule: state.config.cron_schedule.clone(),
        run_via_url: state.config.run_token.is_some(),
    })
}
