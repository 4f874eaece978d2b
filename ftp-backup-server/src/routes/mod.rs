pub mod backups;
pub mod download;
pub mod remote;
pub mod run;
pub mod settings;

use crate::state::AppState;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/backups", backups::router())
        .nest("/api/remote", remote::router())
        .nest("/api/settings", settings::router())
        .route("/run", get(run::run_via_url))
        .route("/download/{filename}", get(download::download))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
