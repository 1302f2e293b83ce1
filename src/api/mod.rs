use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;
pub mod import;

/// Build the admin router. All routes are relative; the caller nests this
/// under `/admin`. Loopback bind is the only access control, matching the
/// process's single-user scope.
pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/credentials",
            get(handlers::list_credentials).post(handlers::create_credential),
        )
        .route(
            "/api/credentials/:id",
            put(handlers::update_credential).delete(handlers::delete_credential),
        )
        .route(
            "/api/credentials/:id/reactivate",
            post(handlers::reactivate_credential),
        )
        .route("/api/credentials/import", post(handlers::import_from_home))
        .route(
            "/api/credentials/import/upload",
            post(handlers::import_from_upload),
        )
        .route("/api/logs", get(handlers::list_logs))
        .layer(TraceLayer::new_for_http())
}
