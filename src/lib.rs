//! codex-companion — a localhost reverse proxy that multiplexes one client's
//! requests across a pool of Codex credentials, rotating on quota exhaustion.

use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod oauth;
pub mod proxy;
pub mod scheduler;
pub mod store;

use proxy::upstream::UpstreamClient;
use scheduler::Scheduler;
use store::{CredentialStore, LogStore};

/// Shared application state passed to handlers and jobs.
pub struct AppState {
    pub credentials: CredentialStore,
    pub logs: LogStore,
    pub scheduler: Scheduler,
    pub upstream: UpstreamClient,
    pub config: config::Config,
}

/// The full router: health probe, admin API under `/admin`, and the proxy
/// handler as the fallback for everything else.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest("/admin", api::admin_router())
        .fallback(any(proxy::handler::proxy_handler))
        .with_state(state)
}
