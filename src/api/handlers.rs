use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::import;
use crate::errors::AppError;
use crate::models::{Credential, CredentialKind, RequestLogEntry};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct CreateCredentialRequest {
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    /// RFC3339 instant of the last token refresh, for rows imported with a
    /// token already in hand.
    #[serde(default)]
    pub last_refresh: Option<String>,
}

#[derive(Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
}

#[derive(Serialize)]
pub struct LogsPage {
    pub logs: Vec<RequestLogEntry>,
    pub page: i64,
    pub has_more: bool,
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /admin/api/credentials
pub async fn list_credentials(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Credential>>, AppError> {
    let credentials = state.credentials.list().await?;
    Ok(Json(credentials))
}

/// POST /admin/api/credentials
pub async fn create_credential(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCredentialRequest>,
) -> Result<(StatusCode, Json<Credential>), AppError> {
    let priority = match req.priority {
        Some(p) => p,
        None => state.credentials.next_priority().await?,
    };

    let cred = match req.kind.as_str() {
        "static_key" => {
            let secret = req
                .secret
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AppError::BadInput("secret is required".into()))?;
            state
                .credentials
                .add_static_key(&req.name, &secret, req.base_url.as_deref(), priority)
                .await?
        }
        "interactive_login" => {
            let refresh_token = req
                .refresh_token
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AppError::BadInput("refresh_token is required".into()))?;
            let mut cred = state
                .credentials
                .add_interactive(&req.name, &refresh_token, req.tenant_id.as_deref(), priority)
                .await?;
            // An access token supplied at create time is stored as already
            // refreshed, dated by last_refresh when given.
            if let Some(token) = req.access_token.filter(|s| !s.is_empty()) {
                if let CredentialKind::InteractiveLogin {
                    access_token,
                    token_refreshed_at,
                    ..
                } = &mut cred.kind
                {
                    *access_token = token;
                    *token_refreshed_at = parse_last_refresh(req.last_refresh.as_deref());
                }
                state.credentials.update(&cred).await?;
            }
            cred
        }
        other => {
            return Err(AppError::BadInput(format!("unknown credential kind {other:?}")));
        }
    };

    Ok((StatusCode::CREATED, Json(cred)))
}

/// PUT /admin/api/credentials/:id
pub async fn update_credential(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(mut cred): Json<Credential>,
) -> Result<StatusCode, AppError> {
    if state.credentials.get(id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    cred.id = id;
    state.credentials.update(&cred).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /admin/api/credentials/:id
pub async fn delete_credential(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.credentials.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/api/credentials/:id/reactivate
pub async fn reactivate_credential(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if state.credentials.get(id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    state.credentials.reactivate(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/api/credentials/import — read `auth.json` from CODEX_HOME.
pub async fn import_from_home(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Credential>, AppError> {
    let cred = import::from_file(&state.credentials, &state.config.codex_home).await?;
    Ok(Json(cred))
}

/// POST /admin/api/credentials/import/upload — the request body is the
/// `auth.json` document itself.
pub async fn import_from_upload(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Credential>, AppError> {
    let cred = import::from_document(&state.credentials, &body).await?;
    Ok(Json(cred))
}

/// GET /admin/api/logs?page=&size= — newest first. Fetches one row past the
/// page size to decide `has_more` without a count query.
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LogsQuery>,
) -> Result<Json<LogsPage>, AppError> {
    let page = q.page.unwrap_or(1).max(1);
    let size = match q.size {
        Some(s) if s > 0 => s,
        _ => 100,
    };
    let offset = (page - 1) * size;

    let mut logs = state.logs.list(size + 1, offset).await?;
    let has_more = logs.len() as i64 > size;
    if has_more {
        logs.truncate(size as usize);
    }

    Ok(Json(LogsPage { logs, page, has_more }))
}

pub(crate) fn parse_last_refresh(last_refresh: Option<&str>) -> DateTime<Utc> {
    last_refresh
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
