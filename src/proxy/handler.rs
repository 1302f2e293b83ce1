use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::TRANSFER_ENCODING;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::{Duration as ChronoDuration, Utc};
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::models::{snapshot_headers, RequestLogEntry};
use crate::proxy::rewrite;
use crate::AppState;

/// How many credentials one request may burn through before giving up.
const MAX_ATTEMPTS: u32 = 3;
/// How long a 429 keeps a credential out of rotation.
const EXHAUSTION_COOLDOWN_SECS: i64 = 60 * 60;

/// Only completion-service paths are forwarded; everything else 404s without
/// touching the pool.
const FORWARDED_PREFIXES: &[&str] = &["/v1/responses", "/v1/chat/completions", "/v1/models"];

/// The main proxy handler, mounted as the router fallback. Reads the client
/// body once, then walks the retry ladder: pick a credential, rewrite,
/// forward, log, and on a quota signal exhaust the credential and try the
/// next one.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    info!(%method, %uri, "proxy request");

    let path = uri.path();
    // The router sends /admin elsewhere; this guard is for misconfigured muxes.
    if path.starts_with("/admin") {
        return StatusCode::NOT_FOUND.into_response();
    }
    if !FORWARDED_PREFIXES.iter().any(|p| path.starts_with(p)) {
        warn!(path, "blocked path");
        return StatusCode::NOT_FOUND.into_response();
    }

    // Logged entries carry the request exactly as the client sent it, not the
    // per-attempt rewrite.
    let original_url = uri.to_string();
    let req_snapshot = snapshot_headers(&headers);

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let last_attempt = attempt >= MAX_ATTEMPTS;

        let cred = match state.scheduler.next().await {
            Ok(c) => c,
            Err(AppError::NoCredentials) => {
                error!("no credentials available");
                return (StatusCode::SERVICE_UNAVAILABLE, "no credentials available")
                    .into_response();
            }
            Err(e) => return e.into_response(),
        };

        let plan = match rewrite::plan(
            &cred,
            &state.config.api_upstream,
            &state.config.chatgpt_upstream,
            path,
            uri.query(),
            &headers,
            &body,
        ) {
            Ok(p) => p,
            Err(e) => return e.into_response(),
        };

        let start = Instant::now();
        let resp = state
            .upstream
            .forward(method.clone(), &plan.url, plan.headers, plan.body)
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                let entry = RequestLogEntry {
                    id: 0,
                    time: Utc::now(),
                    credential_id: cred.id,
                    method: method.to_string(),
                    url: original_url.clone(),
                    req_headers: req_snapshot.clone(),
                    req_body: body.to_vec(),
                    req_size: body.len() as i64,
                    resp_headers: Default::default(),
                    resp_body: Vec::new(),
                    resp_size: 0,
                    status: 0,
                    duration_ms: start.elapsed().as_millis() as i64,
                    error: Some(e.to_string()),
                };
                if let Err(le) = state.logs.insert(&entry).await {
                    error!("insert log failed: {}", le);
                }
                if last_attempt {
                    return (StatusCode::BAD_GATEWAY, "upstream error").into_response();
                }
                continue;
            }
        };

        let status = resp.status();
        let resp_headers = resp.headers().clone();
        let resp_body = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!("read response body: {}", e);
                Bytes::new()
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as i64;

        let entry = RequestLogEntry {
            id: 0,
            time: Utc::now(),
            credential_id: cred.id,
            method: method.to_string(),
            url: original_url.clone(),
            req_headers: req_snapshot.clone(),
            req_body: body.to_vec(),
            req_size: body.len() as i64,
            resp_headers: snapshot_headers(&resp_headers),
            resp_body: resp_body.to_vec(),
            resp_size: resp_body.len() as i64,
            status: status.as_u16() as i64,
            duration_ms: elapsed_ms,
            error: None,
        };
        if let Err(e) = state.logs.insert(&entry).await {
            error!("insert log failed: {}", e);
        }

        info!(
            credential_id = cred.id,
            status = status.as_u16(),
            elapsed_ms,
            "proxied request"
        );

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(credential_id = cred.id, "credential exhausted");
            let reset_at = Utc::now() + ChronoDuration::seconds(EXHAUSTION_COOLDOWN_SECS);
            if let Err(e) = state.scheduler.mark_exhausted(cred.id, reset_at).await {
                error!("mark exhausted failed: {}", e);
            }
            if !last_attempt {
                continue;
            }
            // Last attempt: the 429 itself goes back to the client.
        }

        let mut response = Response::new(Body::from(resp_body));
        *response.status_mut() = status;
        let out_headers = response.headers_mut();
        for (name, value) in resp_headers.iter() {
            // The body is fully buffered and re-framed.
            if name == TRANSFER_ENCODING {
                continue;
            }
            out_headers.append(name, value.clone());
        }
        return response;
    }
}
