//! Admin API surface: credential CRUD, import, log browsing, and the
//! store-level contracts behind them.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tower::ServiceExt;

use codex_companion::config::Config;
use codex_companion::errors::AppError;
use codex_companion::models::{HeaderSnapshot, RequestLogEntry};
use codex_companion::oauth::OauthClient;
use codex_companion::proxy::upstream::UpstreamClient;
use codex_companion::scheduler::Scheduler;
use codex_companion::store::{self, CredentialStore, LogStore};
use codex_companion::{app, AppState};

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    store::migrate(&pool).await.unwrap();
    pool
}

fn make_state(pool: SqlitePool) -> Arc<AppState> {
    let credentials = CredentialStore::new(pool.clone());
    let logs = LogStore::new(pool);
    let scheduler = Scheduler::new(
        credentials.clone(),
        OauthClient::new("http://127.0.0.1:1/oauth/token"),
    );
    Arc::new(AppState {
        credentials,
        logs,
        scheduler,
        upstream: UpstreamClient::new(),
        config: Config {
            addr: "127.0.0.1:0".into(),
            db_path: ":memory:".into(),
            codex_home: std::env::temp_dir(),
            api_upstream: "http://127.0.0.1:1".into(),
            chatgpt_upstream: "http://127.0.0.1:1".into(),
        },
    })
}

async fn request(
    state: Arc<AppState>,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app(state)
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn create_list_update_delete_roundtrip() {
    let state = make_state(test_pool().await);

    let (status, body) = request(
        state.clone(),
        "POST",
        "/admin/api/credentials",
        Some(serde_json::json!({
            "kind": "static_key",
            "name": "work",
            "secret": "sk-work",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["kind"], "static_key");
    assert_eq!(created["priority"], 0);

    let (status, body) = request(state.clone(), "GET", "/admin/api/credentials", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(listed.len(), 1);

    let (status, _) = request(
        state.clone(),
        "PUT",
        &format!("/admin/api/credentials/{id}"),
        Some(serde_json::json!({
            "kind": "static_key",
            "name": "renamed",
            "secret": "sk-work",
            "priority": 9,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let updated = state.credentials.get(id).await.unwrap().unwrap();
    assert_eq!(updated.name, "renamed");
    assert_eq!(updated.priority, 9);

    let (status, _) = request(
        state.clone(),
        "DELETE",
        &format!("/admin/api/credentials/{id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(state.credentials.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_secret_is_a_conflict() {
    let state = make_state(test_pool().await);
    let body = serde_json::json!({
        "kind": "static_key",
        "name": "one",
        "secret": "sk-same",
    });

    let (status, _) = request(state.clone(), "POST", "/admin/api/credentials", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = request(state.clone(), "POST", "/admin/api/credentials", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert_eq!(state.credentials.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_refresh_token_is_a_conflict_at_the_store() {
    let store = CredentialStore::new(test_pool().await);
    store
        .add_interactive("one", "rt-same", None, 0)
        .await
        .unwrap();
    let err = store
        .add_interactive("two", "rt-same", None, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateCredential));
}

#[tokio::test]
async fn unknown_kind_and_absent_id_map_to_400_and_404() {
    let state = make_state(test_pool().await);

    let (status, _) = request(
        state.clone(),
        "POST",
        "/admin/api/credentials",
        Some(serde_json::json!({ "kind": "wildcard", "name": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(
        state.clone(),
        "PUT",
        "/admin/api/credentials/999",
        Some(serde_json::json!({
            "kind": "static_key",
            "name": "ghost",
            "secret": "sk-ghost",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn priority_defaults_to_one_past_the_maximum() {
    let state = make_state(test_pool().await);
    state
        .credentials
        .add_static_key("first", "sk-1", None, 3)
        .await
        .unwrap();

    let (_, body) = request(
        state.clone(),
        "POST",
        "/admin/api/credentials",
        Some(serde_json::json!({
            "kind": "static_key",
            "name": "second",
            "secret": "sk-2",
        })),
    )
    .await;
    let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(created["priority"], 4);
}

#[tokio::test]
async fn reactivate_endpoint_clears_exhaustion() {
    let state = make_state(test_pool().await);
    let cred = state
        .credentials
        .add_static_key("key", "sk-1", None, 0)
        .await
        .unwrap();
    state
        .credentials
        .mark_exhausted(cred.id, Utc::now() + Duration::hours(1))
        .await
        .unwrap();

    let (status, _) = request(
        state.clone(),
        "POST",
        &format!("/admin/api/credentials/{}/reactivate", cred.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!state.credentials.get(cred.id).await.unwrap().unwrap().exhausted);
}

#[tokio::test]
async fn mark_exhausted_and_reactivate_are_idempotent() {
    let store = CredentialStore::new(test_pool().await);
    let cred = store.add_static_key("key", "sk-1", None, 0).await.unwrap();
    let reset_at = Utc::now() + Duration::hours(1);

    store.mark_exhausted(cred.id, reset_at).await.unwrap();
    store.mark_exhausted(cred.id, reset_at).await.unwrap();
    let stored = store.get(cred.id).await.unwrap().unwrap();
    assert!(stored.exhausted);
    assert_eq!(stored.reset_at.unwrap(), reset_at);

    store.reactivate(cred.id).await.unwrap();
    store.reactivate(cred.id).await.unwrap();
    let stored = store.get(cred.id).await.unwrap().unwrap();
    assert!(!stored.exhausted);
    assert!(stored.reset_at.is_none());
}

#[tokio::test]
async fn import_upload_creates_an_interactive_credential() {
    let state = make_state(test_pool().await);

    let (status, body) = request(
        state.clone(),
        "POST",
        "/admin/api/credentials/import/upload",
        Some(serde_json::json!({
            "tokens": {
                "refresh_token": "rt-upload",
                "access_token": "at-upload",
                "account_id": "acct-42",
            },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(created["kind"], "interactive_login");
    assert_eq!(created["tenant_id"], "acct-42");
    assert_eq!(state.credentials.list().await.unwrap().len(), 1);
}

fn sample_entry(status: i64, body: &[u8]) -> RequestLogEntry {
    let mut req_headers = HeaderSnapshot::new();
    req_headers.insert("x-tag".into(), vec!["a".into(), "b".into()]);
    req_headers.insert("content-type".into(), vec!["application/json".into()]);

    RequestLogEntry {
        id: 0,
        time: Utc::now(),
        credential_id: 7,
        method: "POST".into(),
        url: "/v1/responses?stream=false".into(),
        req_headers,
        req_body: body.to_vec(),
        req_size: body.len() as i64,
        resp_headers: HeaderSnapshot::new(),
        resp_body: b"resp".to_vec(),
        resp_size: 4,
        status,
        duration_ms: 12,
        error: None,
    }
}

#[tokio::test]
async fn log_entries_round_trip_bytes_and_headers() {
    let logs = LogStore::new(test_pool().await);
    // Not valid UTF-8; the sink must not mangle it.
    let payload: &[u8] = &[0x7b, 0xff, 0xfe, 0x00, 0x9f, 0x92, 0x96];
    logs.insert(&sample_entry(200, payload)).await.unwrap();

    let read = logs.list(1, 0).await.unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].req_body, payload);
    assert_eq!(read[0].req_headers["x-tag"], vec!["a", "b"]);
    assert_eq!(read[0].resp_body, b"resp");
    assert_eq!(read[0].status, 200);
    assert_eq!(read[0].duration_ms, 12);
}

#[tokio::test]
async fn log_pages_are_newest_first_with_a_has_more_probe() {
    let state = make_state(test_pool().await);
    for i in 0..5 {
        state.logs.insert(&sample_entry(200 + i, b"{}")).await.unwrap();
    }

    let (status, body) =
        request(state.clone(), "GET", "/admin/api/logs?page=1&size=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let page: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(page["logs"].as_array().unwrap().len(), 2);
    assert_eq!(page["has_more"], true);
    // Latest insert (status 204) first.
    assert_eq!(page["logs"][0]["status"], 204);

    let (_, body) = request(state.clone(), "GET", "/admin/api/logs?page=3&size=2", None).await;
    let page: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(page["logs"].as_array().unwrap().len(), 1);
    assert_eq!(page["has_more"], false);
}

#[tokio::test]
async fn migration_tolerates_an_older_schema() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    // A database created before per-credential base URLs and log sizes.
    sqlx::query(
        "CREATE TABLE credentials (
            id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL,
            kind TEXT NOT NULL, secret TEXT, refresh_token TEXT,
            access_token TEXT, token_refreshed_at TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            exhausted INTEGER NOT NULL DEFAULT 0, reset_at TEXT)",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "CREATE TABLE logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT, time TEXT NOT NULL,
            credential_id INTEGER NOT NULL, method TEXT NOT NULL,
            url TEXT NOT NULL, req_headers TEXT, req_body BLOB,
            resp_headers TEXT, resp_body BLOB,
            status INTEGER NOT NULL DEFAULT 0, error TEXT)",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO credentials (name, kind, secret) VALUES ('old', 'static_key', 'sk-old')",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO logs (time, credential_id, method, url, status)
         VALUES ('2025-01-01T00:00:00Z', 1, 'GET', '/v1/models', 200)",
    )
    .execute(&pool)
    .await
    .unwrap();

    store::migrate(&pool).await.unwrap();
    // Running it again must be harmless.
    store::migrate(&pool).await.unwrap();

    let creds = CredentialStore::new(pool.clone()).list().await.unwrap();
    assert_eq!(creds.len(), 1);
    match &creds[0].kind {
        codex_companion::models::CredentialKind::StaticKey { secret, base_url } => {
            assert_eq!(secret, "sk-old");
            assert!(base_url.is_none());
        }
        _ => panic!("wrong kind"),
    }

    // Columns added by the migration read back as zero.
    let logs = LogStore::new(pool).list(10, 0).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].req_size, 0);
    assert_eq!(logs[0].duration_ms, 0);
}
