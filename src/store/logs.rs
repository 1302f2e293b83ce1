use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::errors::AppError;
use crate::models::{HeaderSnapshot, RequestLogEntry};

/// Append-only sink for per-attempt request records.
#[derive(Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &RequestLogEntry) -> Result<(), AppError> {
        let req_headers = serde_json::to_string(&entry.req_headers)
            .map_err(|e| AppError::BadInput(e.to_string()))?;
        let resp_headers = serde_json::to_string(&entry.resp_headers)
            .map_err(|e| AppError::BadInput(e.to_string()))?;

        sqlx::query(
            "INSERT INTO logs (time, credential_id, method, url, req_headers, req_body, \
             req_size, resp_headers, resp_body, resp_size, status, duration_ms, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.time)
        .bind(entry.credential_id)
        .bind(&entry.method)
        .bind(&entry.url)
        .bind(req_headers)
        .bind(&entry.req_body)
        .bind(entry.req_size)
        .bind(resp_headers)
        .bind(&entry.resp_body)
        .bind(entry.resp_size)
        .bind(entry.status)
        .bind(entry.duration_ms)
        .bind(&entry.error)
        .execute(&self.pool)
        .await?;

        debug!(
            credential_id = entry.credential_id,
            status = entry.status,
            "logged request"
        );
        Ok(())
    }

    /// Newest-first page of entries.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<RequestLogEntry>, AppError> {
        let rows = sqlx::query("SELECT * FROM logs ORDER BY id DESC LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<RequestLogEntry, AppError> {
    let req_headers: Option<String> = row.try_get("req_headers")?;
    let resp_headers: Option<String> = row.try_get("resp_headers")?;

    Ok(RequestLogEntry {
        id: row.try_get("id")?,
        time: row.try_get("time")?,
        credential_id: row.try_get("credential_id")?,
        method: row.try_get("method")?,
        url: row.try_get("url")?,
        req_headers: parse_snapshot(req_headers),
        req_body: row
            .try_get::<Option<Vec<u8>>, _>("req_body")?
            .unwrap_or_default(),
        req_size: row.try_get("req_size")?,
        resp_headers: parse_snapshot(resp_headers),
        resp_body: row
            .try_get::<Option<Vec<u8>>, _>("resp_body")?
            .unwrap_or_default(),
        resp_size: row.try_get("resp_size")?,
        status: row.try_get("status")?,
        duration_ms: row.try_get("duration_ms")?,
        error: row
            .try_get::<Option<String>, _>("error")?
            .filter(|s| !s.is_empty()),
    })
}

fn parse_snapshot(raw: Option<String>) -> HeaderSnapshot {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}
