pub mod credentials;
pub mod logs;

pub use credentials::CredentialStore;
pub use logs::LogStore;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::errors::AppError;

/// Open (creating if missing) the database file and bring the schema up to
/// date.
pub async fn open(path: &str) -> Result<SqlitePool, AppError> {
    let opts = SqliteConnectOptions::from_str(path)
        .map_err(sqlx::Error::from)?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Idempotent open-time migration: create missing tables, then add columns
/// that did not exist in earlier schema versions. Columns are only ever
/// added, never dropped; the ALTER statements fail harmlessly when the
/// column is already present.
pub async fn migrate(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS credentials (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            secret TEXT,
            base_url TEXT,
            refresh_token TEXT,
            access_token TEXT,
            token_refreshed_at TEXT,
            tenant_id TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            exhausted INTEGER NOT NULL DEFAULT 0,
            reset_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            time TEXT NOT NULL,
            credential_id INTEGER NOT NULL,
            method TEXT NOT NULL,
            url TEXT NOT NULL,
            req_headers TEXT,
            req_body BLOB,
            req_size INTEGER NOT NULL DEFAULT 0,
            resp_headers TEXT,
            resp_body BLOB,
            resp_size INTEGER NOT NULL DEFAULT 0,
            status INTEGER NOT NULL DEFAULT 0,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    for stmt in [
        "ALTER TABLE credentials ADD COLUMN base_url TEXT",
        "ALTER TABLE credentials ADD COLUMN tenant_id TEXT",
        "ALTER TABLE logs ADD COLUMN req_size INTEGER NOT NULL DEFAULT 0",
        "ALTER TABLE logs ADD COLUMN resp_size INTEGER NOT NULL DEFAULT 0",
        "ALTER TABLE logs ADD COLUMN duration_ms INTEGER NOT NULL DEFAULT 0",
    ] {
        let _ = sqlx::query(stmt).execute(pool).await;
    }

    Ok(())
}
