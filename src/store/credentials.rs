use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::models::{Credential, CredentialKind};

/// Durable CRUD over the credential pool. The store is the single owner of
/// all credential rows; callers get snapshots and push mutations back through
/// `update` and friends.
#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All credentials ordered by ascending priority, ties broken by id.
    pub async fn list(&self) -> Result<Vec<Credential>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM credentials ORDER BY priority ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(credential_from_row).collect()
    }

    pub async fn get(&self, id: i64) -> Result<Option<Credential>, AppError> {
        let row = sqlx::query("SELECT * FROM credentials WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(credential_from_row).transpose()
    }

    pub async fn add_static_key(
        &self,
        name: &str,
        secret: &str,
        base_url: Option<&str>,
        priority: i64,
    ) -> Result<Credential, AppError> {
        debug!(name, priority, "adding static key credential");
        let existing = sqlx::query(
            "SELECT id FROM credentials WHERE kind = 'static_key' AND secret = ?",
        )
        .bind(secret)
        .fetch_optional(&self.pool)
        .await?;
        if existing.is_some() {
            warn!(name, "duplicate static key credential");
            return Err(AppError::DuplicateCredential);
        }

        let res = sqlx::query(
            "INSERT INTO credentials (name, kind, secret, base_url, priority, exhausted) \
             VALUES (?, 'static_key', ?, ?, ?, 0)",
        )
        .bind(name)
        .bind(secret)
        .bind(base_url)
        .bind(priority)
        .execute(&self.pool)
        .await?;

        let id = res.last_insert_rowid();
        info!(id, name, "added static key credential");
        Ok(Credential {
            id,
            name: name.to_string(),
            kind: CredentialKind::StaticKey {
                secret: secret.to_string(),
                base_url: base_url.map(str::to_string),
            },
            priority,
            exhausted: false,
            reset_at: None,
        })
    }

    /// Insert an interactive-login credential. The row starts with an empty
    /// access token and an epoch refresh timestamp so the scheduler refreshes
    /// it before first use; callers that already hold a token follow up with
    /// `update`.
    pub async fn add_interactive(
        &self,
        name: &str,
        refresh_token: &str,
        tenant_id: Option<&str>,
        priority: i64,
    ) -> Result<Credential, AppError> {
        debug!(name, priority, "adding interactive login credential");
        let existing = sqlx::query(
            "SELECT id FROM credentials WHERE kind = 'interactive_login' AND refresh_token = ?",
        )
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;
        if existing.is_some() {
            warn!(name, "duplicate interactive login credential");
            return Err(AppError::DuplicateCredential);
        }

        let refreshed_at = DateTime::<Utc>::UNIX_EPOCH;
        let res = sqlx::query(
            "INSERT INTO credentials \
             (name, kind, refresh_token, access_token, token_refreshed_at, tenant_id, priority, exhausted) \
             VALUES (?, 'interactive_login', ?, '', ?, ?, ?, 0)",
        )
        .bind(name)
        .bind(refresh_token)
        .bind(refreshed_at)
        .bind(tenant_id)
        .bind(priority)
        .execute(&self.pool)
        .await?;

        let id = res.last_insert_rowid();
        info!(id, name, "added interactive login credential");
        Ok(Credential {
            id,
            name: name.to_string(),
            kind: CredentialKind::InteractiveLogin {
                refresh_token: refresh_token.to_string(),
                access_token: String::new(),
                token_refreshed_at: refreshed_at,
                tenant_id: tenant_id.map(str::to_string),
            },
            priority,
            exhausted: false,
            reset_at: None,
        })
    }

    /// Full-row replace by id. Read-modify-write is the caller's job; the
    /// last writer wins.
    pub async fn update(&self, cred: &Credential) -> Result<(), AppError> {
        debug!(id = cred.id, "updating credential");
        let (secret, base_url, refresh_token, access_token, token_refreshed_at, tenant_id) =
            match &cred.kind {
                CredentialKind::StaticKey { secret, base_url } => (
                    Some(secret.as_str()),
                    base_url.as_deref(),
                    None,
                    None,
                    None,
                    None,
                ),
                CredentialKind::InteractiveLogin {
                    refresh_token,
                    access_token,
                    token_refreshed_at,
                    tenant_id,
                } => (
                    None,
                    None,
                    Some(refresh_token.as_str()),
                    Some(access_token.as_str()),
                    Some(*token_refreshed_at),
                    tenant_id.as_deref(),
                ),
            };

        sqlx::query(
            "UPDATE credentials SET name = ?, kind = ?, secret = ?, base_url = ?, \
             refresh_token = ?, access_token = ?, token_refreshed_at = ?, tenant_id = ?, \
             priority = ?, exhausted = ?, reset_at = ? WHERE id = ?",
        )
        .bind(&cred.name)
        .bind(cred.kind_str())
        .bind(secret)
        .bind(base_url)
        .bind(refresh_token)
        .bind(access_token)
        .bind(token_refreshed_at)
        .bind(tenant_id)
        .bind(cred.priority)
        .bind(cred.exhausted)
        .bind(cred.reset_at)
        .bind(cred.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        info!(id, "deleting credential");
        sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_exhausted(
        &self,
        id: i64,
        reset_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        warn!(id, %reset_at, "marking credential exhausted");
        sqlx::query("UPDATE credentials SET exhausted = 1, reset_at = ? WHERE id = ?")
            .bind(reset_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn reactivate(&self, id: i64) -> Result<(), AppError> {
        info!(id, "reactivating credential");
        sqlx::query("UPDATE credentials SET exhausted = 0, reset_at = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Priority a newly added credential gets when the caller does not pick
    /// one: one past the current maximum, 0 for an empty pool.
    pub async fn next_priority(&self) -> Result<i64, AppError> {
        let next: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(priority) + 1, 0) FROM credentials")
                .fetch_one(&self.pool)
                .await?;
        Ok(next)
    }
}

fn credential_from_row(row: &SqliteRow) -> Result<Credential, AppError> {
    let kind_str: String = row.try_get("kind")?;
    let kind = match kind_str.as_str() {
        "static_key" => CredentialKind::StaticKey {
            secret: row
                .try_get::<Option<String>, _>("secret")?
                .unwrap_or_default(),
            base_url: row
                .try_get::<Option<String>, _>("base_url")?
                .filter(|s| !s.is_empty()),
        },
        "interactive_login" => CredentialKind::InteractiveLogin {
            refresh_token: row
                .try_get::<Option<String>, _>("refresh_token")?
                .unwrap_or_default(),
            access_token: row
                .try_get::<Option<String>, _>("access_token")?
                .unwrap_or_default(),
            token_refreshed_at: row
                .try_get::<Option<DateTime<Utc>>, _>("token_refreshed_at")?
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            tenant_id: row
                .try_get::<Option<String>, _>("tenant_id")?
                .filter(|s| !s.is_empty()),
        },
        other => {
            return Err(AppError::Database(sqlx::Error::Decode(
                format!("unknown credential kind {other:?}").into(),
            )))
        }
    };

    Ok(Credential {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind,
        priority: row.try_get("priority")?,
        exhausted: row.try_get("exhausted")?,
        reset_at: row.try_get("reset_at")?,
    })
}
