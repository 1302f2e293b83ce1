//! Import of an externally produced `auth.json` (refresh/access token pair
//! plus account id) as one interactive-login credential.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::api::handlers::parse_last_refresh;
use crate::errors::AppError;
use crate::models::{Credential, CredentialKind};
use crate::store::CredentialStore;

#[derive(Deserialize)]
struct AuthFile {
    tokens: AuthTokens,
    #[serde(default)]
    last_refresh: Option<String>,
}

#[derive(Deserialize)]
struct AuthTokens {
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    account_id: Option<String>,
}

/// Import from `<codex_home>/auth.json`.
pub async fn from_file(
    store: &CredentialStore,
    codex_home: &Path,
) -> Result<Credential, AppError> {
    let path = codex_home.join("auth.json");
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::BadInput(format!("read {}: {}", path.display(), e)))?;
    from_document(store, &data).await
}

/// Import from the document bytes. The account id doubles as tenant id and,
/// truncated, as the display name; priority lands after every existing
/// credential.
pub async fn from_document(
    store: &CredentialStore,
    data: &[u8],
) -> Result<Credential, AppError> {
    let auth: AuthFile =
        serde_json::from_slice(data).map_err(|e| AppError::BadInput(e.to_string()))?;
    if auth.tokens.refresh_token.is_empty() {
        return Err(AppError::BadInput("refresh token not found".into()));
    }

    let account_id = auth.tokens.account_id.unwrap_or_default();
    let name: String = account_id.chars().take(8).collect();
    let priority = store.next_priority().await?;

    info!(name, "importing interactive login credential");
    let mut cred = store
        .add_interactive(
            &name,
            &auth.tokens.refresh_token,
            Some(&account_id).filter(|s| !s.is_empty()).map(String::as_str),
            priority,
        )
        .await?;

    if let CredentialKind::InteractiveLogin {
        access_token,
        token_refreshed_at,
        ..
    } = &mut cred.kind
    {
        if let Some(token) = auth.tokens.access_token.filter(|s| !s.is_empty()) {
            *access_token = token;
        }
        *token_refreshed_at = parse_last_refresh(auth.last_refresh.as_deref());
    }
    store.update(&cred).await?;
    Ok(cred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Utc};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> CredentialStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::store::migrate(&pool).await.unwrap();
        CredentialStore::new(pool)
    }

    #[tokio::test]
    async fn import_derives_name_tenant_and_refresh_instant() {
        let store = test_store().await;
        let doc = serde_json::json!({
            "tokens": {
                "refresh_token": "rt-import",
                "access_token": "at-import",
                "account_id": "acct-1234567890",
            },
            "last_refresh": "2025-06-01T12:00:00Z",
        });

        let cred = from_document(&store, doc.to_string().as_bytes())
            .await
            .unwrap();
        assert_eq!(cred.name, "acct-123");

        let stored = store.get(cred.id).await.unwrap().unwrap();
        match stored.kind {
            CredentialKind::InteractiveLogin {
                refresh_token,
                access_token,
                token_refreshed_at,
                tenant_id,
            } => {
                assert_eq!(refresh_token, "rt-import");
                assert_eq!(access_token, "at-import");
                assert_eq!(tenant_id.as_deref(), Some("acct-1234567890"));
                assert_eq!(token_refreshed_at.year(), 2025);
                assert_eq!(token_refreshed_at.month(), 6);
            }
            _ => panic!("wrong kind"),
        }
    }

    #[tokio::test]
    async fn import_without_last_refresh_dates_the_token_now() {
        let store = test_store().await;
        let doc = serde_json::json!({
            "tokens": { "refresh_token": "rt-now", "access_token": "at" }
        });

        let before = Utc::now();
        let cred = from_document(&store, doc.to_string().as_bytes())
            .await
            .unwrap();
        let stored = store.get(cred.id).await.unwrap().unwrap();
        match stored.kind {
            CredentialKind::InteractiveLogin {
                token_refreshed_at, ..
            } => assert!(token_refreshed_at >= before),
            _ => panic!("wrong kind"),
        }
    }

    #[tokio::test]
    async fn import_requires_refresh_token() {
        let store = test_store().await;
        let doc = serde_json::json!({ "tokens": { "access_token": "at" } });

        let err = from_document(&store, doc.to_string().as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadInput(_)));
    }

    #[tokio::test]
    async fn imported_priority_lands_after_existing_credentials() {
        let store = test_store().await;
        store
            .add_static_key("key", "sk-1", None, 5)
            .await
            .unwrap();

        let doc = serde_json::json!({ "tokens": { "refresh_token": "rt-prio" } });
        let cred = from_document(&store, doc.to_string().as_bytes())
            .await
            .unwrap();
        assert_eq!(cred.priority, 6);
    }
}
