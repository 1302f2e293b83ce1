use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::Credential;
use crate::oauth::OauthClient;
use crate::store::CredentialStore;

/// Picks the next usable credential. Selection and the token refresh run
/// under one mutex so two concurrent requests cannot double-spend the same
/// top-priority credential or race the token exchange.
pub struct Scheduler {
    store: CredentialStore,
    oauth: OauthClient,
    lock: Mutex<()>,
}

impl Scheduler {
    pub fn new(store: CredentialStore, oauth: OauthClient) -> Self {
        Self {
            store,
            oauth,
            lock: Mutex::new(()),
        }
    }

    /// The lowest-priority non-exhausted credential, with its access token
    /// refreshed if due. Credentials whose refresh fails are skipped; they
    /// are transiently unusable, not over quota.
    pub async fn next(&self) -> Result<Credential, AppError> {
        let _guard = self.lock.lock().await;
        debug!("selecting next credential");

        let credentials = self.store.list().await?;
        let now = Utc::now();
        for cred in credentials {
            if cred.exhausted && cred.reset_at.is_some_and(|t| now < t) {
                debug!(id = cred.id, reset_at = ?cred.reset_at, "skipping exhausted credential");
                continue;
            }
            let cred = if cred.is_interactive() {
                match self.oauth.refresh_if_needed(&self.store, &cred).await {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(id = cred.id, "refresh failed, skipping: {}", e);
                        continue;
                    }
                }
            } else {
                cred
            };
            debug!(id = cred.id, "selected credential");
            return Ok(cred);
        }

        warn!("no credentials available");
        Err(AppError::NoCredentials)
    }

    /// Hold the credential out of rotation until `reset_at`.
    pub async fn mark_exhausted(
        &self,
        id: i64,
        reset_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.store.mark_exhausted(id, reset_at).await
    }
}
