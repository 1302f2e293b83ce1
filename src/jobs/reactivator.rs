//! Background job: put exhausted credentials back into rotation once their
//! reset instant has passed.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::AppError;
use crate::store::CredentialStore;

/// Spawn the sweep task. Call once at startup; the task runs until the
/// shutdown token is cancelled. Sweep errors are logged, never surfaced.
pub fn spawn(
    store: CredentialStore,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // interval fires immediately; an early sweep is harmless.
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("reactivator stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = sweep(&store).await {
                        error!("reactivation sweep failed: {}", e);
                    }
                }
            }
        }
    })
}

/// One pass: reactivate every credential whose exhaustion has expired.
pub async fn sweep(store: &CredentialStore) -> Result<(), AppError> {
    let now = Utc::now();
    for cred in store.list().await? {
        if cred.exhausted && cred.reset_at.is_some_and(|t| now >= t) {
            info!(id = cred.id, "reactivating credential");
            if let Err(e) = store.reactivate(cred.id).await {
                error!(id = cred.id, "reactivate failed: {}", e);
            }
        }
    }
    Ok(())
}
