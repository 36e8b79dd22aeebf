//! Scheduled purge of dead sessions and refresh tokens.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::clock::Clock;
use crate::store::CredentialStore;

/// How long a credential is kept after it expired (1 day).
pub const RETENTION_SECS: i64 = 24 * 60 * 60;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Delete credentials that expired more than [`RETENTION_SECS`] ago.
/// Returns the number of rows deleted; failures are logged and count as zero.
pub async fn run_cleanup<S: CredentialStore>(store: &S, clock: &dyn Clock) -> u64 {
    let before = clock.now().saturating_sub(RETENTION_SECS);
    match store.purge_dead_credentials(before).await {
        Ok(count) if count > 0 => {
            info!("Cleaned up {} expired credentials", count);
            count
        }
        Ok(_) => 0,
        Err(e) => {
            error!("Failed to clean up expired credentials: {}", e);
            0
        }
    }
}

/// Spawn a background task that runs cleanup periodically, starting now.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler<S>(store: Arc<S>, clock: Arc<dyn Clock>) -> tokio::task::JoinHandle<()>
where
    S: CredentialStore + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(store.as_ref(), clock.as_ref()).await;
        }
    })
}
