//! Refresh token rotation with reuse detection.
//!
//! Every successful refresh consumes the presented token and hands out a new
//! one. A consumed token is kept as a revoked row; if it is ever presented
//! again, the token was copied, so every session and refresh token of its
//! owner is revoked.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AuthError;
use crate::metrics::AuthCounters;
use crate::secret::hash_token;
use crate::store::{
    CredentialKind, CredentialRecord, CredentialStore, IssuedCredential, fresh_credential,
};

pub struct RefreshRotationEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    counters: Arc<AuthCounters>,
    ttl_secs: i64,
}

impl<S: CredentialStore> RefreshRotationEngine<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        counters: Arc<AuthCounters>,
        ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            clock,
            counters,
            ttl_secs,
        }
    }

    /// Issue the first refresh token of a new chain.
    pub async fn issue(&self, user_id: Uuid) -> Result<IssuedCredential, AuthError> {
        let (secret, credential) = fresh_credential(user_id, self.clock.now(), self.ttl_secs, None)?;
        let record = self
            .store
            .insert_credential(CredentialKind::Refresh, credential)
            .await?;

        self.counters.refresh_token_issued();
        debug!(user_id = %user_id, token_id = record.id, "Refresh token issued");
        Ok(IssuedCredential { secret, record })
    }

    /// Exchange a refresh token for its successor.
    ///
    /// Fails with `NotFound` for an unknown secret, `Expired` for a token past
    /// its lifetime (which is revoked on the way) and `ReuseDetected` for a
    /// token that was already revoked. Of two concurrent rotations of the same
    /// token only one succeeds; the other is handled as reuse.
    pub async fn rotate(&self, secret: &str) -> Result<IssuedCredential, AuthError> {
        let token_hash = hash_token(secret);
        let now = self.clock.now();

        let current = self
            .store
            .get_credential_by_hash(CredentialKind::Refresh, &token_hash)
            .await?
            .ok_or(AuthError::NotFound)?;

        if current.is_revoked() {
            return Err(self.reuse_detected(&current).await);
        }

        if current.is_expired(now) {
            self.store
                .mark_revoked(CredentialKind::Refresh, current.id, now)
                .await?;
            debug!(token_id = current.id, "Expired refresh token revoked");
            return Err(AuthError::Expired);
        }

        let (secret, successor) =
            fresh_credential(current.user_id, now, self.ttl_secs, Some(token_hash))?;

        match self
            .store
            .replace_credential(CredentialKind::Refresh, current.id, successor, now)
            .await?
        {
            Some(record) => {
                self.counters.rotation();
                debug!(
                    user_id = %record.user_id,
                    old_token_id = current.id,
                    token_id = record.id,
                    "Refresh token rotated"
                );
                Ok(IssuedCredential { secret, record })
            }
            // Someone else consumed it between our read and our update
            None => Err(self.reuse_detected(&current).await),
        }
    }

    /// Revoke a single refresh token by its secret (logout).
    pub async fn revoke(&self, secret: &str) -> Result<bool, AuthError> {
        let record = self
            .store
            .get_credential_by_hash(CredentialKind::Refresh, &hash_token(secret))
            .await?;
        let Some(record) = record else {
            return Ok(false);
        };

        let affected = self
            .store
            .mark_revoked(CredentialKind::Refresh, record.id, self.clock.now())
            .await?;
        Ok(affected > 0)
    }

    /// Revoke every refresh token and session of a user.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self
            .store
            .revoke_all_for_user(user_id, self.clock.now())
            .await?;

        self.counters.mass_revocation();
        info!(user_id = %user_id, revoked, "Revoked all credentials");
        Ok(revoked)
    }

    /// Handle a replayed token: revoke everything of its owner and build the
    /// error to return. If the revocation itself fails, that failure is
    /// returned instead.
    async fn reuse_detected(&self, presented: &CredentialRecord) -> AuthError {
        self.counters.reuse();
        warn!(
            user_id = %presented.user_id,
            token_id = presented.id,
            revoked_at = presented.revoked_at,
            "Refresh token reuse detected, revoking all credentials of user"
        );

        match self.revoke_all(presented.user_id).await {
            Ok(_) => AuthError::ReuseDetected {
                user_id: presented.user_id,
            },
            Err(e) => {
                error!(user_id = %presented.user_id, error = %e, "Failed to revoke after reuse");
                e
            }
        }
    }
}
