//! Server-side browser sessions.
//!
//! A session is an opaque random secret held in a cookie. The store only
//! knows its SHA-256 hash. A session is `Active` until it expires or is
//! revoked; both end states are final.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AuthError;
use crate::metrics::AuthCounters;
use crate::secret::hash_token;
use crate::store::{
    CredentialKind, CredentialRecord, CredentialStore, IssuedCredential, fresh_credential,
};

/// Result of looking up a session without touching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Active(CredentialRecord),
    Expired(CredentialRecord),
    Revoked(CredentialRecord),
    NotFound,
}

pub struct SessionManager<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    counters: Arc<AuthCounters>,
    ttl_secs: i64,
}

impl<S: CredentialStore> SessionManager<S> {
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

    /// Start a new session for `user_id`.
    pub async fn create_session(&self, user_id: Uuid) -> Result<IssuedCredential, AuthError> {
        let (secret, credential) = fresh_credential(user_id, self.clock.now(), self.ttl_secs, None)?;
        let record = self
            .store
            .insert_credential(CredentialKind::Session, credential)
            .await?;

        self.counters.session_created();
        debug!(user_id = %user_id, session_id = record.id, "Session created");
        Ok(IssuedCredential { secret, record })
    }

    /// Classify a presented session secret. Never writes.
    pub async fn inspect_session(&self, secret: &str) -> Result<SessionStatus, AuthError> {
        let record = self
            .store
            .get_credential_by_hash(CredentialKind::Session, &hash_token(secret))
            .await?;

        let Some(record) = record else {
            return Ok(SessionStatus::NotFound);
        };
        Ok(if record.is_revoked() {
            SessionStatus::Revoked(record)
        } else if record.is_expired(self.clock.now()) {
            SessionStatus::Expired(record)
        } else {
            SessionStatus::Active(record)
        })
    }

    /// Accept a session only if it is active.
    ///
    /// A session found expired is revoked through [`Self::revoke_session`]
    /// before `Expired` is returned, so later lookups report `Revoked`.
    pub async fn validate_session(&self, secret: &str) -> Result<CredentialRecord, AuthError> {
        match self.inspect_session(secret).await? {
            SessionStatus::Active(record) => Ok(record),
            SessionStatus::NotFound => Err(AuthError::NotFound),
            SessionStatus::Revoked(record) => {
                debug!(session_id = record.id, "Revoked session presented");
                Err(AuthError::Revoked)
            }
            SessionStatus::Expired(record) => {
                self.revoke_session(record.id).await?;
                debug!(session_id = record.id, "Expired session revoked");
                Err(AuthError::Expired)
            }
        }
    }

    /// Revoke a session by row id. Returns whether this call revoked it;
    /// revoking twice is harmless.
    pub async fn revoke_session(&self, id: i64) -> Result<bool, AuthError> {
        let affected = self
            .store
            .mark_revoked(CredentialKind::Session, id, self.clock.now())
            .await?;
        Ok(affected > 0)
    }

    /// Revoke the session identified by its secret (logout).
    pub async fn revoke_session_by_secret(&self, secret: &str) -> Result<bool, AuthError> {
        let record = self
            .store
            .get_credential_by_hash(CredentialKind::Session, &hash_token(secret))
            .await?;
        match record {
            Some(record) => {
                let revoked = self.revoke_session(record.id).await?;
                if revoked {
                    info!(user_id = %record.user_id, session_id = record.id, "Session revoked");
                }
                Ok(revoked)
            }
            None => Ok(false),
        }
    }
}
