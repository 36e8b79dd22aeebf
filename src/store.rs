//! Storage interface the credential logic is written against.
//!
//! The core never talks to a database directly. [`crate::db::Database`] is the
//! SQLite implementation; anything offering atomic single-row updates can
//! implement [`CredentialStore`].

use std::future::Future;

use uuid::Uuid;

use crate::error::{AuthError, StoreError};
use crate::secret::{generate_token, hash_token};

/// The two kinds of store-backed credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// Browser session handle.
    Session,
    /// Long-lived refresh token, rotated on every use.
    Refresh,
}

/// A persisted session or refresh token row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub id: i64,
    /// SHA-256 hex digest of the secret held by the client.
    pub token_hash: String,
    pub user_id: Uuid,
    pub issued_at: i64,
    pub expires_at: i64,
    pub revoked_at: Option<i64>,
    /// Hash of the refresh token this row replaced, if it came from a rotation.
    pub rotated_from: Option<String>,
}

impl CredentialRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Expired once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    pub fn is_active(&self, now: i64) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}

/// Input for a new credential row.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub token_hash: String,
    pub user_id: Uuid,
    pub issued_at: i64,
    pub expires_at: i64,
    pub rotated_from: Option<String>,
}

/// A credential that was just issued: the raw secret for the client and the
/// row stored for it. The secret is not recoverable once this is dropped.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub secret: String,
    pub record: CredentialRecord,
}

/// Generate a secret and the row that stores its hash.
pub(crate) fn fresh_credential(
    user_id: Uuid,
    now: i64,
    ttl_secs: i64,
    rotated_from: Option<String>,
) -> Result<(String, NewCredential), AuthError> {
    let secret = generate_token()?;
    let credential = NewCredential {
        token_hash: hash_token(&secret),
        user_id,
        issued_at: now,
        expires_at: now.saturating_add(ttl_secs),
        rotated_from,
    };
    Ok((secret, credential))
}

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// PHC-formatted Argon2id hash.
    pub hashed_password: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for a new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub created_at: i64,
}

/// Persistent store for users, sessions and refresh tokens.
///
/// All futures are `Send` so operations can run on any runtime worker.
/// Dropping a future aborts the operation; implementations must leave no
/// partial writes behind when that happens.
pub trait CredentialStore: Send + Sync {
    /// Look up a credential by the hash of its secret.
    fn get_credential_by_hash(
        &self,
        kind: CredentialKind,
        token_hash: &str,
    ) -> impl Future<Output = Result<Option<CredentialRecord>, StoreError>> + Send;

    /// Insert a credential. Fails with [`StoreError::Conflict`] on a duplicate hash.
    fn insert_credential(
        &self,
        kind: CredentialKind,
        credential: NewCredential,
    ) -> impl Future<Output = Result<CredentialRecord, StoreError>> + Send;

    /// Set `revoked_at` on a row that is not yet revoked. Returns rows affected.
    fn mark_revoked(
        &self,
        kind: CredentialKind,
        id: i64,
        at: i64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Revoke every live session and refresh token of a user.
    fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        at: i64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Atomically revoke `old_id` and insert its successor.
    ///
    /// Returns `None`, writing nothing, when `old_id` was already revoked.
    /// Of several concurrent calls for the same row at most one gets `Some`.
    fn replace_credential(
        &self,
        kind: CredentialKind,
        old_id: i64,
        successor: NewCredential,
        at: i64,
    ) -> impl Future<Output = Result<Option<CredentialRecord>, StoreError>> + Send;

    /// Delete credentials that expired before `before`. Returns rows deleted.
    ///
    /// Revoked rows that have not expired are kept so a replayed refresh
    /// token is still recognised as reuse.
    fn purge_dead_credentials(
        &self,
        before: i64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Insert a user. Fails with [`StoreError::Conflict`] on a duplicate email.
    fn insert_user(&self, user: NewUser) -> impl Future<Output = Result<User, StoreError>> + Send;

    fn get_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    fn get_user_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    /// Replace a user's password hash and revoke every live session and
    /// refresh token of the user, all or nothing.
    ///
    /// Returns `None`, writing nothing, if the user does not exist, otherwise
    /// the number of credentials revoked.
    fn update_password_and_revoke_all(
        &self,
        id: Uuid,
        hashed_password: &str,
        at: i64,
    ) -> impl Future<Output = Result<Option<u64>, StoreError>> + Send;
}
