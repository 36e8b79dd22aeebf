//! Tests for password changes and password checks during login.
//!
//! Tests cover:
//! - A failed credential revocation leaves the old password in place
//! - A store that cannot revoke on its own still gets a complete change
//! - Unknown emails pay the same hashing cost as wrong passwords

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chirpy_auth::store::{NewCredential, NewUser, User};
use chirpy_auth::{
    AuthConfig, AuthError, AuthService, CredentialKind, CredentialRecord, CredentialStore,
    Database, ManualClock, PublicError, StoreError,
};
use common::{PASSWORD, START, setup};
use uuid::Uuid;

const NEW_PASSWORD: &str = "new-password-123";

/// Database wrapper whose bulk revocation can be switched off.
struct FailingRevocationStore {
    inner: Database,
    fail: AtomicBool,
}

impl FailingRevocationStore {
    fn unavailable() -> StoreError {
        StoreError::Corrupt("revocation unavailable".into())
    }
}

impl CredentialStore for FailingRevocationStore {
    async fn get_credential_by_hash(
        &self,
        kind: CredentialKind,
        token_hash: &str,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        self.inner.get_credential_by_hash(kind, token_hash).await
    }

    async fn insert_credential(
        &self,
        kind: CredentialKind,
        credential: NewCredential,
    ) -> Result<CredentialRecord, StoreError> {
        self.inner.insert_credential(kind, credential).await
    }

    async fn mark_revoked(&self, kind: CredentialKind, id: i64, at: i64) -> Result<u64, StoreError> {
        self.inner.mark_revoked(kind, id, at).await
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: i64) -> Result<u64, StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.revoke_all_for_user(user_id, at).await
    }

    async fn replace_credential(
        &self,
        kind: CredentialKind,
        old_id: i64,
        successor: NewCredential,
        at: i64,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        self.inner.replace_credential(kind, old_id, successor, at).await
    }

    async fn purge_dead_credentials(&self, before: i64) -> Result<u64, StoreError> {
        self.inner.purge_dead_credentials(before).await
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.inner.insert_user(user).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.inner.get_user_by_email(email).await
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.inner.get_user_by_id(id).await
    }

    async fn update_password_and_revoke_all(
        &self,
        id: Uuid,
        hashed_password: &str,
        at: i64,
    ) -> Result<Option<u64>, StoreError> {
        self.inner
            .update_password_and_revoke_all(id, hashed_password, at)
            .await
    }
}

async fn failing_service() -> (AuthService<FailingRevocationStore>, Arc<FailingRevocationStore>) {
    let inner = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let store = Arc::new(FailingRevocationStore {
        inner,
        fail: AtomicBool::new(false),
    });
    let config = AuthConfig::new(b"test-jwt-secret-0123456789abcdef".to_vec());
    let service = AuthService::new(config, store.clone(), Arc::new(ManualClock::new(START)));
    (service, store)
}

#[tokio::test]
async fn test_password_change_does_not_depend_on_separate_revocation() {
    let (service, store) = failing_service().await;
    let user = service.register("alice@example.com", PASSWORD).await.unwrap();
    let grant = service.login("alice@example.com", PASSWORD).await.unwrap();

    store.fail.store(true, Ordering::SeqCst);
    let revoked = service
        .change_password(user.id, PASSWORD, NEW_PASSWORD)
        .await
        .unwrap();
    assert_eq!(revoked, 2);

    // The new password and the revocations landed together
    assert!(matches!(
        service.validate_session(&grant.session.secret).await,
        Err(AuthError::Revoked)
    ));
    assert!(
        service
            .rotate_refresh_token(&grant.refresh.secret)
            .await
            .is_err()
    );
    assert!(matches!(
        service.login("alice@example.com", PASSWORD).await,
        Err(AuthError::InvalidCredentials)
    ));
    service
        .login("alice@example.com", NEW_PASSWORD)
        .await
        .unwrap();
    assert_eq!(service.counters().snapshot().mass_revocations, 1);
}

#[tokio::test]
async fn test_failed_revocation_keeps_old_password() {
    let ctx = setup().await;
    let user_id = ctx.register("alice@example.com").await;
    let grant = ctx.login("alice@example.com").await;
    let before = ctx.db.get_user_by_id(user_id).await.unwrap().unwrap();

    // Make revoking refresh tokens fail after the password row was updated
    sqlx::query(
        "CREATE TRIGGER block_revocation BEFORE UPDATE OF revoked_at ON refresh_tokens
         BEGIN SELECT RAISE(ABORT, 'revocation unavailable'); END",
    )
    .execute(ctx.db.pool())
    .await
    .unwrap();

    ctx.clock.advance(60);
    let err = ctx
        .service
        .change_password(user_id, PASSWORD, NEW_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Store(_)));
    assert_eq!(err.public(), PublicError::Internal);

    // Nothing changed: same hash, old password works, session still live
    let after = ctx.db.get_user_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(after, before);
    assert!(ctx.service.validate_session(&grant.session.secret).await.is_ok());
    assert!(matches!(
        ctx.service.login("alice@example.com", NEW_PASSWORD).await,
        Err(AuthError::InvalidCredentials)
    ));
    ctx.login("alice@example.com").await;

    sqlx::query("DROP TRIGGER block_revocation")
        .execute(ctx.db.pool())
        .await
        .unwrap();
    ctx.service
        .change_password(user_id, PASSWORD, NEW_PASSWORD)
        .await
        .unwrap();
    assert_eq!(ctx.live_credentials(user_id).await, 0);
}

#[tokio::test]
async fn test_unknown_email_still_verifies_a_password() {
    let ctx = setup().await;
    ctx.register("alice@example.com").await;
    let start = ctx.service.counters().snapshot().password_verifications;

    ctx.service
        .login("alice@example.com", "wrong-password")
        .await
        .unwrap_err();
    let after_wrong_password = ctx.service.counters().snapshot().password_verifications;

    ctx.service
        .login("nobody@example.com", PASSWORD)
        .await
        .unwrap_err();
    let after_unknown_email = ctx.service.counters().snapshot().password_verifications;

    assert_eq!(after_wrong_password - start, 1);
    assert_eq!(after_unknown_email - after_wrong_password, 1);
    assert_eq!(ctx.service.counters().snapshot().failed_logins, 2);
}

#[tokio::test]
async fn test_set_password_for_unknown_user() {
    let ctx = setup().await;
    assert!(matches!(
        ctx.service.set_password(Uuid::new_v4(), NEW_PASSWORD).await,
        Err(AuthError::NotFound)
    ));
    assert_eq!(ctx.service.counters().snapshot().mass_revocations, 0);
}
