#![allow(dead_code)]

use std::sync::Arc;

use chirpy_auth::store::CredentialKind;
use chirpy_auth::{
    AuthConfig, AuthService, Clock, CredentialRecord, CredentialStore, Database, LoginGrant,
    ManualClock,
};
use uuid::Uuid;

pub const PASSWORD: &str = "correct-horse-battery";

/// 2023-11-14, an arbitrary fixed start for the manual clock.
pub const START: i64 = 1_700_000_000;

pub struct TestContext {
    pub service: Arc<AuthService<Database>>,
    pub db: Arc<Database>,
    pub clock: Arc<ManualClock>,
}

/// Service over a fresh in-memory database with a manual clock.
pub async fn setup() -> TestContext {
    let db = Arc::new(
        Database::open(":memory:")
            .await
            .expect("Failed to open test database"),
    );
    let clock = Arc::new(ManualClock::new(START));
    let config = AuthConfig::new(b"test-jwt-secret-0123456789abcdef".to_vec());
    let service = Arc::new(AuthService::new(config, db.clone(), clock.clone()));
    TestContext { service, db, clock }
}

impl TestContext {
    /// Register a user with [`PASSWORD`] and return their id.
    pub async fn register(&self, email: &str) -> Uuid {
        self.service
            .register(email, PASSWORD)
            .await
            .expect("Failed to register user")
            .id
    }

    pub async fn login(&self, email: &str) -> LoginGrant {
        self.service
            .login(email, PASSWORD)
            .await
            .expect("Failed to log in")
    }

    /// Read a credential row straight from the store.
    pub async fn row(&self, kind: CredentialKind, token_hash: &str) -> CredentialRecord {
        self.db
            .get_credential_by_hash(kind, token_hash)
            .await
            .expect("Store lookup failed")
            .expect("Credential row missing")
    }

    /// Number of refresh token rows created by rotating the given parent.
    pub async fn successors_of(&self, parent_hash: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM refresh_tokens WHERE rotated_from = ?")
            .bind(parent_hash)
            .fetch_one(self.db.pool())
            .await
            .expect("Failed to count successors")
    }

    /// Number of credentials of a user that are neither revoked nor expired.
    pub async fn live_credentials(&self, user_id: Uuid) -> i64 {
        let now = self.clock_now();
        let mut total = 0;
        for table in ["sessions", "refresh_tokens"] {
            let count: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM {table}
                 WHERE user_id = ? AND revoked_at IS NULL AND expires_at > ?"
            ))
            .bind(user_id.to_string())
            .bind(now)
            .fetch_one(self.db.pool())
            .await
            .expect("Failed to count live credentials");
            total += count;
        }
        total
    }

    pub fn clock_now(&self) -> i64 {
        self.clock.now()
    }
}
