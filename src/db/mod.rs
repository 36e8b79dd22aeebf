mod credential;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

pub use credential::CredentialTable;
pub use user::UserTable;

use crate::error::StoreError;
use crate::store::{CredentialKind, CredentialRecord, CredentialStore, NewCredential, NewUser, User};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Timestamps are Unix seconds
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    hashed_password TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
                "CREATE TABLE sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    token_hash TEXT UNIQUE NOT NULL,
                    user_id TEXT NOT NULL REFERENCES users(uuid) ON DELETE CASCADE,
                    issued_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    revoked_at INTEGER,
                    rotated_from TEXT
                )",
                "CREATE INDEX idx_sessions_user_id ON sessions(user_id)",
                "CREATE INDEX idx_sessions_expires_at ON sessions(expires_at)",
                // Only hashes of refresh secrets are stored
                "CREATE TABLE refresh_tokens (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    token_hash TEXT UNIQUE NOT NULL,
                    user_id TEXT NOT NULL REFERENCES users(uuid) ON DELETE CASCADE,
                    issued_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    revoked_at INTEGER,
                    rotated_from TEXT
                )",
                "CREATE INDEX idx_refresh_tokens_user_id ON refresh_tokens(user_id)",
                "CREATE INDEX idx_refresh_tokens_expires_at ON refresh_tokens(expires_at)",
                "CREATE INDEX idx_refresh_tokens_rotated_from ON refresh_tokens(rotated_from)",
            ],
        )
        .await
    }

    /// Get the user table.
    pub fn users(&self) -> UserTable {
        UserTable::new(self.pool.clone())
    }

    /// Get the table holding credentials of the given kind.
    pub fn credentials(&self, kind: CredentialKind) -> CredentialTable {
        CredentialTable::new(self.pool.clone(), kind)
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl CredentialStore for Database {
    async fn get_credential_by_hash(
        &self,
        kind: CredentialKind,
        token_hash: &str,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        self.credentials(kind).get_by_hash(token_hash).await
    }

    async fn insert_credential(
        &self,
        kind: CredentialKind,
        credential: NewCredential,
    ) -> Result<CredentialRecord, StoreError> {
        self.credentials(kind).create(&credential).await
    }

    async fn mark_revoked(&self, kind: CredentialKind, id: i64, at: i64) -> Result<u64, StoreError> {
        self.credentials(kind).revoke(id, at).await
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: i64) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut revoked = 0;
        for kind in [CredentialKind::Refresh, CredentialKind::Session] {
            revoked += credential::revoke_all_for_user(&mut tx, kind, user_id, at).await?;
        }
        tx.commit().await?;
        Ok(revoked)
    }

    async fn replace_credential(
        &self,
        kind: CredentialKind,
        old_id: i64,
        successor: NewCredential,
        at: i64,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        self.credentials(kind).replace(old_id, &successor, at).await
    }

    async fn purge_dead_credentials(&self, before: i64) -> Result<u64, StoreError> {
        let mut deleted = 0;
        for kind in [CredentialKind::Refresh, CredentialKind::Session] {
            deleted += self.credentials(kind).delete_expired_before(before).await?;
        }
        Ok(deleted)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.users().create(&user).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.users().get_by_email(email).await
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.users().get_by_uuid(id).await
    }

    async fn update_password_and_revoke_all(
        &self,
        id: Uuid,
        hashed_password: &str,
        at: i64,
    ) -> Result<Option<u64>, StoreError> {
        let mut tx = self.pool.begin().await?;
        if !user::set_password_hash(&mut tx, id, hashed_password, at).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        let mut revoked = 0;
        for kind in [CredentialKind::Refresh, CredentialKind::Session] {
            revoked += credential::revoke_all_for_user(&mut tx, kind, id, at).await?;
        }
        tx.commit().await?;
        Ok(Some(revoked))
    }
}

/// Map insert failures, turning unique violations into [`StoreError::Conflict`].
fn insert_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict,
        other => StoreError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn user(db: &Database, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.insert_user(NewUser {
            id,
            email: email.to_string(),
            hashed_password: "$argon2id$placeholder".to_string(),
            created_at: 100,
        })
        .await
        .unwrap();
        id
    }

    fn credential(hash: &str, user_id: Uuid, expires_at: i64) -> NewCredential {
        NewCredential {
            token_hash: hash.to_string(),
            user_id,
            issued_at: 100,
            expires_at,
            rotated_from: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();
        let id = user(&db, "alice@example.com").await;

        let by_email = db.get_user_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, id);
        assert_eq!(by_email.created_at, 100);

        // Email lookups ignore case
        let upper = db.get_user_by_email("ALICE@example.com").await.unwrap().unwrap();
        assert_eq!(upper.id, id);

        let by_id = db.get_user_by_id(id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "alice@example.com");

        assert!(db.get_user_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let db = Database::open(":memory:").await.unwrap();
        user(&db, "alice@example.com").await;

        let result = db
            .insert_user(NewUser {
                id: Uuid::new_v4(),
                email: "alice@example.com".to_string(),
                hashed_password: "x".to_string(),
                created_at: 100,
            })
            .await;
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn test_update_password_and_revoke_all() {
        let db = Database::open(":memory:").await.unwrap();
        let id = user(&db, "alice@example.com").await;
        let other = user(&db, "bob@example.com").await;

        db.insert_credential(CredentialKind::Session, credential("s", id, 500))
            .await
            .unwrap();
        db.insert_credential(CredentialKind::Refresh, credential("r", id, 500))
            .await
            .unwrap();
        db.insert_credential(CredentialKind::Refresh, credential("b", other, 500))
            .await
            .unwrap();

        let revoked = db
            .update_password_and_revoke_all(id, "new-hash", 200)
            .await
            .unwrap();
        assert_eq!(revoked, Some(2));

        let updated = db.get_user_by_id(id).await.unwrap().unwrap();
        assert_eq!(updated.hashed_password, "new-hash");
        assert_eq!(updated.updated_at, 200);
        for (kind, hash) in [(CredentialKind::Session, "s"), (CredentialKind::Refresh, "r")] {
            let row = db.get_credential_by_hash(kind, hash).await.unwrap().unwrap();
            assert_eq!(row.revoked_at, Some(200));
        }
        let bob = db
            .get_credential_by_hash(CredentialKind::Refresh, "b")
            .await
            .unwrap()
            .unwrap();
        assert!(bob.revoked_at.is_none());
    }

    #[tokio::test]
    async fn test_update_password_of_unknown_user_writes_nothing() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(
            db.update_password_and_revoke_all(Uuid::new_v4(), "x", 200)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_insert_and_get_credential() {
        let db = Database::open(":memory:").await.unwrap();
        let id = user(&db, "alice@example.com").await;

        let row = db
            .insert_credential(CredentialKind::Refresh, credential("hash-1", id, 500))
            .await
            .unwrap();
        assert_eq!(row.user_id, id);
        assert_eq!(row.expires_at, 500);
        assert!(row.revoked_at.is_none());

        let fetched = db
            .get_credential_by_hash(CredentialKind::Refresh, "hash-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, row);

        // Kinds live in separate tables
        assert!(
            db.get_credential_by_hash(CredentialKind::Session, "hash-1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicate_hash_conflicts() {
        let db = Database::open(":memory:").await.unwrap();
        let id = user(&db, "alice@example.com").await;

        db.insert_credential(CredentialKind::Session, credential("dup", id, 500))
            .await
            .unwrap();
        let result = db
            .insert_credential(CredentialKind::Session, credential("dup", id, 500))
            .await;
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn test_mark_revoked_is_conditional() {
        let db = Database::open(":memory:").await.unwrap();
        let id = user(&db, "alice@example.com").await;
        let row = db
            .insert_credential(CredentialKind::Session, credential("s", id, 500))
            .await
            .unwrap();

        assert_eq!(db.mark_revoked(CredentialKind::Session, row.id, 150).await.unwrap(), 1);
        assert_eq!(db.mark_revoked(CredentialKind::Session, row.id, 160).await.unwrap(), 0);

        let fetched = db
            .get_credential_by_hash(CredentialKind::Session, "s")
            .await
            .unwrap()
            .unwrap();
        // First revocation time is kept
        assert_eq!(fetched.revoked_at, Some(150));
    }

    #[tokio::test]
    async fn test_replace_credential() {
        let db = Database::open(":memory:").await.unwrap();
        let id = user(&db, "alice@example.com").await;
        let old = db
            .insert_credential(CredentialKind::Refresh, credential("old", id, 500))
            .await
            .unwrap();

        let mut next = credential("new", id, 900);
        next.rotated_from = Some("old".to_string());
        let new = db
            .replace_credential(CredentialKind::Refresh, old.id, next, 200)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(new.rotated_from.as_deref(), Some("old"));

        let old = db
            .get_credential_by_hash(CredentialKind::Refresh, "old")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(old.revoked_at, Some(200));

        // Second replacement of the same row writes nothing
        let mut again = credential("newer", id, 900);
        again.rotated_from = Some("old".to_string());
        assert!(
            db.replace_credential(CredentialKind::Refresh, old.id, again, 300)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            db.get_credential_by_hash(CredentialKind::Refresh, "newer")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_revoke_all_for_user_spares_other_users() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = user(&db, "alice@example.com").await;
        let bob = user(&db, "bob@example.com").await;

        db.insert_credential(CredentialKind::Refresh, credential("a1", alice, 500))
            .await
            .unwrap();
        db.insert_credential(CredentialKind::Session, credential("a2", alice, 500))
            .await
            .unwrap();
        db.insert_credential(CredentialKind::Refresh, credential("b1", bob, 500))
            .await
            .unwrap();

        assert_eq!(db.revoke_all_for_user(alice, 200).await.unwrap(), 2);
        // Already revoked rows are not counted again
        assert_eq!(db.revoke_all_for_user(alice, 300).await.unwrap(), 0);

        let b1 = db
            .get_credential_by_hash(CredentialKind::Refresh, "b1")
            .await
            .unwrap()
            .unwrap();
        assert!(b1.revoked_at.is_none());
    }

    #[tokio::test]
    async fn test_purge_dead_credentials() {
        let db = Database::open(":memory:").await.unwrap();
        let id = user(&db, "alice@example.com").await;

        db.insert_credential(CredentialKind::Refresh, credential("expired", id, 150))
            .await
            .unwrap();
        db.insert_credential(CredentialKind::Session, credential("expired-s", id, 150))
            .await
            .unwrap();
        let live = db
            .insert_credential(CredentialKind::Refresh, credential("live", id, 900))
            .await
            .unwrap();
        db.mark_revoked(CredentialKind::Refresh, live.id, 160)
            .await
            .unwrap();

        assert_eq!(db.purge_dead_credentials(200).await.unwrap(), 2);
        // Revoked but unexpired rows are kept for reuse detection
        assert!(
            db.get_credential_by_hash(CredentialKind::Refresh, "live")
                .await
                .unwrap()
                .is_some()
        );
    }
}
