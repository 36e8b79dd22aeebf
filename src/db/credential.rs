use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use super::insert_error;
use crate::error::StoreError;
use crate::store::{CredentialKind, CredentialRecord, NewCredential};

const COLUMNS: &str = "id, token_hash, user_id, issued_at, expires_at, revoked_at, rotated_from";

fn table(kind: CredentialKind) -> &'static str {
    match kind {
        CredentialKind::Session => "sessions",
        CredentialKind::Refresh => "refresh_tokens",
    }
}

/// Sessions or refresh tokens, depending on the kind it was opened for.
#[derive(Clone)]
pub struct CredentialTable {
    pool: SqlitePool,
    kind: CredentialKind,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: i64,
    token_hash: String,
    user_id: String,
    issued_at: i64,
    expires_at: i64,
    revoked_at: Option<i64>,
    rotated_from: Option<String>,
}

impl TryFrom<CredentialRow> for CredentialRecord {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&row.user_id).map_err(|e| {
            StoreError::Corrupt(format!("credential {} user_id: {}", row.id, e))
        })?;
        Ok(Self {
            id: row.id,
            token_hash: row.token_hash,
            user_id,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            rotated_from: row.rotated_from,
        })
    }
}

impl CredentialTable {
    pub fn new(pool: SqlitePool, kind: CredentialKind) -> Self {
        Self { pool, kind }
    }

    /// Store a new credential.
    pub async fn create(&self, credential: &NewCredential) -> Result<CredentialRecord, StoreError> {
        let row: CredentialRow = sqlx::query_as(&insert_query(self.kind))
            .bind(&credential.token_hash)
            .bind(credential.user_id.to_string())
            .bind(credential.issued_at)
            .bind(credential.expires_at)
            .bind(&credential.rotated_from)
            .fetch_one(&self.pool)
            .await
            .map_err(insert_error)?;
        row.try_into()
    }

    /// Get a credential by the hash of its secret.
    pub async fn get_by_hash(&self, token_hash: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM {} WHERE token_hash = ?",
            table(self.kind)
        );
        let row: Option<CredentialRow> = sqlx::query_as(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CredentialRecord::try_from).transpose()
    }

    /// Mark a credential as revoked. Rows already revoked keep their first timestamp.
    pub async fn revoke(&self, id: i64, at: i64) -> Result<u64, StoreError> {
        let query = format!(
            "UPDATE {} SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL",
            table(self.kind)
        );
        let result = sqlx::query(&query)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Revoke `old_id` and insert `successor` in one transaction.
    ///
    /// The revoke only matches a live row, so when several callers race on
    /// the same row exactly one of them sees it affected and gets to insert.
    /// The others roll back and get `None`.
    pub async fn replace(
        &self,
        old_id: i64,
        successor: &NewCredential,
        at: i64,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "UPDATE {} SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL",
            table(self.kind)
        );
        let result = sqlx::query(&query)
            .bind(at)
            .bind(old_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row: CredentialRow = sqlx::query_as(&insert_query(self.kind))
            .bind(&successor.token_hash)
            .bind(successor.user_id.to_string())
            .bind(successor.issued_at)
            .bind(successor.expires_at)
            .bind(&successor.rotated_from)
            .fetch_one(&mut *tx)
            .await
            .map_err(insert_error)?;

        tx.commit().await?;
        Ok(Some(row.try_into()?))
    }

    /// Delete credentials whose expiry passed before `before`.
    pub async fn delete_expired_before(&self, before: i64) -> Result<u64, StoreError> {
        let query = format!("DELETE FROM {} WHERE expires_at < ?", table(self.kind));
        let result = sqlx::query(&query)
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn insert_query(kind: CredentialKind) -> String {
    format!(
        "INSERT INTO {} (token_hash, user_id, issued_at, expires_at, rotated_from)
         VALUES (?, ?, ?, ?, ?)
         RETURNING {COLUMNS}",
        table(kind)
    )
}

/// Revoke every live credential of a user inside an existing transaction.
pub(super) async fn revoke_all_for_user(
    tx: &mut Transaction<'_, Sqlite>,
    kind: CredentialKind,
    user_id: Uuid,
    at: i64,
) -> Result<u64, StoreError> {
    let query = format!(
        "UPDATE {} SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
        table(kind)
    );
    let result = sqlx::query(&query)
        .bind(at)
        .bind(user_id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}
