use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use super::insert_error;
use crate::error::StoreError;
use crate::store::{NewUser, User};

const COLUMNS: &str = "uuid, email, hashed_password, created_at, updated_at";

#[derive(Clone)]
pub struct UserTable {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    uuid: String,
    email: String,
    hashed_password: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.uuid)
            .map_err(|e| StoreError::Corrupt(format!("user uuid {:?}: {}", row.uuid, e)))?;
        Ok(Self {
            id,
            email: row.email,
            hashed_password: row.hashed_password,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl UserTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user.
    pub async fn create(&self, user: &NewUser) -> Result<User, StoreError> {
        let query = format!(
            "INSERT INTO users (uuid, email, hashed_password, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {COLUMNS}"
        );
        let row: UserRow = sqlx::query_as(&query)
            .bind(user.id.to_string())
            .bind(&user.email)
            .bind(&user.hashed_password)
            .bind(user.created_at)
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(insert_error)?;
        row.try_into()
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE email = ?");
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE uuid = ?");
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }
}

/// Replace the stored password hash inside an existing transaction.
pub(super) async fn set_password_hash(
    tx: &mut Transaction<'_, Sqlite>,
    id: Uuid,
    hashed_password: &str,
    at: i64,
) -> Result<bool, StoreError> {
    let result = sqlx::query("UPDATE users SET hashed_password = ?, updated_at = ? WHERE uuid = ?")
        .bind(hashed_password)
        .bind(at)
        .bind(id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}
