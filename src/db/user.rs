use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use crate::password::{PasswordError, hash_password_async};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// A user as exposed to the rest of the application. Never carries the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    created_at: String,
    updated_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A user together with their stored password hash, for login only.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    id: i64,
    email: String,
    password_hash: String,
    created_at: String,
    updated_at: String,
}

/// Changes to apply to a user. `None` leaves a field untouched.
/// The password is always plaintext here and gets hashed before storage.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
}

const USER_COLUMNS: &str = "id, email, created_at, updated_at";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user from a plaintext password.
    pub async fn create(&self, email: &str, password: &str) -> Result<User, UserStoreError> {
        let password_hash = hash_password_async(password.to_string())
            .await
            .map_err(UserStoreError::Hashing)?;

        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (email, password_hash) VALUES (?, ?) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(email)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(UserStoreError::from_write)?;

        Ok(row.into())
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Get a user and their password hash by email (case-insensitive).
    pub async fn get_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<StoredCredentials>, sqlx::Error> {
        let row: Option<CredentialsRow> = sqlx::query_as(
            "SELECT id, email, password_hash, created_at, updated_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| StoredCredentials {
            user: User {
                id: row.id,
                email: row.email,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            password_hash: row.password_hash,
        }))
    }

    /// List all users, oldest first.
    pub async fn list(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Apply an update. A new password is re-hashed before it is written.
    /// Returns `None` if the user does not exist.
    pub async fn update(
        &self,
        id: i64,
        update: UserUpdate,
    ) -> Result<Option<User>, UserStoreError> {
        let password_hash = match update.password {
            Some(password) => Some(
                hash_password_async(password)
                    .await
                    .map_err(UserStoreError::Hashing)?,
            ),
            None => None,
        };

        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET
                email = COALESCE(?, email),
                password_hash = COALESCE(?, password_hash),
                updated_at = datetime('now')
             WHERE id = ?
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(update.email)
        .bind(password_hash)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(UserStoreError::from_write)?;

        Ok(row.map(User::from))
    }

    /// Delete a user by ID. Their refresh tokens go with them.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Errors from user writes.
#[derive(Debug)]
pub enum UserStoreError {
    /// Password hashing failed
    Hashing(PasswordError),
    /// Another user already has this email
    EmailTaken,
    /// Database error
    Database(sqlx::Error),
}

impl UserStoreError {
    fn from_write(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => UserStoreError::EmailTaken,
            _ => UserStoreError::Database(e),
        }
    }
}

impl std::fmt::Display for UserStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserStoreError::Hashing(e) => write!(f, "{}", e),
            UserStoreError::EmailTaken => write!(f, "Email is already taken"),
            UserStoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for UserStoreError {}
