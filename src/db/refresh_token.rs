//! Refresh token storage.
//!
//! A refresh token is an opaque random value handed to the client. The value
//! itself (`hash`) is the lookup key: unique, written once, never updated.
//! Access tokens are stateless and never stored.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sqlx::sqlite::SqlitePool;

use super::User;

/// Refresh tokens older than this are ignored by lookups and removed by cleanup.
pub const REFRESH_TOKEN_MAX_AGE_SECS: i64 = 14 * 24 * 60 * 60;

/// Random bytes per token value, before base64url encoding.
const HASH_BYTES: usize = 32;

/// A stored refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: i64,
    pub ip: String,
    pub hash: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: i64,
    user_id: i64,
    ip: String,
    hash: String,
    created_at: String,
    updated_at: String,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            ip: row.ip,
            hash: row.hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A refresh token together with the user that owns it.
#[derive(Debug, Clone)]
pub struct ResolvedRefreshToken {
    pub token: RefreshToken,
    pub user: User,
}

#[derive(sqlx::FromRow)]
struct ResolvedRow {
    id: i64,
    user_id: i64,
    ip: String,
    hash: String,
    created_at: String,
    updated_at: String,
    owner_id: Option<i64>,
    owner_email: Option<String>,
    owner_created_at: Option<String>,
    owner_updated_at: Option<String>,
}

impl ResolvedRow {
    fn resolve(self) -> Result<ResolvedRefreshToken, RefreshTokenError> {
        let (Some(owner_id), Some(email), Some(created_at), Some(updated_at)) = (
            self.owner_id,
            self.owner_email,
            self.owner_created_at,
            self.owner_updated_at,
        ) else {
            return Err(RefreshTokenError::IntegrityFailure);
        };

        if owner_id == 0 {
            return Err(RefreshTokenError::IntegrityFailure);
        }

        Ok(ResolvedRefreshToken {
            token: RefreshToken {
                id: self.id,
                user_id: self.user_id,
                ip: self.ip,
                hash: self.hash,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            user: User {
                id: owner_id,
                email,
                created_at,
                updated_at,
            },
        })
    }
}

/// Generate a new opaque token value.
fn generate_hash() -> String {
    let mut bytes = [0u8; HASH_BYTES];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SQLite datetime modifier for the maximum token age.
fn max_age_modifier() -> String {
    format!("-{} seconds", REFRESH_TOKEN_MAX_AGE_SECS)
}

const INSERT_TOKEN: &str = "INSERT INTO refresh_tokens (user_id, ip, hash) VALUES (?, ?, ?) RETURNING id, user_id, ip, hash, created_at, updated_at";

/// Store for managing refresh tokens.
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a refresh token for a user, recording the client address.
    ///
    /// A collision on the token value surfaces as `RefreshTokenError::Collision`;
    /// callers decide whether to try again.
    pub async fn create(&self, ip: &str, user_id: i64) -> Result<RefreshToken, RefreshTokenError> {
        self.create_with_hash(ip, user_id, &generate_hash()).await
    }

    async fn create_with_hash(
        &self,
        ip: &str,
        user_id: i64,
        hash: &str,
    ) -> Result<RefreshToken, RefreshTokenError> {
        let row: RefreshTokenRow = sqlx::query_as(INSERT_TOKEN)
            .bind(user_id)
            .bind(ip)
            .bind(hash)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    /// Look up a token by its value, resolving the owning user.
    pub async fn find_by_hash(
        &self,
        hash: &str,
    ) -> Result<ResolvedRefreshToken, RefreshTokenError> {
        let row: Option<ResolvedRow> = sqlx::query_as(
            "SELECT t.id, t.user_id, t.ip, t.hash, t.created_at, t.updated_at,
                    u.id AS owner_id, u.email AS owner_email,
                    u.created_at AS owner_created_at, u.updated_at AS owner_updated_at
             FROM refresh_tokens t
             LEFT JOIN users u ON u.id = t.user_id
             WHERE t.hash = ? AND t.created_at >= datetime('now', ?)",
        )
        .bind(hash)
        .bind(max_age_modifier())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RefreshTokenError::NotFound)?.resolve()
    }

    /// Replace a token with a freshly generated one for the same user.
    ///
    /// The old token is consumed in the same transaction, so only one of several
    /// concurrent rotations of the same value can succeed.
    pub async fn rotate(
        &self,
        old_hash: &str,
        ip: &str,
        user_id: i64,
    ) -> Result<RefreshToken, RefreshTokenError> {
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query("DELETE FROM refresh_tokens WHERE hash = ? AND user_id = ?")
            .bind(old_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if consumed.rows_affected() == 0 {
            return Err(RefreshTokenError::NotFound);
        }

        let row: RefreshTokenRow = sqlx::query_as(INSERT_TOKEN)
            .bind(user_id)
            .bind(ip)
            .bind(generate_hash())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    /// Delete a token by its value.
    pub async fn delete_by_hash(&self, hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE hash = ?")
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all tokens older than the maximum age.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE created_at < datetime('now', ?)")
            .bind(max_age_modifier())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// List a user's live tokens, newest first.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<RefreshToken>, sqlx::Error> {
        let rows: Vec<RefreshTokenRow> = sqlx::query_as(
            "SELECT id, user_id, ip, hash, created_at, updated_at FROM refresh_tokens
             WHERE user_id = ? AND created_at >= datetime('now', ?)
             ORDER BY id DESC",
        )
        .bind(user_id)
        .bind(max_age_modifier())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RefreshToken::from).collect())
    }
}

/// Errors from refresh token operations.
#[derive(Debug)]
pub enum RefreshTokenError {
    /// No live token with that value
    NotFound,
    /// The token exists but its owner cannot be resolved
    IntegrityFailure,
    /// The generated value already exists
    Collision,
    /// Database error
    Database(sqlx::Error),
}

impl RefreshTokenError {
    /// Whether repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RefreshTokenError::Collision)
    }
}

impl From<sqlx::Error> for RefreshTokenError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RefreshTokenError::Collision,
            _ => RefreshTokenError::Database(e),
        }
    }
}

impl std::fmt::Display for RefreshTokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshTokenError::NotFound => write!(f, "Refresh token not found"),
            RefreshTokenError::IntegrityFailure => {
                write!(f, "Refresh token has no resolvable owner")
            }
            RefreshTokenError::Collision => write!(f, "Refresh token value collision"),
            RefreshTokenError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for RefreshTokenError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> (Database, User) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db
            .users()
            .create("alice@example.com", "password123")
            .await
            .unwrap();
        (db, user)
    }

    async fn age_token(db: &Database, hash: &str, modifier: &str) {
        sqlx::query("UPDATE refresh_tokens SET created_at = datetime('now', ?) WHERE hash = ?")
            .bind(modifier)
            .bind(hash)
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[test]
    fn test_generated_hash_shape() {
        let hash = generate_hash();
        assert_eq!(hash.len(), 43);
        assert!(
            hash.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(hash, generate_hash());
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let (db, user) = setup().await;

        let token = db
            .refresh_tokens()
            .create("10.0.0.1", user.id)
            .await
            .unwrap();
        assert_eq!(token.user_id, user.id);
        assert_eq!(token.ip, "10.0.0.1");

        let resolved = db.refresh_tokens().find_by_hash(&token.hash).await.unwrap();
        assert_eq!(resolved.token, token);
        assert_eq!(resolved.user, user);
    }

    #[tokio::test]
    async fn test_unknown_hash_not_found() {
        let (db, _) = setup().await;
        let result = db.refresh_tokens().find_by_hash("nope").await;
        assert!(matches!(result, Err(RefreshTokenError::NotFound)));
    }

    #[tokio::test]
    async fn test_colliding_hash_is_retryable() {
        let (db, user) = setup().await;
        let store = db.refresh_tokens();

        store
            .create_with_hash("10.0.0.1", user.id, "fixed")
            .await
            .unwrap();
        let err = store
            .create_with_hash("10.0.0.2", user.id, "fixed")
            .await
            .unwrap_err();

        assert!(matches!(err, RefreshTokenError::Collision));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_concurrent_colliding_creates_only_one_succeeds() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = db.users().create("alice@example.com", "pw").await.unwrap();
        let bob = db.users().create("bob@example.com", "pw").await.unwrap();

        let store_a = db.refresh_tokens();
        let store_b = db.refresh_tokens();
        let (a, b) = tokio::join!(
            store_a.create_with_hash("10.0.0.1", alice.id, "same-value"),
            store_b.create_with_hash("10.0.0.2", bob.id, "same-value"),
        );

        assert_eq!(
            [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(),
            1,
            "exactly one create may claim the value"
        );

        let resolved = db.refresh_tokens().find_by_hash("same-value").await.unwrap();
        assert!(resolved.user.id == alice.id || resolved.user.id == bob.id);
    }

    #[tokio::test]
    async fn test_dangling_owner_is_integrity_failure() {
        let (db, _) = setup().await;

        // Bypass the foreign key to simulate a token whose owner is gone
        let mut conn = db.pool().acquire().await.unwrap();
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO refresh_tokens (user_id, ip, hash) VALUES (999, 'x', 'orphan')")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        let result = db.refresh_tokens().find_by_hash("orphan").await;
        assert!(matches!(result, Err(RefreshTokenError::IntegrityFailure)));
    }

    #[tokio::test]
    async fn test_old_token_not_found_and_cleaned_up() {
        let (db, user) = setup().await;
        let store = db.refresh_tokens();

        let old = store.create("10.0.0.1", user.id).await.unwrap();
        let fresh = store.create("10.0.0.1", user.id).await.unwrap();
        age_token(&db, &old.hash, "-15 days").await;

        assert!(matches!(
            store.find_by_hash(&old.hash).await,
            Err(RefreshTokenError::NotFound)
        ));
        assert_eq!(store.list_by_user(user.id).await.unwrap(), vec![fresh.clone()]);

        assert_eq!(store.delete_expired().await.unwrap(), 1);
        assert!(store.find_by_hash(&fresh.hash).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotate_consumes_old_token() {
        let (db, user) = setup().await;
        let store = db.refresh_tokens();

        let old = store.create("10.0.0.1", user.id).await.unwrap();
        let new = store.rotate(&old.hash, "10.0.0.2", user.id).await.unwrap();

        assert_ne!(new.hash, old.hash);
        assert_eq!(new.ip, "10.0.0.2");
        assert!(matches!(
            store.find_by_hash(&old.hash).await,
            Err(RefreshTokenError::NotFound)
        ));
        assert_eq!(store.find_by_hash(&new.hash).await.unwrap().user, user);

        // Second rotation of the consumed value fails
        assert!(matches!(
            store.rotate(&old.hash, "10.0.0.2", user.id).await,
            Err(RefreshTokenError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_by_hash() {
        let (db, user) = setup().await;
        let store = db.refresh_tokens();

        let token = store.create("10.0.0.1", user.id).await.unwrap();
        assert!(store.delete_by_hash(&token.hash).await.unwrap());
        assert!(!store.delete_by_hash(&token.hash).await.unwrap());
    }
}
