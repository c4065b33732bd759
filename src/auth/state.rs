//! Authentication state.

use std::sync::Arc;

use crate::cli::IpExtractor;
use crate::db::{Database, RefreshToken, RefreshTokenError, ResolvedRefreshToken, User};
use crate::jwt::TokenIssuer;

/// Everything the session middleware needs from the application.
///
/// Implemented by [`AuthState`] over the database; tests substitute their own.
pub trait SessionBackend: Send + Sync {
    fn issuer(&self) -> &TokenIssuer;
    fn secure_cookies(&self) -> bool;
    fn ip_extractor(&self) -> Option<&IpExtractor>;
    /// Whether a renewal also replaces the refresh token.
    fn rotate_refresh_tokens(&self) -> bool;

    fn find_user(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<User>, sqlx::Error>> + Send;

    fn find_refresh_token(
        &self,
        hash: &str,
    ) -> impl Future<Output = Result<ResolvedRefreshToken, RefreshTokenError>> + Send;

    fn rotate_refresh_token(
        &self,
        old_hash: &str,
        ip: &str,
        user_id: i64,
    ) -> impl Future<Output = Result<RefreshToken, RefreshTokenError>> + Send;
}

/// Shared state for authentication and the API handlers.
#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub issuer: Arc<TokenIssuer>,
    pub secure_cookies: bool,
    pub ip_extractor: Option<IpExtractor>,
    pub rotate_refresh_tokens: bool,
}

impl SessionBackend for AuthState {
    fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    fn ip_extractor(&self) -> Option<&IpExtractor> {
        self.ip_extractor.as_ref()
    }

    fn rotate_refresh_tokens(&self) -> bool {
        self.rotate_refresh_tokens
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        self.db.users().get_by_id(id).await
    }

    async fn find_refresh_token(
        &self,
        hash: &str,
    ) -> Result<ResolvedRefreshToken, RefreshTokenError> {
        self.db.refresh_tokens().find_by_hash(hash).await
    }

    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        ip: &str,
        user_id: i64,
    ) -> Result<RefreshToken, RefreshTokenError> {
        self.db.refresh_tokens().rotate(old_hash, ip, user_id).await
    }
}
