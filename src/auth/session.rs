//! Per-request session state machine.
//!
//! ```text
//! Unauthenticated -> TokenExtracted -> Verified                      -> Authorized
//!                                   -> Rejected                      -> Denied
//!                                   -> Expired -> RefreshAttempted   -> Authorized (renewed)
//!                                                                    -> Denied
//! ```
//!
//! Only a genuine expiry (valid signature, past `exp`) may enter the renewal
//! path. Tampered or unparseable tokens are denied without touching the
//! refresh token store.

use axum::http::HeaderMap;
use tracing::{debug, error, warn};

use super::cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_bearer_token, get_cookie,
};
use super::errors::SessionError;
use super::state::SessionBackend;
use crate::db::{RefreshToken, RefreshTokenError, User};
use crate::jwt::{AccessClaims, IssuedToken, TokenError};

/// An authorized request.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    /// Present when the access token had expired and was renewed
    pub renewal: Option<Renewal>,
}

/// Credentials minted while renewing an expired session.
#[derive(Debug, Clone)]
pub struct Renewal {
    pub access_token: IssuedToken,
    /// Replacement refresh token, only when rotation is enabled
    pub refresh_token: Option<RefreshToken>,
}

enum Stage<'a> {
    Unauthenticated,
    TokenExtracted(&'a str),
    Verified(AccessClaims),
    Expired,
    RefreshAttempted(&'a str),
}

impl Stage<'_> {
    fn name(&self) -> &'static str {
        match self {
            Stage::Unauthenticated => "unauthenticated",
            Stage::TokenExtracted(_) => "token_extracted",
            Stage::Verified(_) => "verified",
            Stage::Expired => "expired",
            Stage::RefreshAttempted(_) => "refresh_attempted",
        }
    }
}

/// Look for the access token: cookie first, then the bearer header.
fn extract_access_token(headers: &HeaderMap) -> Option<&str> {
    get_cookie(headers, ACCESS_COOKIE_NAME)
        .filter(|token| !token.is_empty())
        .or_else(|| get_bearer_token(headers))
}

/// The refresh token is only ever read from its cookie.
fn extract_refresh_token(headers: &HeaderMap) -> Option<&str> {
    get_cookie(headers, REFRESH_COOKIE_NAME).filter(|token| !token.is_empty())
}

/// Run the state machine for one request.
///
/// `client_ip` is recorded on a rotated refresh token.
pub async fn authenticate<B: SessionBackend>(
    backend: &B,
    headers: &HeaderMap,
    client_ip: &str,
) -> Result<Session, SessionError> {
    let mut stage = Stage::Unauthenticated;

    loop {
        debug!(stage = stage.name(), "Session transition");

        stage = match stage {
            Stage::Unauthenticated => match extract_access_token(headers) {
                Some(token) => Stage::TokenExtracted(token),
                None => return Err(SessionError::NoToken),
            },

            Stage::TokenExtracted(token) => match backend.issuer().verify(token) {
                Ok(claims) => Stage::Verified(claims),
                Err(TokenError::Expired) => Stage::Expired,
                Err(e) => {
                    warn!(error = %e, "Rejected access token");
                    return Err(SessionError::rejected(&e));
                }
            },

            Stage::Verified(claims) => return resolve_verified(backend, &claims).await,

            Stage::Expired => match extract_refresh_token(headers) {
                Some(hash) => Stage::RefreshAttempted(hash),
                None => return Err(SessionError::ExpiredWithoutRefresh),
            },

            Stage::RefreshAttempted(hash) => return renew(backend, hash, client_ip).await,
        };
    }
}

async fn resolve_verified<B: SessionBackend>(
    backend: &B,
    claims: &AccessClaims,
) -> Result<Session, SessionError> {
    if !claims.authorized {
        return Err(SessionError::NotAuthorized);
    }

    let user = backend
        .find_user(claims.id)
        .await
        .map_err(|e| {
            error!(user_id = claims.id, error = %e, "Failed to get user");
            SessionError::Storage
        })?
        .ok_or(SessionError::UserNotFound)?;

    Ok(Session {
        user,
        renewal: None,
    })
}

async fn renew<B: SessionBackend>(
    backend: &B,
    hash: &str,
    client_ip: &str,
) -> Result<Session, SessionError> {
    let resolved = backend
        .find_refresh_token(hash)
        .await
        .map_err(|e| match e {
            RefreshTokenError::IntegrityFailure => {
                error!("Refresh token resolved without an owner");
                SessionError::RefreshIntegrityFailure
            }
            // With rotation on, an unknown value may have just been rotated away
            RefreshTokenError::NotFound | RefreshTokenError::Collision
                if backend.rotate_refresh_tokens() =>
            {
                SessionError::RefreshConsumed
            }
            RefreshTokenError::NotFound | RefreshTokenError::Collision => {
                SessionError::RefreshNotFound
            }
            RefreshTokenError::Database(e) => {
                error!(error = %e, "Failed to look up refresh token");
                SessionError::Storage
            }
        })?;

    let user = resolved.user;

    let refresh_token = if backend.rotate_refresh_tokens() {
        let rotated = backend
            .rotate_refresh_token(hash, client_ip, user.id)
            .await
            .map_err(|e| match e {
                // Another request consumed the same token first
                RefreshTokenError::NotFound => SessionError::RefreshConsumed,
                e => {
                    error!(user_id = user.id, error = %e, "Failed to rotate refresh token");
                    SessionError::Storage
                }
            })?;
        Some(rotated)
    } else {
        None
    };

    let access_token = backend.issuer().issue(user.id).map_err(|e| {
        error!(user_id = user.id, error = %e, "Failed to generate access token");
        SessionError::Issuing
    })?;

    debug!(
        user_id = user.id,
        rotated = refresh_token.is_some(),
        "Renewed expired session"
    );

    Ok(Session {
        user,
        renewal: Some(Renewal {
            access_token,
            refresh_token,
        }),
    })
}
