//! Session error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::jwt::TokenError;

/// Why a request was denied by the session middleware.
///
/// Every variant is answered with 401 and a JSON `{error}` body holding
/// [`SessionError::reason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// Neither the access cookie nor a bearer header was present
    NoToken,
    /// The access token could not be parsed
    TokenMalformed,
    /// The access token signature or algorithm is wrong
    TokenInvalidSignature,
    /// The access token does not carry the authorized flag
    NotAuthorized,
    /// The access token is valid but its user no longer exists
    UserNotFound,
    /// The access token expired and no refresh cookie was sent
    ExpiredWithoutRefresh,
    /// The access token expired and the refresh token is unknown or too old
    RefreshNotFound,
    /// The access token expired and the refresh token was already spent by a
    /// rotation, possibly one racing this request
    RefreshConsumed,
    /// The access token expired and the refresh token has no valid owner
    RefreshIntegrityFailure,
    /// A store lookup failed
    Storage,
    /// Minting the renewed access token failed
    Issuing,
}

impl SessionError {
    /// Machine-readable reason returned to the client.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoToken => "no token provided",
            Self::TokenMalformed => "token malformed",
            Self::TokenInvalidSignature => "token signature invalid",
            Self::NotAuthorized => "token not authorized",
            Self::UserNotFound => "user not found",
            Self::ExpiredWithoutRefresh => "token expired, no refresh token provided",
            Self::RefreshNotFound | Self::RefreshConsumed => "token expired, refresh token invalid",
            Self::RefreshIntegrityFailure => "token expired, refresh succeeded but user missing",
            Self::Storage => "storage error",
            Self::Issuing => "failed to issue token",
        }
    }

    /// Whether the client's cookies are useless after this failure.
    /// Transient failures keep them, and so does a spent refresh token: the
    /// request that rotated it may already have set a new `rt` cookie.
    pub fn clears_cookies(&self) -> bool {
        !matches!(
            self,
            Self::NoToken | Self::RefreshConsumed | Self::Storage | Self::Issuing
        )
    }

    /// Map a failed verification that is not an expiry.
    pub(super) fn rejected(e: &TokenError) -> Self {
        match e {
            TokenError::InvalidSignature => Self::TokenInvalidSignature,
            _ => Self::TokenMalformed,
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

impl std::error::Error for SessionError {}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: self.reason(),
            }),
        )
            .into_response()
    }
}
