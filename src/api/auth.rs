//! Login and session endpoints.
//!
//! - POST `/login` - Exchange email and password for an access and a refresh token
//! - POST `/logout` - Delete the refresh token and clear cookies
//! - GET `/me` - Current user (session required)

use axum::{
    Json, Router,
    extract::{FromRequestParts, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE, request::Parts},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::error::{ApiError, validate_email};
use super::protected;
use crate::auth::{
    ACCESS_COOKIE_NAME, Auth, AuthState, REFRESH_COOKIE_NAME, SessionBackend, clear_cookie,
    client_ip_or_unknown, get_cookie, session_cookie,
};
use crate::db::{RefreshToken, RefreshTokenError, User};
use crate::password::{PasswordError, verify_password_async, verify_unknown_account_async};

/// Attempts at creating a refresh token before a login gives up.
const REFRESH_CREATE_ATTEMPTS: usize = 3;

const INVALID_CREDENTIALS: &str = "invalid credentials";

pub fn router(state: AuthState) -> Router {
    let me = protected(Router::new().route("/me", get(me)), &state);

    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .merge(me)
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    refresh_token: String,
    user: User,
}

#[derive(Serialize)]
struct MeResponse {
    user: User,
    /// Whether this request renewed an expired access token
    renewed: bool,
}

/// Login failures are all 400 with a JSON reason.
fn login_failure(msg: impl Into<String>) -> ApiError {
    ApiError::bad_request(msg)
}

async fn login(
    State(state): State<AuthState>,
    request_ip: RequestIp,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let email = payload.email.trim();

    validate_email(email)?;
    if payload.password.is_empty() {
        return Err(login_failure("Password cannot be empty"));
    }

    let credentials = state
        .db
        .users()
        .get_credentials_by_email(email)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to get user");
            login_failure("Database error")
        })?;

    let Some(credentials) = credentials else {
        debug!("Login for unknown email");
        // Same Argon2 cost as a wrong password
        if let Err(PasswordError::Hashing(e)) =
            verify_unknown_account_async(payload.password).await
        {
            warn!(error = %e, "Failed to verify against stand-in hash");
        }
        return Err(login_failure(INVALID_CREDENTIALS));
    };

    match verify_password_async(credentials.password_hash, payload.password).await {
        Ok(()) => {}
        Err(PasswordError::Mismatch) => {
            debug!(user_id = credentials.user.id, "Login with wrong password");
            return Err(login_failure(INVALID_CREDENTIALS));
        }
        Err(e) => {
            error!(user_id = credentials.user.id, error = %e, "Failed to verify password");
            return Err(login_failure("Failed to verify password"));
        }
    }

    let user = credentials.user;

    let access = state.issuer().issue(user.id).map_err(|e| {
        error!(user_id = user.id, error = %e, "Failed to generate access token");
        login_failure("Failed to generate token")
    })?;

    let refresh = create_refresh_token(&state, &request_ip.0, user.id).await?;

    info!(user_id = user.id, "User logged in");

    let secure = state.secure_cookies();
    let access_cookie = session_cookie(ACCESS_COOKIE_NAME, &access.token, secure);
    let refresh_cookie = session_cookie(REFRESH_COOKIE_NAME, &refresh.hash, secure);

    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, access_cookie), (SET_COOKIE, refresh_cookie)]),
        Json(LoginResponse {
            token: access.token,
            refresh_token: refresh.hash,
            user,
        }),
    ))
}

/// Create a refresh token, retrying a bounded number of times on value collisions.
async fn create_refresh_token(
    state: &AuthState,
    ip: &str,
    user_id: i64,
) -> Result<RefreshToken, ApiError> {
    let store = state.db.refresh_tokens();
    let mut attempt = 1;

    loop {
        match store.create(ip, user_id).await {
            Ok(token) => return Ok(token),
            Err(e) if e.is_retryable() && attempt < REFRESH_CREATE_ATTEMPTS => {
                warn!(user_id, attempt, "Refresh token collision, retrying");
                attempt += 1;
            }
            Err(e) => {
                error!(user_id, attempt, error = %e, "Failed to create refresh token");
                return Err(login_failure(match e {
                    RefreshTokenError::Collision => "Failed to create refresh token",
                    _ => "Database error",
                }));
            }
        }
    }
}

/// Logout - delete the refresh token and clear both cookies.
async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(hash) = get_cookie(&headers, REFRESH_COOKIE_NAME) {
        match state.db.refresh_tokens().delete_by_hash(hash).await {
            Ok(true) => debug!("Refresh token deleted on logout"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Failed to delete refresh token on logout"),
        }
    }

    let secure = state.secure_cookies();
    (
        StatusCode::OK,
        AppendHeaders([
            (SET_COOKIE, clear_cookie(ACCESS_COOKIE_NAME, secure)),
            (SET_COOKIE, clear_cookie(REFRESH_COOKIE_NAME, secure)),
        ]),
        Json(serde_json::json!({ "success": true })),
    )
}

async fn me(Auth(auth): Auth) -> impl IntoResponse {
    Json(MeResponse {
        user: auth.user,
        renewed: auth.renewed,
    })
}

/// Client address as configured for this server, `"unknown"` if unavailable.
struct RequestIp(String);

impl FromRequestParts<AuthState> for RequestIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthState,
    ) -> Result<Self, Self::Rejection> {
        Ok(RequestIp(client_ip_or_unknown(&*parts, state.ip_extractor())))
    }
}
