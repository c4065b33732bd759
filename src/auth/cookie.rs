//! Cookie and header parsing utilities for authentication.

use axum::http::{HeaderMap, header};

/// Cookie name for the access token.
pub const ACCESS_COOKIE_NAME: &str = "jwt";

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "rt";

/// How long the client keeps either cookie. Independent of the access token's
/// own embedded expiry.
pub const COOKIE_MAX_AGE_SECS: u64 = 60 * 60;

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn get_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Build a Set-Cookie value carrying a token.
pub fn session_cookie(name: &str, value: &str, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        name, value, COOKIE_MAX_AGE_SECS, secure
    )
}

/// Build a Set-Cookie value that removes a cookie.
pub fn clear_cookie(name: &str, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0{}",
        name, secure
    )
}
