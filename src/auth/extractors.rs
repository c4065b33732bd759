//! Session middleware and the extractor handlers use to read its result.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, clear_cookie, session_cookie};
use super::errors::SessionError;
use super::ip::client_ip_or_unknown;
use super::session::{Renewal, authenticate};
use super::state::SessionBackend;
use super::types::AuthenticatedUser;

/// Middleware guarding protected routes.
///
/// On success the request carries an [`AuthenticatedUser`] extension. When the
/// access token was renewed the response gets a fresh `jwt` cookie (and `rt`,
/// if the refresh token was rotated). Denials short-circuit with 401 and,
/// unless the failure was transient, clear both cookies.
pub async fn require_session<B>(
    State(backend): State<B>,
    mut request: Request,
    next: Next,
) -> Response
where
    B: SessionBackend + Clone + Send + Sync + 'static,
{
    let client_ip = client_ip_or_unknown(&request, backend.ip_extractor());

    // The body is not Sync, so only the headers may be borrowed across the await
    let headers = request.headers();
    let session = match authenticate(&backend, headers, &client_ip).await {
        Ok(session) => session,
        Err(e) => return deny(e, backend.secure_cookies()),
    };

    let renewal = session.renewal;
    request.extensions_mut().insert(AuthenticatedUser {
        user: session.user,
        renewed: renewal.is_some(),
    });

    let mut response = next.run(request).await;

    if let Some(renewal) = renewal {
        append_renewal_cookies(&mut response, &renewal, backend.secure_cookies());
    }

    response
}

fn append_renewal_cookies(response: &mut Response, renewal: &Renewal, secure: bool) {
    let mut cookies = vec![session_cookie(
        ACCESS_COOKIE_NAME,
        &renewal.access_token.token,
        secure,
    )];
    if let Some(refresh) = &renewal.refresh_token {
        cookies.push(session_cookie(REFRESH_COOKIE_NAME, &refresh.hash, secure));
    }

    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => error!(error = %e, "Failed to encode renewal cookie"),
        }
    }
}

fn deny(e: SessionError, secure: bool) -> Response {
    let mut response = e.into_response();
    if e.clears_cookies() {
        for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
            if let Ok(value) = HeaderValue::from_str(&clear_cookie(name, secure)) {
                response.headers_mut().append(SET_COOKIE, value);
            }
        }
    }
    response
}

/// Extractor for handlers behind [`require_session`].
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = SessionError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(Auth)
            .ok_or(SessionError::NoToken)
    }
}
