//! Session authentication.
//!
//! Short-lived access tokens (5 min, stateless JWT) travel in the `jwt` cookie
//! or an `Authorization: Bearer` header. Long-lived refresh tokens are opaque
//! random strings stored in the database and only accepted from the `rt`
//! cookie. Expired access tokens are renewed transparently by the middleware.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod session;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, COOKIE_MAX_AGE_SECS, REFRESH_COOKIE_NAME, clear_cookie, get_bearer_token,
    get_cookie, session_cookie,
};
pub use errors::SessionError;
pub use extractors::{Auth, require_session};
pub use ip::{HasHeadersAndExtensions, client_ip_or_unknown, extract_client_ip};
pub use session::{Renewal, Session, authenticate};
pub use state::{AuthState, SessionBackend};
pub use types::AuthenticatedUser;
