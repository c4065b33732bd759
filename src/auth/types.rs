//! Authentication user types.

use crate::db::User;

/// Identity attached to a request that passed the session middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// The resolved user
    pub user: User,
    /// Whether the access token was renewed for this request
    pub renewed: bool,
}
