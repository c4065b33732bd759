mod auth;
mod error;
mod users;

use axum::{Router, middleware};

use crate::auth::{AuthState, require_session};

pub use error::ApiError;

/// Create the API router.
pub fn create_api_router(state: AuthState) -> Router {
    Router::new()
        .nest("/auth", auth::router(state.clone()))
        .nest("/user", users::router(state))
}

/// Put every route already on `router` behind the session middleware.
fn protected(router: Router<AuthState>, state: &AuthState) -> Router<AuthState> {
    router.route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_session::<AuthState>,
    ))
}
