//! User resource.
//!
//! - POST `/` - Register (public)
//! - GET `/` - List users
//! - GET `/{id}` - One user
//! - PUT `/{id}` - Update own email and/or password
//! - DELETE `/{id}` - Delete own account

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::info;

use super::error::{ApiError, ResultExt, validate_email, validate_password};
use super::protected;
use crate::auth::{Auth, AuthState, AuthenticatedUser};
use crate::db::{User, UserUpdate};

pub fn router(state: AuthState) -> Router {
    let authenticated = protected(
        Router::new()
            .route("/", get(list_users))
            .route("/{id}", get(get_user).put(update_user).delete(delete_user)),
        &state,
    );

    Router::new()
        .route("/", post(create_user))
        .merge(authenticated)
        .with_state(state)
}

#[derive(Deserialize)]
struct CreateUserRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct UpdateUserRequest {
    email: Option<String>,
    password: Option<String>,
}

fn parse_id(id: &str) -> Result<i64, ApiError> {
    match id.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::bad_request("Invalid user id")),
    }
}

/// Only the account owner may change or delete it.
fn require_self(auth: &AuthenticatedUser, id: i64, action: &str) -> Result<(), ApiError> {
    if auth.user.id != id {
        return Err(ApiError::forbidden(format!(
            "You can only {} your own account",
            action
        )));
    }
    Ok(())
}

async fn create_user(
    State(state): State<AuthState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let email = payload.email.trim();

    validate_email(email)?;
    validate_password(&payload.password)?;

    let user = state.db.users().create(email, &payload.password).await?;

    info!(user_id = user.id, "User created");

    Ok((StatusCode::CREATED, Json(user)))
}

async fn list_users(
    State(state): State<AuthState>,
    Auth(_auth): Auth,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = state.db.users().list().await.db_err("Failed to list users")?;
    Ok(Json(users))
}

async fn get_user(
    State(state): State<AuthState>,
    Auth(_auth): Auth,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let id = parse_id(&id)?;

    state
        .db
        .users()
        .get_by_id(id)
        .await
        .db_err("Failed to get user")?
        .map(Json)
        .ok_or_else(|| ApiError::bad_request("User not found"))
}

async fn update_user(
    State(state): State<AuthState>,
    Auth(auth): Auth,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let id = parse_id(&id)?;
    require_self(&auth, id, "update")?;

    let Json(payload) = payload?;

    let email = payload.email.map(|e| e.trim().to_string());
    if let Some(email) = &email {
        validate_email(email)?;
    }
    if let Some(password) = &payload.password {
        validate_password(password)?;
    }
    if email.is_none() && payload.password.is_none() {
        return Err(ApiError::bad_request("Nothing to update"));
    }

    let password_changed = payload.password.is_some();
    let user = state
        .db
        .users()
        .update(
            id,
            UserUpdate {
                email,
                password: payload.password,
            },
        )
        .await?
        .ok_or_else(|| ApiError::bad_request("User not found"))?;

    info!(user_id = user.id, password_changed, "User updated");

    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AuthState>,
    Auth(auth): Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    require_self(&auth, id, "delete")?;

    let deleted = state
        .db
        .users()
        .delete(id)
        .await
        .db_err("Failed to delete user")?;

    if !deleted {
        return Err(ApiError::bad_request("User not found"));
    }

    info!(user_id = id, "User deleted");

    Ok(Json(serde_json::json!({ "message": "user deleted" })))
}
