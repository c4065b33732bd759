//! Tests for the user resource.

mod common;

use axum::http::{StatusCode, header};
use common::{PASSWORD, TestApp, body_json, json_request, request, with_bearer};
use tokengate::password::verify_password;

async fn token_for(app: &TestApp, email: &str) -> String {
    let json = body_json(app.login(email, PASSWORD).await).await;
    json["token"].as_str().unwrap().to_string()
}

fn authed_json(
    method: &str,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> axum::http::Request<axum::body::Body> {
    request(method, uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

async fn stored_hash(app: &TestApp, id: i64) -> String {
    let (hash,): (String,) = sqlx::query_as("SELECT password_hash FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(app.db.pool())
        .await
        .unwrap();
    hash
}

#[tokio::test]
async fn test_register_hashes_password() {
    let app = TestApp::new().await;

    let response = app
        .send(json_request(
            "POST",
            "/api/v1/user",
            serde_json::json!({ "email": "alice@example.com", "password": PASSWORD }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let id = json["id"].as_i64().unwrap();
    assert_eq!(json["email"], "alice@example.com");
    assert!(json.get("passwordHash").is_none());

    let hash = stored_hash(&app, id).await;
    assert_ne!(hash, PASSWORD);
    assert!(verify_password(&hash, PASSWORD).is_ok());
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = TestApp::new().await;
    app.create_user("alice@example.com").await;

    let response = app
        .send(json_request(
            "POST",
            "/api/v1/user",
            serde_json::json!({ "email": "ALICE@example.com", "password": "other" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_validation() {
    let app = TestApp::new().await;

    let response = app
        .send(json_request(
            "POST",
            "/api/v1/user",
            serde_json::json!({ "email": "nope", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(json_request(
            "POST",
            "/api/v1/user",
            serde_json::json!({ "email": "a@example.com", "password": "" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_read_routes_require_session() {
    let app = TestApp::new().await;
    let user = app.create_user("alice@example.com").await;

    let response = app
        .send(request("GET", "/api/v1/user").body(axum::body::Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = token_for(&app, "alice@example.com").await;

    let response = app.send(with_bearer("GET", "/api/v1/user", &token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let response = app
        .send(with_bearer("GET", &format!("/api/v1/user/{}", user.id), &token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], "alice@example.com");
}

#[tokio::test]
async fn test_get_unknown_or_bad_id() {
    let app = TestApp::new().await;
    app.create_user("alice@example.com").await;
    let token = token_for(&app, "alice@example.com").await;

    let response = app.send(with_bearer("GET", "/api/v1/user/9999", &token)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.send(with_bearer("GET", "/api/v1/user/abc", &token)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_password_rehashes() {
    let app = TestApp::new().await;
    let user = app.create_user("alice@example.com").await;
    let token = token_for(&app, "alice@example.com").await;
    let before = stored_hash(&app, user.id).await;

    let response = app
        .send(authed_json(
            "PUT",
            &format!("/api/v1/user/{}", user.id),
            &token,
            serde_json::json!({ "password": "a brand new secret" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let after = stored_hash(&app, user.id).await;
    assert_ne!(after, before);
    assert_ne!(after, "a brand new secret");
    assert!(verify_password(&after, "a brand new secret").is_ok());

    assert_eq!(
        app.login("alice@example.com", PASSWORD).await.status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        app.login("alice@example.com", "a brand new secret").await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_update_email() {
    let app = TestApp::new().await;
    let user = app.create_user("alice@example.com").await;
    app.create_user("bob@example.com").await;
    let token = token_for(&app, "alice@example.com").await;
    let uri = format!("/api/v1/user/{}", user.id);

    let response = app
        .send(authed_json(
            "PUT",
            &uri,
            &token,
            serde_json::json!({ "email": "alice@new.example.com" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], "alice@new.example.com");

    let response = app
        .send(authed_json(
            "PUT",
            &uri,
            &token,
            serde_json::json!({ "email": "bob@example.com" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .send(authed_json("PUT", &uri, &token, serde_json::json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cannot_modify_other_accounts() {
    let app = TestApp::new().await;
    app.create_user("alice@example.com").await;
    let bob = app.create_user("bob@example.com").await;
    let token = token_for(&app, "alice@example.com").await;
    let uri = format!("/api/v1/user/{}", bob.id);

    let response = app
        .send(authed_json(
            "PUT",
            &uri,
            &token,
            serde_json::json!({ "password": "hijacked" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.send(with_bearer("DELETE", &uri, &token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert!(app.db.users().get_by_id(bob.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_own_account() {
    let app = TestApp::new().await;
    let user = app.create_user("alice@example.com").await;
    let token = token_for(&app, "alice@example.com").await;

    let response = app
        .send(with_bearer("DELETE", &format!("/api/v1/user/{}", user.id), &token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["message"].is_string());

    assert!(app.db.users().get_by_id(user.id).await.unwrap().is_none());
    // Refresh tokens go with the account
    assert!(
        app.db
            .refresh_tokens()
            .list_by_user(user.id)
            .await
            .unwrap()
            .is_empty()
    );

    // And the still-unexpired access token no longer resolves
    let response = app.send(with_bearer("GET", "/api/v1/auth/me", &token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
