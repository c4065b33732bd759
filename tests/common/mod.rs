#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use serde_json::Value;
use tokengate::{
    ServerConfig,
    cli::{ClientIpHeader, IpExtractor},
    create_app,
    db::{Database, User},
    jwt::TokenIssuer,
};
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";
pub const CLIENT_IP: &str = "203.0.113.10";
pub const PASSWORD: &str = "correct horse battery staple";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub issuer: TokenIssuer,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_rotation(false).await
    }

    pub async fn with_rotation(rotate_refresh_tokens: bool) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let config = ServerConfig {
            db: db.clone(),
            jwt_secret: JWT_SECRET.to_vec(),
            secure_cookies: false,
            ip_extractor: Some(IpExtractor::from(ClientIpHeader::XForwardedFor)),
            rotate_refresh_tokens,
        };
        Self {
            app: create_app(&config),
            db,
            issuer: TokenIssuer::new(JWT_SECRET),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn create_user(&self, email: &str) -> User {
        self.db.users().create(email, PASSWORD).await.unwrap()
    }

    pub async fn login(&self, email: &str, password: &str) -> Response<Body> {
        self.send(json_request(
            "POST",
            "/api/v1/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        ))
        .await
    }
}

/// A request builder with the client address header already set.
pub fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    request(method, uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn with_cookies(method: &str, uri: &str, cookies: &str) -> Request<Body> {
    request(method, uri)
        .header(header::COOKIE, cookies)
        .body(Body::empty())
        .unwrap()
}

pub fn with_bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
    request(method, uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Extract Set-Cookie headers from response
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a cookie being set (not cleared) by the response.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .filter(|c| !c.contains("Max-Age=0"))
        .find_map(|c| c.strip_prefix(&prefix))
        .and_then(|rest| rest.split(';').next())
        .map(str::to_string)
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    let prefix = format!("{}=;", name);
    cookies
        .iter()
        .any(|c| c.starts_with(&prefix) && c.contains("Max-Age=0"))
}

pub async fn assert_denied(response: Response<Body>, reason: &str) {
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], reason);
}

pub fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
