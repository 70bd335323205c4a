//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use session_gate::config::{GatewayConfig, LimitStrategy, PasswordHashConfig, RoutePolicyConfig};
use session_gate::session::{MemorySessionStore, MemoryUserStore, UserStore};
use session_gate::{AdmissionController, GatewayServer, SessionManager};

pub const TEST_SECRET: &str = "integration-test-secret-0123456789";
pub const PASSWORD: &str = "correct horse battery";

/// Defaults with a cheap password hash and `GET /api/v1/auth/session`
/// limited to 10 per 15 minutes.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.jwt_secret = TEST_SECRET.to_string();
    config.auth.password_hash = PasswordHashConfig {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    };

    config
        .rate_limit
        .policies
        .retain(|p| !(p.method == "GET" && p.path == "/api/v1/auth/session"));
    config.rate_limit.policies.push(RoutePolicyConfig {
        method: "GET".into(),
        path: "/api/v1/auth/session".into(),
        limit: 10,
        window_secs: 15 * 60,
        burst: None,
        strategy: LimitStrategy::User,
    });
    config
}

/// Server over in-memory stores.
pub fn build_server(config: GatewayConfig) -> GatewayServer {
    build_server_with_users(config, Arc::new(MemoryUserStore::new()))
}

/// Server over an in-memory session store and the given user store.
pub fn build_server_with_users(config: GatewayConfig, users: Arc<dyn UserStore>) -> GatewayServer {
    let sessions = SessionManager::new(
        &config.auth,
        Duration::from_secs(config.timeouts.store_secs),
        Arc::new(MemorySessionStore::new()),
        users,
    )
    .expect("session manager");
    let admission = AdmissionController::new(&config.rate_limit).expect("policy table");
    GatewayServer::new(config, Arc::new(sessions), Arc::new(admission))
}

pub fn app() -> Router {
    build_server(test_config()).router()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("router is infallible")
}

/// Build a request with an optional JSON body and `Cookie` header.
pub fn request(method: &str, uri: &str, body: Option<Value>, cookies: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if !cookies.is_empty() {
        let header_value = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        builder = builder.header(header::COOKIE, header_value);
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// `name -> value` for every `Set-Cookie` on the response.
pub fn set_cookies(response: &Response<Body>) -> HashMap<String, String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Raw `Set-Cookie` line for `name`.
pub fn set_cookie_line(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Register `email` and return the issued cookies.
pub async fn register(app: &Router, email: &str) -> HashMap<String, String> {
    let response = send(
        app,
        request(
            "POST",
            "/api/v1/auth/register",
            Some(serde_json::json!({ "name": "Test User", "email": email, "password": PASSWORD })),
            &[],
        ),
    )
    .await;
    assert_eq!(response.status(), 201, "registration failed");
    set_cookies(&response)
}

/// Log in and return the issued cookies.
pub async fn login(app: &Router, email: &str) -> HashMap<String, String> {
    let response = send(
        app,
        request(
            "POST",
            "/api/v1/auth/login",
            Some(serde_json::json!({ "email": email, "password": PASSWORD })),
            &[],
        ),
    )
    .await;
    assert_eq!(response.status(), 200, "login failed");
    set_cookies(&response)
}
