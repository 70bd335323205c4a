//! Admission control through the router.

use axum::http::{header, StatusCode};
use serde_json::json;

mod common;
use common::{body_json, request, send};

#[tokio::test]
async fn test_eleventh_session_call_is_throttled() {
    let app = common::app();
    common::register(&app, "ada@example.com").await;
    let cookies = common::login(&app, "ada@example.com").await;
    let access = cookies["nl_access"].as_str();

    for i in 0..10 {
        let response = send(
            &app,
            request("GET", "/api/v1/auth/session", None, &[("nl_access", access)]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK, "call {}", i + 1);
        let headers = response.headers();
        assert_eq!(headers["x-ratelimit-limit"], "10");
        assert_eq!(headers["x-ratelimit-remaining"], (9 - i).to_string().as_str());
        assert!(headers.get("x-ratelimit-reset").is_some());
        assert!(headers.get(header::RETRY_AFTER).is_none());
    }

    let response = send(
        &app,
        request("GET", "/api/v1/auth/session", None, &[("nl_access", access)]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let headers = response.headers();
    assert_eq!(headers[header::RETRY_AFTER], "900");
    assert_eq!(headers["x-ratelimit-remaining"], "0");

    let reset: i64 = headers["x-ratelimit-reset"].to_str().unwrap().parse().unwrap();
    let now = chrono::Utc::now().timestamp();
    assert!((now + 890..=now + 910).contains(&reset), "reset {reset} vs now {now}");

    assert_eq!(body_json(response).await, json!({ "message": "rate limit exceeded" }));
}

#[tokio::test]
async fn test_user_budgets_are_independent() {
    let app = common::app();
    let first = common::register(&app, "first@example.com").await;
    let second = common::register(&app, "second@example.com").await;

    for _ in 0..10 {
        let response = send(
            &app,
            request("GET", "/api/v1/auth/session", None, &[("nl_access", first["nl_access"].as_str())]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let throttled = send(
        &app,
        request("GET", "/api/v1/auth/session", None, &[("nl_access", first["nl_access"].as_str())]),
    )
    .await;
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);

    // Same address, different user: own bucket.
    let other = send(
        &app,
        request("GET", "/api/v1/auth/session", None, &[("nl_access", second["nl_access"].as_str())]),
    )
    .await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_is_limited_per_forwarded_address() {
    let app = common::app();

    let attempt = |ip: &'static str| {
        let mut req = request(
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": "nobody@example.com", "password": "whatever-it-is" })),
            &[],
        );
        req.headers_mut()
            .insert("x-forwarded-for", format!("{ip}, 10.0.0.1").parse().unwrap());
        req
    };

    // Failed logins still spend the budget.
    for _ in 0..10 {
        let response = send(&app, attempt("203.0.113.5")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let blocked = send(&app, attempt("203.0.113.5")).await;
    assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(blocked.headers()[header::RETRY_AFTER], "900");

    let elsewhere = send(&app, attempt("198.51.100.8")).await;
    assert_eq!(elsewhere.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rejected_auth_never_reaches_admission() {
    let app = common::app();

    // Anonymous calls to a protected route are refused before any bucket
    // is spent, so they carry no quota headers.
    for _ in 0..15 {
        let response = send(&app, request("GET", "/api/v1/auth/session", None, &[])).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn test_disabled_limiter_sets_no_headers() {
    let mut config = common::test_config();
    config.rate_limit.enabled = false;
    let app = common::build_server(config).router();

    for _ in 0..12 {
        let response = send(&app, request("POST", "/api/v1/auth/refresh", None, &[])).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}
