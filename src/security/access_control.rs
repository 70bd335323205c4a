//! Authentication middleware.
//!
//! Resolves the caller of a protected route from its access token, checks the
//! session behind it and attaches an [`AuthContext`] to the request.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRef, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    extract::CookieJar,
    headers::{authorization::Bearer, Authorization, HeaderMapExt},
};

use crate::error::AuthFailure;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::session::{AuthContext, SessionManager};

/// State required for access control.
#[derive(Clone)]
pub struct AccessControlState {
    pub sessions: Arc<SessionManager>,
    /// Name of the access-token cookie.
    pub access_cookie: Arc<str>,
}

impl FromRef<AppState> for AccessControlState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            sessions: state.sessions.clone(),
            access_cookie: state.cookies.access_name(),
        }
    }
}

/// Cookie first; `Authorization: Bearer` for clients without a cookie jar.
fn access_token(jar: &CookieJar, name: &str, request: &Request<Body>) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .or_else(|| {
            request
                .headers()
                .typed_get::<Authorization<Bearer>>()
                .map(|auth| auth.token().to_string())
        })
        .filter(|token| !token.trim().is_empty())
}

pub async fn access_control_middleware(
    State(state): State<AccessControlState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = access_token(&jar, &state.access_cookie, &req) else {
        metrics::record_auth_failure(AuthFailure::MissingToken.as_str());
        tracing::debug!(path = %req.uri().path(), "Request without access token");
        return ApiError::Unauthorized(AuthFailure::MissingToken).into_response();
    };

    match state.sessions.authorize(&token).await {
        Ok(ctx) => {
            req.extensions_mut().insert::<AuthContext>(ctx);
            next.run(req).await
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
