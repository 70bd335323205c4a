//! Authentication endpoints.
//!
//! Tokens travel only in cookies; response bodies carry the session snapshot.

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::{CookieJar, WithRejection};
use serde::{Deserialize, Serialize};

use crate::error::{AuthFailure, SessionError};
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::session::{AuthContext, AuthSnapshot};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: AuthSnapshot,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<(StatusCode, CookieJar, Json<SessionResponse>), ApiError> {
    let snapshot = state
        .sessions
        .register_user(&req.name, &req.email, &req.password)
        .await?;
    let creds = state.sessions.issue_credentials(&snapshot.user.id).await?;

    let jar = state.cookies.set_credentials(
        jar,
        &creds.access.token,
        &creds.refresh_secret,
        creds.refresh_expires_at,
    );
    Ok((
        StatusCode::CREATED,
        jar,
        Json(SessionResponse { session: snapshot }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let snapshot = state
        .sessions
        .authenticate_user(&req.email, &req.password)
        .await?;
    let creds = state.sessions.issue_credentials(&snapshot.user.id).await?;

    tracing::info!(user_id = %snapshot.user.id, session_id = %creds.session_id, "User logged in");
    let jar = state.cookies.set_credentials(
        jar,
        &creds.access.token,
        &creds.refresh_secret,
        creds.refresh_expires_at,
    );
    Ok((jar, Json(SessionResponse { session: snapshot })))
}

/// Once `refresh_session` succeeds the presented secret is dead, so every
/// later outcome, failures included, carries the rotated refresh cookie.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionResponse>), (CookieJar, ApiError)> {
    let secret = jar
        .get(&state.cookies.refresh_name())
        .map(|c| c.value().to_string())
        .filter(|v| !v.trim().is_empty());
    let Some(secret) = secret else {
        return Err((jar, ApiError::RefreshRequired));
    };

    // Whatever was wrong with the secret, the client must log in again.
    let rotated = match state.sessions.refresh_session(&secret).await {
        Ok(rotated) => rotated,
        Err(SessionError::Unauthenticated(_)) => {
            return Err((jar, ApiError::Unauthorized(AuthFailure::InvalidRefreshToken)))
        }
        Err(e) => return Err((jar, e.into())),
    };

    let jar = jar.add(
        state
            .cookies
            .refresh(&rotated.refresh_secret, rotated.expires_at),
    );
    let access = match state
        .sessions
        .sign_access_token(&rotated.user_id, &rotated.session_id)
    {
        Ok(access) => access,
        Err(e) => return Err((jar, e.into())),
    };
    let jar = jar.add(state.cookies.access(&access.token));

    match state.sessions.auth_snapshot(&rotated.user_id).await {
        Ok(snapshot) => Ok((jar, Json(SessionResponse { session: snapshot }))),
        Err(e) => {
            tracing::warn!(session_id = %rotated.session_id, "Session rotated but snapshot failed");
            Err((jar, e.into()))
        }
    }
}

pub async fn logout(
    State(state): State<AppState>,
    ctx: AuthContext,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    state.sessions.revoke_session(&ctx.session_id).await?;

    tracing::info!(user_id = %ctx.user_id, session_id = %ctx.session_id, "User logged out");
    Ok((
        state.cookies.clear_credentials(jar),
        Json(MessageResponse {
            message: "logged out",
        }),
    ))
}

pub async fn session(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<SessionResponse>, ApiError> {
    let snapshot = state.sessions.auth_snapshot(&ctx.user_id).await?;
    Ok(Json(SessionResponse { session: snapshot }))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
