use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use playground_core::error::AppError;
use playground_core::{GitHost, Principal, compute_hash};

use crate::dto::ErrorResponse;
use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "PLAYGROUND_SESSION";

/// Raw session id from the `Cookie` header(s), if present.
pub fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// `Set-Cookie` value for a new session.
pub fn session_cookie(session_id: &str, ttl: chrono::Duration, secure: bool) -> String {
    cookie(session_id, ttl.num_seconds().max(0), secure)
}

/// `Set-Cookie` value that removes the session cookie.
pub fn expired_session_cookie(secure: bool) -> String {
    cookie("", 0, secure)
}

fn cookie(value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Identify the caller from the session cookie, or from a GitHub bearer token.
///
/// Returns `Ok(None)` for anonymous requests. A bearer token GitHub rejects
/// is `Unauthorized`.
pub async fn resolve_principal(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<Principal>, AppError> {
    if let Some(id) = session_id(headers) {
        if let Some(principal) = state.db.session_repo().find(id).await? {
            return Ok(Some(principal));
        }
    }

    match bearer_token(headers) {
        Some(token) => authenticate_token(state, token).await.map(Some),
        None => Ok(None),
    }
}

async fn authenticate_token(state: &AppState, token: &str) -> Result<Principal, AppError> {
    let key = compute_hash(token);
    if let Some(principal) = state.token_cache.get(&key).await {
        return Ok(principal);
    }

    let user = state.github.get_user(token).await.map_err(|e| match e {
        AppError::GitHubError {
            status: 401 | 403, ..
        } => AppError::Unauthorized("Invalid or expired GitHub access token".into()),
        other => other,
    })?;

    let principal = Principal {
        login: user.login,
        email: user.email,
        avatar_url: user.avatar_url,
        access_token: token.to_string(),
    };
    tracing::debug!(user = %principal.login, "Authenticated bearer token");
    state.token_cache.insert(key, principal.clone()).await;

    Ok(principal)
}

/// Middleware that requires a logged-in user and attaches its [`Principal`]
/// to the request extensions.
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match resolve_principal(&state, request.headers()).await {
        Ok(Some(principal)) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Ok(None) => unauthorized(
            "Authentication required. Log in with GitHub or send Authorization: Bearer <token>",
        ),
        Err(AppError::Unauthorized(message)) => unauthorized(&message),
        Err(e) => ApiError(e).into_response(),
    }
}

fn unauthorized(message: &str) -> Response {
    let body = ErrorResponse {
        error: "unauthorized".to_string(),
        message: message.to_string(),
    };
    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}
