//! GitHub OAuth2 login: authorization redirect, callback and logout.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Redirect, Response};
use uuid::Uuid;

use playground_core::error::AppError;
use playground_core::{GitHost, Principal};

use crate::auth::{expired_session_cookie, session_cookie, session_id};
use crate::dto::OAuthCallbackQuery;
use crate::state::AppState;

pub const LOGIN_ERROR_PATH: &str = "/login?error=true";
pub const AFTER_LOGIN_PATH: &str = "/swagger-ui/";

/// Start a login: remember a fresh `state` and send the browser to GitHub.
pub async fn authorize(State(state): State<Arc<AppState>>) -> Response {
    let login_state = Uuid::new_v4().simple().to_string();

    match state.github.authorize_url(&login_state) {
        Ok(url) => {
            state.oauth_states.insert(login_state, ()).await;
            Redirect::to(&url).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Cannot build GitHub authorization URL");
            Redirect::to(LOGIN_ERROR_PATH).into_response()
        }
    }
}

/// GitHub redirects back here with `code` and `state`.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    match complete_login(&state, query).await {
        Ok(session) => {
            tracing::info!(user = %session.login, "User logged in");
            with_cookie(
                Redirect::to(AFTER_LOGIN_PATH),
                &session_cookie(&session.id, state.session_ttl, state.cookie_secure),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "GitHub login failed");
            Redirect::to(LOGIN_ERROR_PATH).into_response()
        }
    }
}

struct NewSession {
    id: String,
    login: String,
}

async fn complete_login(
    state: &AppState,
    query: OAuthCallbackQuery,
) -> Result<NewSession, AppError> {
    if let Some(error) = query.error {
        return Err(AppError::Unauthorized(format!(
            "GitHub denied authorization: {error}"
        )));
    }

    let login_state = query
        .state
        .ok_or_else(|| AppError::Unauthorized("Missing OAuth state".into()))?;
    if state.oauth_states.remove(&login_state).await.is_none() {
        return Err(AppError::Unauthorized(
            "Unknown or expired OAuth state".into(),
        ));
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization code".into()))?;

    let access_token = state.github.exchange_code(&code).await?;
    let user = state.github.get_user(&access_token).await?;

    let principal = Principal {
        login: user.login,
        email: user.email,
        avatar_url: user.avatar_url,
        access_token,
    };
    let id = state
        .db
        .session_repo()
        .create(&principal, state.session_ttl)
        .await?;

    Ok(NewSession {
        id,
        login: principal.login,
    })
}

/// End the session (if any) and clear the cookie.
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        match state.db.session_repo().delete(id).await {
            Ok(true) => tracing::info!("User logged out"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to delete session"),
        }
    }

    with_cookie(Redirect::to("/"), &expired_session_cookie(state.cookie_secure))
}

fn with_cookie(redirect: Redirect, cookie: &str) -> Response {
    let mut response = redirect.into_response();
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().insert(SET_COOKIE, value);
    }
    response
}
