//! Browser-facing pages.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{Html, Redirect};

use crate::auth::resolve_principal;
use crate::dto::LoginPageQuery;
use crate::oauth::AFTER_LOGIN_PATH;
use crate::state::AppState;

const LOGIN_PAGE: &str = include_str!("../assets/login.html");
const ERROR_MARKER: &str = "<!--ERROR-->";
const ERROR_BANNER: &str =
    r#"<div class="error" role="alert">Sign in with GitHub failed. Please try again.</div>"#;

pub async fn home(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Redirect {
    match resolve_principal(&state, &headers).await {
        Ok(Some(_)) => Redirect::to(AFTER_LOGIN_PATH),
        _ => Redirect::to("/login"),
    }
}

pub async fn login_page(Query(query): Query<LoginPageQuery>) -> Html<String> {
    Html(render_login_page(query.error.is_some()))
}

pub async fn swagger_redirect() -> Redirect {
    Redirect::permanent(AFTER_LOGIN_PATH)
}

fn render_login_page(failed: bool) -> String {
    LOGIN_PAGE.replace(ERROR_MARKER, if failed { ERROR_BANNER } else { "" })
}
