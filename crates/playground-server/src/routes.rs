use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Router, middleware};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa_swagger_ui::SwaggerUi;

use playground_core::git::{DEFAULT_COMMIT_MESSAGE, FileCommit, NewRepository, validate_repository_name};
use playground_core::models::QueryInput;
use playground_core::{GitHost, Principal};

use crate::auth::{require_user, resolve_principal};
use crate::dto::{
    AuthStatusResponse, CommitFileQuery, CommitResponse, CreateRepositoryQuery, HealthResponse,
    HistoryEntryResponse, HistoryQuery, HistoryResponse, ProfileResponse, QueryRequest,
    QueryResponse, RepositoryResponse, SaveToGitQuery, SchemaResponse, TableResponse,
};
use crate::error::{ApiError, status_for};
use crate::state::AppState;
use crate::{oauth, web};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const AUTH_PROVIDER: &str = "GitHub OAuth2";

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/v1/auth/profile", get(profile))
        .route(
            "/api/v1/auth/repositories",
            get(list_repositories).post(create_repository),
        )
        .route(
            "/api/v1/auth/repositories/{owner}/{repo}/files",
            post(commit_file),
        )
        .route("/api/v1/sql/execute", post(execute_query))
        .route("/api/v1/sql/validate", post(validate_query))
        .route("/api/v1/sql/history", get(query_history))
        .route("/api/v1/sql/schema", get(schema))
        .route("/api/v1/sql/save-to-git", post(save_to_git))
        .route("/api/v1/sql/reset", post(reset_sandbox))
        .layer(middleware::from_fn_with_state(state.clone(), require_user));

    let public = Router::new()
        .route("/", get(web::home))
        .route("/login", get(web::login_page))
        .route("/swagger-ui.html", get(web::swagger_redirect))
        .route("/oauth2/authorization/github", get(oauth::authorize))
        .route("/login/oauth2/code/github", get(oauth::callback))
        .route("/logout", get(oauth::logout).post(oauth::logout))
        .route("/health", get(health))
        .route("/api/v1/auth/status", get(auth_status))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", state.openapi.clone()));

    public
        .merge(api)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// SQL Playground
// ---------------------------------------------------------------------------

/// Execute a SQL query in the caller's sandbox.
#[utoipa::path(
    post,
    path = "/api/v1/sql/execute",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Query executed", body = QueryResponse),
        (status = 400, description = "Invalid request or failed query", body = QueryResponse),
        (status = 401, description = "Unauthorized", body = crate::dto::ErrorResponse),
        (status = 408, description = "Query timed out", body = QueryResponse),
    ),
    tag = "SQL Playground"
)]
pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    axum::Json(body): axum::Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let input = QueryInput::from(body);

    match state.queries.execute(&principal.login, &input).await {
        Ok(outcome) => {
            Ok(axum::Json(QueryResponse::executed(&principal.login, outcome)).into_response())
        }
        Err(e) if e.is_query_failure() => {
            Ok((status_for(&e), axum::Json(QueryResponse::failed(&e))).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Check that a query would prepare, without running it.
#[utoipa::path(
    post,
    path = "/api/v1/sql/validate",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Validation result; `success` is false for invalid SQL", body = QueryResponse),
        (status = 400, description = "Invalid request", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::dto::ErrorResponse),
    ),
    tag = "SQL Playground"
)]
pub async fn validate_query(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    axum::Json(body): axum::Json<QueryRequest>,
) -> Result<axum::Json<QueryResponse>, ApiError> {
    let input = QueryInput::from(body);

    match state.queries.validate(&principal.login, &input).await {
        Ok(outcome) => Ok(axum::Json(QueryResponse::validated(outcome))),
        Err(e) if e.is_query_failure() => Ok(axum::Json(QueryResponse::failed(&e))),
        Err(e) => Err(e.into()),
    }
}

/// Most recent queries of the caller, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/sql/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Query history", body = HistoryResponse),
        (status = 401, description = "Unauthorized", body = crate::dto::ErrorResponse),
    ),
    tag = "SQL Playground"
)]
pub async fn query_history(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.queries.history(&principal.login, query.limit).await?;
    let total = state.db.history_repo().count(&principal.login).await?;

    let response = HistoryResponse {
        queries: entries.into_iter().map(HistoryEntryResponse::from).collect(),
        total,
    };

    Ok(axum::Json(response))
}

/// Tables and views in the caller's sandbox.
#[utoipa::path(
    get,
    path = "/api/v1/sql/schema",
    responses(
        (status = 200, description = "Sandbox schema", body = SchemaResponse),
        (status = 401, description = "Unauthorized", body = crate::dto::ErrorResponse),
    ),
    tag = "SQL Playground"
)]
pub async fn schema(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let tables = state.queries.schema(&principal.login).await?;

    let response = SchemaResponse {
        message: format!("Database schema information for user: {}", principal.login),
        user: principal.login,
        tables: tables.into_iter().map(TableResponse::from).collect(),
    };

    Ok(axum::Json(response))
}

/// Commit a query as a `.sql` file to one of the caller's repositories.
#[utoipa::path(
    post,
    path = "/api/v1/sql/save-to-git",
    params(SaveToGitQuery),
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Query committed", body = CommitResponse),
        (status = 400, description = "Invalid request", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::dto::ErrorResponse),
        (status = 404, description = "Repository not found", body = crate::dto::ErrorResponse),
    ),
    tag = "SQL Playground"
)]
pub async fn save_to_git(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<SaveToGitQuery>,
    axum::Json(body): axum::Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = QueryInput::from(body);
    let result = state
        .archiver
        .save(
            &principal,
            &query.repository,
            query.file_name.as_deref(),
            &input,
        )
        .await?;

    Ok(axum::Json(CommitResponse::from(result)))
}

/// Discard the caller's sandbox; the next query starts from the seed data.
#[utoipa::path(
    post,
    path = "/api/v1/sql/reset",
    responses(
        (status = 204, description = "Sandbox reset"),
        (status = 401, description = "Unauthorized", body = crate::dto::ErrorResponse),
    ),
    tag = "SQL Playground"
)]
pub async fn reset_sandbox(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<StatusCode, ApiError> {
    state.queries.reset(&principal.login).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Authentication & Git Integration
// ---------------------------------------------------------------------------

/// Whether the request carries a valid login.
#[utoipa::path(
    get,
    path = "/api/v1/auth/status",
    responses(
        (status = 200, description = "Authentication status", body = AuthStatusResponse),
    ),
    security(()),
    tag = "Authentication & Git Integration"
)]
pub async fn auth_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> axum::Json<AuthStatusResponse> {
    let principal = match resolve_principal(&state, &headers).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::debug!(error = %e, "Treating request as anonymous");
            None
        }
    };

    axum::Json(AuthStatusResponse {
        authenticated: principal.is_some(),
        user: principal
            .map(|p| p.login)
            .unwrap_or_else(|| "anonymous".to_string()),
        provider: AUTH_PROVIDER.to_string(),
    })
}

/// GitHub profile of the logged-in user.
#[utoipa::path(
    get,
    path = "/api/v1/auth/profile",
    responses(
        (status = 200, description = "User profile", body = ProfileResponse),
        (status = 401, description = "Unauthorized", body = crate::dto::ErrorResponse),
    ),
    tag = "Authentication & Git Integration"
)]
pub async fn profile(Extension(principal): Extension<Principal>) -> axum::Json<ProfileResponse> {
    axum::Json(ProfileResponse {
        login: principal.login,
        email: principal
            .email
            .unwrap_or_else(|| "not provided".to_string()),
        avatar_url: principal.avatar_url.unwrap_or_default(),
        authenticated: true,
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/repositories",
    responses(
        (status = 200, description = "Repositories of the user", body = Vec<RepositoryResponse>),
        (status = 401, description = "Unauthorized", body = crate::dto::ErrorResponse),
        (status = 502, description = "GitHub unavailable", body = crate::dto::ErrorResponse),
    ),
    tag = "Authentication & Git Integration"
)]
pub async fn list_repositories(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let repositories = state
        .github
        .list_repositories(&principal.access_token)
        .await?;

    let response: Vec<RepositoryResponse> = repositories
        .into_iter()
        .map(RepositoryResponse::from)
        .collect();

    Ok(axum::Json(response))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/repositories",
    params(CreateRepositoryQuery),
    responses(
        (status = 201, description = "Repository created", body = RepositoryResponse),
        (status = 400, description = "Invalid repository name", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::dto::ErrorResponse),
    ),
    tag = "Authentication & Git Integration"
)]
pub async fn create_repository(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<CreateRepositoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_repository_name(&query.name)?;

    let repository = state
        .github
        .create_repository(
            &principal.access_token,
            &NewRepository::new(query.name, query.description),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        axum::Json(RepositoryResponse::from(repository)),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/repositories/{owner}/{repo}/files",
    params(
        ("owner" = String, Path, description = "Repository owner"),
        ("repo" = String, Path, description = "Repository name"),
        CommitFileQuery,
    ),
    responses(
        (status = 200, description = "File committed", body = CommitResponse),
        (status = 400, description = "Invalid path", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::dto::ErrorResponse),
        (status = 404, description = "Repository not found", body = crate::dto::ErrorResponse),
    ),
    tag = "Authentication & Git Integration"
)]
pub async fn commit_file(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<CommitFileQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let message = query
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string());
    let commit = FileCommit::new(owner, repo, query.path, query.content).with_message(message);

    let result = state
        .github
        .commit_file(&principal.access_token, &commit)
        .await?;

    Ok(axum::Json(CommitResponse::from(result)))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    security(()),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(HealthResponse {
                status: "healthy".to_string(),
                database: "ok".to_string(),
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                axum::Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    database: "error".to_string(),
                }),
            )
        }
    }
}
