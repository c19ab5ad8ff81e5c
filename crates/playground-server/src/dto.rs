use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use playground_core::AppError;
use playground_core::git::{CommitResult, Repository};
use playground_core::models::{
    ColumnInfo, HistoryEntry, QueryInput, QueryOutcome, QueryParameters, TableInfo,
    ValidationOutcome,
};

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

/// SQL query request object.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct QueryRequest {
    /// SQL query string to execute
    #[serde(default)]
    #[schema(example = "SELECT * FROM users WHERE id > ?")]
    pub query: String,
    /// Bind parameters: an array, or an object keyed by 1-based position
    #[schema(value_type = Option<Object>, example = json!({"1": "25"}))]
    pub parameters: Option<QueryParameters>,
    /// Maximum number of rows to return
    #[schema(example = 100)]
    pub limit: Option<u32>,
    /// Query timeout in seconds
    #[schema(example = 30)]
    pub timeout: Option<u32>,
}

impl From<QueryRequest> for QueryInput {
    fn from(request: QueryRequest) -> Self {
        Self {
            query: request.query,
            parameters: request.parameters,
            limit: request.limit,
            timeout: request.timeout,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ColumnInfoResponse {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

impl From<ColumnInfo> for ColumnInfoResponse {
    fn from(column: ColumnInfo) -> Self {
        Self {
            name: column.name,
            data_type: column.data_type,
            nullable: column.nullable,
            size: column.size,
            precision: column.precision,
            scale: column.scale,
        }
    }
}

/// SQL query response object.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub success: bool,
    #[schema(example = "Query executed successfully")]
    pub message: String,
    /// Execution time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub data: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnInfoResponse>>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "SQL001")]
    pub error_code: Option<String>,
    /// True when more rows matched than the limit allowed
    pub truncated: bool,
}

impl QueryResponse {
    pub fn executed(login: &str, outcome: QueryOutcome) -> Self {
        Self {
            success: true,
            message: format!("Query executed successfully by user: {login}"),
            execution_time: Some(outcome.execution_time.as_millis() as u64),
            rows_affected: Some(outcome.rows_affected),
            data: Some(outcome.rows),
            columns: Some(outcome.columns.into_iter().map(Into::into).collect()),
            timestamp: Utc::now(),
            error_code: None,
            truncated: outcome.truncated,
        }
    }

    pub fn validated(outcome: ValidationOutcome) -> Self {
        Self {
            success: true,
            message: "Query syntax is valid".to_string(),
            execution_time: None,
            rows_affected: None,
            data: None,
            columns: Some(outcome.columns.into_iter().map(Into::into).collect()),
            timestamp: Utc::now(),
            error_code: None,
            truncated: false,
        }
    }

    pub fn failed(error: &AppError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            execution_time: None,
            rows_affected: None,
            data: None,
            columns: None,
            timestamp: Utc::now(),
            error_code: error.sql_error_code().map(str::to_string),
            truncated: false,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct HistoryQuery {
    /// Number of entries to return (default 10, max 100)
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryResponse {
    pub id: Uuid,
    pub query: String,
    #[schema(value_type = Option<Object>)]
    pub parameters: Option<serde_json::Value>,
    pub success: bool,
    pub message: String,
    pub error_code: Option<String>,
    pub rows_affected: Option<u64>,
    /// Execution time in milliseconds
    pub execution_time: Option<u64>,
    pub executed_at: DateTime<Utc>,
}

impl From<HistoryEntry> for HistoryEntryResponse {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            id: entry.id,
            query: entry.query,
            parameters: entry.parameters,
            success: entry.success,
            message: entry.message,
            error_code: entry.error_code,
            rows_affected: entry.rows_affected,
            execution_time: entry.execution_time_ms,
            executed_at: entry.executed_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HistoryResponse {
    pub queries: Vec<HistoryEntryResponse>,
    /// All recorded queries of the user
    pub total: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TableResponse {
    pub name: String,
    /// `table` or `view`
    #[serde(rename = "type")]
    pub kind: String,
    pub columns: Vec<ColumnInfoResponse>,
}

impl From<TableInfo> for TableResponse {
    fn from(table: TableInfo) -> Self {
        Self {
            name: table.name,
            kind: table.kind,
            columns: table.columns.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SchemaResponse {
    pub user: String,
    pub tables: Vec<TableResponse>,
    pub message: String,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct SaveToGitQuery {
    /// Repository owned by the caller
    pub repository: String,
    /// Path of the file to write (default `query.sql`)
    pub file_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Authentication & Git
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    #[schema(example = "octocat")]
    pub user: String,
    #[schema(example = "GitHub OAuth2")]
    pub provider: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProfileResponse {
    pub login: String,
    pub email: String,
    pub avatar_url: String,
    pub authenticated: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RepositoryResponse {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    pub description: Option<String>,
    pub private: bool,
    pub default_branch: Option<String>,
}

impl From<Repository> for RepositoryResponse {
    fn from(repository: Repository) -> Self {
        Self {
            id: repository.id,
            name: repository.name,
            full_name: repository.full_name,
            html_url: repository.html_url,
            description: repository.description,
            private: repository.private,
            default_branch: repository.default_branch,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct CreateRepositoryQuery {
    /// Repository name
    pub name: String,
    /// Repository description
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct CommitFileQuery {
    /// File path inside the repository
    pub path: String,
    /// File content
    pub content: String,
    /// Commit message
    pub message: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CommitResponse {
    pub path: String,
    /// Blob SHA of the written file
    pub sha: String,
    pub html_url: Option<String>,
    pub commit_sha: String,
}

impl From<CommitResult> for CommitResponse {
    fn from(result: CommitResult) -> Self {
        Self {
            path: result.path,
            sha: result.sha,
            html_url: result.html_url,
            commit_sha: result.commit_sha,
        }
    }
}

// ---------------------------------------------------------------------------
// Login flow
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginPageQuery {
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
