use thiserror::Error;

/// Application-wide error types for SQL Playground.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request payload failed validation before any SQL was touched.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Statement could not be prepared (syntax or unknown objects).
    #[error("SQL syntax error: {0}")]
    SqlSyntaxError(String),

    /// Statement kind is not allowed inside the sandbox.
    #[error("Statement not allowed: {0}")]
    ForbiddenStatement(String),

    /// Query parameters are malformed or do not match the statement.
    #[error("Parameter error: {0}")]
    ParameterError(String),

    /// Query execution exceeded its deadline.
    #[error("Query timed out after {0} seconds")]
    Timeout(u64),

    /// Statement prepared fine but failed while running.
    #[error("SQL execution error: {0}")]
    SqlExecutionError(String),

    /// Missing or invalid credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// GitHub API answered with a non-success status.
    #[error("GitHub API error (HTTP {status}): {message}")]
    GitHubError { status: u16, message: String },

    /// Outbound HTTP request failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Stable error code reported to clients for failed queries.
    pub fn sql_error_code(&self) -> Option<&'static str> {
        match self {
            AppError::SqlSyntaxError(_) => Some("SQL001"),
            AppError::ForbiddenStatement(_) => Some("SQL002"),
            AppError::ParameterError(_) => Some("SQL003"),
            AppError::Timeout(_) => Some("SQL004"),
            AppError::SqlExecutionError(_) => Some("SQL005"),
            _ => None,
        }
    }

    /// Returns true if the error describes a failed query rather than a
    /// failed request or infrastructure problem.
    pub fn is_query_failure(&self) -> bool {
        self.sql_error_code().is_some()
    }
}
