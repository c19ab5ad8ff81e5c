use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;
use crate::sql::{AnalyzedQuery, StatementKind, parse_declared_type};

/// Maximum accepted length of a query, in characters.
pub const MAX_QUERY_LENGTH: usize = 10_000;

/// Bind parameters as sent by clients.
///
/// Either a JSON array of positional values, or an object keyed by 1-based
/// position (`{"1": "25", "2": "active"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParameters {
    Positional(Vec<serde_json::Value>),
    Indexed(BTreeMap<String, serde_json::Value>),
}

impl QueryParameters {
    /// Order the parameters by position.
    ///
    /// Indexed keys must be positive integers covering `1..=n` without gaps.
    pub fn into_positional(self) -> Result<Vec<serde_json::Value>, AppError> {
        let indexed = match self {
            QueryParameters::Positional(values) => return Ok(values),
            QueryParameters::Indexed(indexed) => indexed,
        };

        let mut ordered = BTreeMap::new();
        for (key, value) in indexed {
            let position: usize = key
                .trim()
                .parse()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| {
                    AppError::ParameterError(format!(
                        "Parameter keys must be 1-based positions, got '{key}'"
                    ))
                })?;
            if ordered.insert(position, value).is_some() {
                return Err(AppError::ParameterError(format!(
                    "Parameter {position} is given more than once"
                )));
            }
        }

        if let Some((expected, _)) = ordered
            .keys()
            .enumerate()
            .find(|(i, position)| **position != i + 1)
        {
            return Err(AppError::ParameterError(format!(
                "Missing parameter {}",
                expected + 1
            )));
        }

        Ok(ordered.into_values().collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            QueryParameters::Positional(values) => values.is_empty(),
            QueryParameters::Indexed(indexed) => indexed.is_empty(),
        }
    }
}

/// Column metadata for result sets and schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    /// Known for table columns; unknown for computed result columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

impl ColumnInfo {
    /// Build column info from a declared type such as `DECIMAL(10,2)`.
    pub fn new(name: impl Into<String>, declared_type: &str) -> Self {
        let shape = parse_declared_type(declared_type);
        Self {
            name: name.into(),
            data_type: shape.base,
            nullable: None,
            size: shape.size,
            precision: shape.precision,
            scale: shape.scale,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }
}

/// Resource limits applied to sandbox queries.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// Upper bound on rows returned by a single query.
    pub max_rows: usize,
    /// Deadline used when the request does not name one.
    pub default_timeout: Duration,
    /// Requested deadlines are clamped to this.
    pub max_timeout: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_rows: 1000,
            default_timeout: Duration::from_secs(30),
            max_timeout: Duration::from_secs(300),
        }
    }
}

/// A query as submitted by a user, before analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryInput {
    pub query: String,
    pub parameters: Option<QueryParameters>,
    /// Maximum number of rows to return.
    pub limit: Option<u32>,
    /// Timeout in seconds.
    pub timeout: Option<u32>,
}

impl QueryInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Check the payload constraints that do not need the SQL analysed.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.query.trim().is_empty() {
            return Err(AppError::ValidationError("Query cannot be empty".into()));
        }
        if self.query.chars().count() > MAX_QUERY_LENGTH {
            return Err(AppError::ValidationError(format!(
                "Query cannot exceed {MAX_QUERY_LENGTH} characters"
            )));
        }
        if self.limit == Some(0) {
            return Err(AppError::ValidationError("Limit must be at least 1".into()));
        }
        if self.timeout == Some(0) {
            return Err(AppError::ValidationError(
                "Timeout must be at least 1 second".into(),
            ));
        }
        Ok(())
    }
}

/// A query that passed analysis, with limits resolved.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub analyzed: AnalyzedQuery,
    pub parameters: Vec<serde_json::Value>,
    pub limit: usize,
    pub timeout: Duration,
}

/// Result of running a query in a sandbox.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub kind: StatementKind,
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    /// Rows returned for result sets, rows changed otherwise.
    pub rows_affected: u64,
    /// True when more rows were available than the limit allowed.
    pub truncated: bool,
    pub execution_time: Duration,
}

/// Result of preparing a query without running it.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub kind: StatementKind,
    pub columns: Vec<ColumnInfo>,
    pub parameter_count: usize,
}

/// A table or view in a sandbox.
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    /// `table` or `view`.
    pub kind: String,
    pub columns: Vec<ColumnInfo>,
}

/// A recorded query execution.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub user_login: String,
    pub query: String,
    pub parameters: Option<serde_json::Value>,
    pub success: bool,
    pub message: String,
    pub error_code: Option<String>,
    pub rows_affected: Option<u64>,
    pub execution_time_ms: Option<u64>,
    pub executed_at: DateTime<Utc>,
}

/// DTO for inserting a new history entry.
#[derive(Debug, Clone, Serialize)]
pub struct NewHistoryEntry {
    pub user_login: String,
    pub query: String,
    pub parameters: Option<serde_json::Value>,
    pub success: bool,
    pub message: String,
    pub error_code: Option<String>,
    pub rows_affected: Option<u64>,
    pub execution_time_ms: Option<u64>,
}

/// The authenticated GitHub user behind a request.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    pub login: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    /// GitHub OAuth access token used for repository operations.
    pub access_token: String,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("login", &self.login)
            .field("email", &self.email)
            .field("avatar_url", &self.avatar_url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
