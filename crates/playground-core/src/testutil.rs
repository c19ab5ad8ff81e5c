//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::git::{CommitResult, FileCommit, GitUser, NewRepository, Repository};
use crate::models::{
    ColumnInfo, HistoryEntry, NewHistoryEntry, PreparedQuery, Principal, QueryOutcome,
    TableInfo, ValidationOutcome,
};
use crate::sql::StatementKind;
use crate::traits::{GitHost, HistoryStore, QueryEngine};

pub fn test_principal(login: &str) -> Principal {
    Principal {
        login: login.to_string(),
        email: Some(format!("{login}@example.com")),
        avatar_url: None,
        access_token: format!("gho_{login}_token"),
    }
}

// ---------------------------------------------------------------------------
// MockEngine
// ---------------------------------------------------------------------------

/// Mock engine that answers every statement with a single-row result.
#[derive(Clone)]
pub struct MockEngine {
    pub executed: Arc<Mutex<Vec<(String, PreparedQuery)>>>,
    execute_error: Arc<Mutex<Option<AppError>>>,
    parameter_count: usize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            executed: Arc::new(Mutex::new(Vec::new())),
            execute_error: Arc::new(Mutex::new(None)),
            parameter_count: 0,
        }
    }

    /// The next `execute` call fails with `error`.
    pub fn with_execute_error(error: AppError) -> Self {
        let engine = Self::new();
        *engine.execute_error.lock().unwrap() = Some(error);
        engine
    }

    pub fn with_parameter_count(mut self, count: usize) -> Self {
        self.parameter_count = count;
        self
    }
}

impl QueryEngine for MockEngine {
    async fn execute(&self, owner: &str, query: &PreparedQuery) -> Result<QueryOutcome, AppError> {
        if let Some(e) = self.execute_error.lock().unwrap().take() {
            return Err(e);
        }
        self.executed
            .lock()
            .unwrap()
            .push((owner.to_string(), query.clone()));

        let mut row = serde_json::Map::new();
        row.insert("id".into(), serde_json::json!(1));
        Ok(QueryOutcome {
            kind: query.analyzed.kind.clone(),
            columns: vec![ColumnInfo::new("id", "INTEGER")],
            rows: vec![row],
            rows_affected: 1,
            truncated: false,
            execution_time: Duration::from_millis(3),
        })
    }

    async fn validate(&self, _owner: &str, _statement: &str) -> Result<ValidationOutcome, AppError> {
        Ok(ValidationOutcome {
            kind: StatementKind::Query,
            columns: vec![ColumnInfo::new("id", "INTEGER")],
            parameter_count: self.parameter_count,
        })
    }

    async fn describe_schema(&self, _owner: &str) -> Result<Vec<TableInfo>, AppError> {
        Ok(vec![TableInfo {
            name: "users".into(),
            kind: "table".into(),
            columns: vec![ColumnInfo::new("id", "INTEGER").with_nullable(false)],
        }])
    }

    async fn reset(&self, _owner: &str) -> Result<(), AppError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockHistory
// ---------------------------------------------------------------------------

/// Mock history store that records all saved entries.
#[derive(Clone)]
pub struct MockHistory {
    pub recorded: Arc<Mutex<Vec<NewHistoryEntry>>>,
    pub requested_limits: Arc<Mutex<Vec<usize>>>,
    record_error: Arc<Mutex<Option<AppError>>>,
}

impl MockHistory {
    pub fn empty() -> Self {
        Self {
            recorded: Arc::new(Mutex::new(Vec::new())),
            requested_limits: Arc::new(Mutex::new(Vec::new())),
            record_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_record_error(error: AppError) -> Self {
        let store = Self::empty();
        *store.record_error.lock().unwrap() = Some(error);
        store
    }
}

impl HistoryStore for MockHistory {
    async fn record(&self, entry: &NewHistoryEntry) -> Result<Uuid, AppError> {
        if let Some(e) = self.record_error.lock().unwrap().take() {
            return Err(e);
        }
        self.recorded.lock().unwrap().push(entry.clone());
        Ok(Uuid::new_v4())
    }

    async fn recent(&self, user_login: &str, limit: usize) -> Result<Vec<HistoryEntry>, AppError> {
        self.requested_limits.lock().unwrap().push(limit);
        let recorded = self.recorded.lock().unwrap();
        Ok(recorded
            .iter()
            .rev()
            .filter(|e| e.user_login == user_login)
            .take(limit)
            .map(|e| HistoryEntry {
                id: Uuid::new_v4(),
                user_login: e.user_login.clone(),
                query: e.query.clone(),
                parameters: e.parameters.clone(),
                success: e.success,
                message: e.message.clone(),
                error_code: e.error_code.clone(),
                rows_affected: e.rows_affected,
                execution_time_ms: e.execution_time_ms,
                executed_at: Utc::now(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockGitHost
// ---------------------------------------------------------------------------

/// Mock Git host that records commits and created repositories.
#[derive(Clone)]
pub struct MockGitHost {
    pub commits: Arc<Mutex<Vec<(String, FileCommit)>>>,
    pub created: Arc<Mutex<Vec<NewRepository>>>,
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockGitHost {
    pub fn new() -> Self {
        Self {
            commits: Arc::new(Mutex::new(Vec::new())),
            created: Arc::new(Mutex::new(Vec::new())),
            error: Arc::new(Mutex::new(None)),
        }
    }

    /// The next call fails with `error`.
    pub fn with_error(error: AppError) -> Self {
        let host = Self::new();
        *host.error.lock().unwrap() = Some(error);
        host
    }

    fn take_error(&self) -> Result<(), AppError> {
        match self.error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn repository(id: u64, name: &str) -> Repository {
    Repository {
        id,
        name: name.to_string(),
        full_name: format!("octocat/{name}"),
        html_url: format!("https://github.com/octocat/{name}"),
        description: None,
        private: false,
        default_branch: Some("main".into()),
    }
}

impl GitHost for MockGitHost {
    async fn get_user(&self, _token: &str) -> Result<GitUser, AppError> {
        self.take_error()?;
        Ok(GitUser {
            login: "octocat".into(),
            email: Some("octocat@example.com".into()),
            avatar_url: None,
            name: None,
        })
    }

    async fn list_repositories(&self, _token: &str) -> Result<Vec<Repository>, AppError> {
        self.take_error()?;
        Ok(vec![repository(1, "sql-queries")])
    }

    async fn create_repository(
        &self,
        _token: &str,
        new_repository: &NewRepository,
    ) -> Result<Repository, AppError> {
        self.take_error()?;
        self.created.lock().unwrap().push(new_repository.clone());
        Ok(repository(2, &new_repository.name))
    }

    async fn commit_file(&self, token: &str, commit: &FileCommit) -> Result<CommitResult, AppError> {
        self.take_error()?;
        self.commits
            .lock()
            .unwrap()
            .push((token.to_string(), commit.clone()));
        Ok(CommitResult {
            path: commit.path.clone(),
            sha: "blob-sha".into(),
            html_url: None,
            commit_sha: "commit-sha".into(),
        })
    }
}
