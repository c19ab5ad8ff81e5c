use std::future::Future;

use uuid::Uuid;

use crate::error::AppError;
use crate::git::{CommitResult, FileCommit, GitUser, NewRepository, Repository};
use crate::models::{
    HistoryEntry, NewHistoryEntry, PreparedQuery, QueryOutcome, TableInfo, ValidationOutcome,
};

/// Runs SQL inside per-user sandboxes.
///
/// `owner` identifies the sandbox; two owners never observe each other's data.
pub trait QueryEngine: Send + Sync + Clone {
    /// Execute an analysed statement under its limits.
    fn execute(
        &self,
        owner: &str,
        query: &PreparedQuery,
    ) -> impl Future<Output = Result<QueryOutcome, AppError>> + Send;

    /// Prepare a statement without running it.
    fn validate(
        &self,
        owner: &str,
        statement: &str,
    ) -> impl Future<Output = Result<ValidationOutcome, AppError>> + Send;

    /// List tables and views with their columns.
    fn describe_schema(
        &self,
        owner: &str,
    ) -> impl Future<Output = Result<Vec<TableInfo>, AppError>> + Send;

    /// Throw away the owner's sandbox. The next access starts from the seed data.
    fn reset(&self, owner: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Persists and retrieves query history.
pub trait HistoryStore: Send + Sync + Clone {
    /// Save a new entry. Returns the generated UUID.
    fn record(
        &self,
        entry: &NewHistoryEntry,
    ) -> impl Future<Output = Result<Uuid, AppError>> + Send;

    /// Most recent entries for a user, newest first.
    fn recent(
        &self,
        user_login: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HistoryEntry>, AppError>> + Send;
}

/// Repository hosting used for profiles and saving queries.
pub trait GitHost: Send + Sync + Clone {
    fn get_user(&self, token: &str) -> impl Future<Output = Result<GitUser, AppError>> + Send;

    fn list_repositories(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Vec<Repository>, AppError>> + Send;

    fn create_repository(
        &self,
        token: &str,
        repository: &NewRepository,
    ) -> impl Future<Output = Result<Repository, AppError>> + Send;

    /// Create or update a single file.
    fn commit_file(
        &self,
        token: &str,
        commit: &FileCommit,
    ) -> impl Future<Output = Result<CommitResult, AppError>> + Send;
}

/// A no-op HistoryStore for use when history is not kept.
#[derive(Debug, Clone)]
pub struct NullHistory;

impl HistoryStore for NullHistory {
    async fn record(&self, _entry: &NewHistoryEntry) -> Result<Uuid, AppError> {
        Ok(Uuid::nil())
    }

    async fn recent(&self, _user_login: &str, _limit: usize) -> Result<Vec<HistoryEntry>, AppError> {
        Ok(vec![])
    }
}
