//! Saving playground queries to a Git repository.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::AppError;
use crate::git::{CommitResult, FileCommit};
use crate::models::{Principal, QueryInput};
use crate::traits::GitHost;

pub const DEFAULT_FILE_NAME: &str = "query.sql";

/// Render a query as a `.sql` file with a comment header describing how it was run.
pub fn render_saved_query(login: &str, at: DateTime<Utc>, input: &QueryInput) -> String {
    let parameters = input
        .parameters
        .as_ref()
        .filter(|p| !p.is_empty())
        .and_then(|p| serde_json::to_string(p).ok())
        .unwrap_or_else(|| "none".to_string());
    let timeout = input
        .timeout
        .map(|t| t.to_string())
        .unwrap_or_else(|| "default".to_string());
    let limit = input
        .limit
        .map(|l| l.to_string())
        .unwrap_or_else(|| "unlimited".to_string());

    format!(
        "-- Query executed by {login} at {}\n\
         -- Parameters: {parameters}\n\
         -- Timeout: {timeout} seconds\n\
         -- Limit: {limit} rows\n\
         \n\
         {}\n",
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        input.query.trim_end()
    )
}

/// Commits queries into the caller's own repositories.
pub struct QueryArchiver<G: GitHost> {
    host: G,
}

impl<G: GitHost> QueryArchiver<G> {
    pub fn new(host: G) -> Self {
        Self { host }
    }

    /// Save `input` as `file_name` (default `query.sql`) in
    /// `{principal.login}/{repository}`.
    pub async fn save(
        &self,
        principal: &Principal,
        repository: &str,
        file_name: Option<&str>,
        input: &QueryInput,
    ) -> Result<CommitResult, AppError> {
        input.validate()?;

        let file_name = file_name
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME);

        let content = render_saved_query(&principal.login, Utc::now(), input);
        let commit = FileCommit::new(&principal.login, repository, file_name, content)
            .with_message(format!("Add SQL query from playground: {file_name}"));
        commit.validate()?;

        let result = self
            .host
            .commit_file(&principal.access_token, &commit)
            .await?;

        tracing::info!(
            user = %principal.login,
            repository = %repository,
            path = %result.path,
            commit = %result.commit_sha,
            "Saved query to repository"
        );

        Ok(result)
    }
}
