//! GitHub-facing domain types and the naming rules checked before any
//! request leaves the service.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_REPOSITORY_DESCRIPTION: &str = "SQL Playground Repository";
pub const DEFAULT_COMMIT_MESSAGE: &str = "Add file from SQL Playground";
pub const DEFAULT_BRANCH: &str = "main";

const MAX_REPOSITORY_NAME: usize = 100;
const MAX_FILE_PATH: usize = 255;

/// A GitHub account as returned by `GET /user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitUser {
    pub login: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub name: Option<String>,
}

/// The subset of a GitHub repository the playground exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// Parameters for creating a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub private: bool,
    pub auto_init: bool,
}

impl NewRepository {
    /// Public, auto-initialised repository, as the playground creates them.
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            description: description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REPOSITORY_DESCRIPTION.to_string()),
            private: false,
            auto_init: true,
        }
    }
}

/// A single file written to a repository in one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommit {
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub content: String,
    pub message: String,
    pub branch: String,
}

impl FileCommit {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            path: path.into(),
            content: content.into(),
            message: DEFAULT_COMMIT_MESSAGE.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Check owner, repository and path before calling GitHub.
    pub fn validate(&self) -> Result<(), AppError> {
        validate_repository_name(&self.owner)
            .map_err(|_| AppError::ValidationError(format!("Invalid owner: '{}'", self.owner)))?;
        validate_repository_name(&self.repo)?;
        validate_file_path(&self.path)?;
        if self.message.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Commit message cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a file commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitResult {
    pub path: String,
    /// Blob SHA of the written file.
    pub sha: String,
    pub html_url: Option<String>,
    pub commit_sha: String,
}

/// GitHub repository names: 1-100 characters of `[A-Za-z0-9._-]`,
/// excluding `.` and `..`.
pub fn validate_repository_name(name: &str) -> Result<(), AppError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_REPOSITORY_NAME
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "Invalid repository name: '{name}'"
        )))
    }
}

/// File paths must be relative, without empty or `..` segments.
pub fn validate_file_path(path: &str) -> Result<(), AppError> {
    let invalid = |reason: &str| {
        Err(AppError::ValidationError(format!(
            "Invalid file path '{path}': {reason}"
        )))
    };

    if path.trim().is_empty() {
        return invalid("path is empty");
    }
    if path.len() > MAX_FILE_PATH {
        return invalid("path is too long");
    }
    if path.starts_with('/') {
        return invalid("path must be relative");
    }
    if path.contains('\\') {
        return invalid("use '/' as separator");
    }
    if path.split('/').any(|segment| segment.is_empty() || segment == "..") {
        return invalid("empty or '..' segments are not allowed");
    }
    Ok(())
}
