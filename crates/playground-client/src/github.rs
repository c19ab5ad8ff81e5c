use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use playground_core::error::AppError;
use playground_core::git::{CommitResult, FileCommit, GitUser, NewRepository, Repository};
use playground_core::traits::GitHost;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_AUTHORIZATION_URI: &str = "https://github.com/login/oauth/authorize";
pub const DEFAULT_TOKEN_URI: &str = "https://github.com/login/oauth/access_token";
pub const DEFAULT_SCOPE: &str = "read:user user:email repo";

const API_VERSION: &str = "2022-11-28";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth2 application registration and endpoint locations.
#[derive(Clone)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
    pub api_base_url: String,
    pub authorization_uri: String,
    pub token_uri: String,
    pub scope: String,
}

impl GitHubConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            authorization_uri: DEFAULT_AUTHORIZATION_URI.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn with_api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = base_url.into();
        self
    }

    pub fn with_oauth_urls(
        mut self,
        authorization_uri: impl Into<String>,
        token_uri: impl Into<String>,
    ) -> Self {
        self.authorization_uri = authorization_uri.into();
        self.token_uri = token_uri.into();
        self
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("api_base_url", &self.api_base_url)
            .field("authorization_uri", &self.authorization_uri)
            .field("token_uri", &self.token_uri)
            .field("scope", &self.scope)
            .finish()
    }
}

/// GitHub REST API and OAuth2 client.
///
/// One instance serves all users; the caller's access token is passed per
/// request.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    config: Arc<GitHubConfig>,
    timeout_secs: u64,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self, AppError> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(mut config: GitHubConfig, timeout: Duration) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            HeaderName::from_static("x-github-api-version"),
            HeaderValue::from_static(API_VERSION),
        );

        let client = Client::builder()
            .user_agent(concat!("sql-playground/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        config.api_base_url = config.api_base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            config: Arc::new(config),
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    /// URL of GitHub's consent page for a login attempt identified by `state`.
    pub fn authorize_url(&self, state: &str) -> Result<String, AppError> {
        let mut url = Url::parse(&self.config.authorization_uri).map_err(|e| {
            AppError::ConfigError(format!(
                "Invalid authorization URI '{}': {e}",
                self.config.authorization_uri
            ))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            if let Some(redirect_uri) = &self.config.redirect_uri {
                query.append_pair("redirect_uri", redirect_uri);
            }
            query.append_pair("scope", &self.config.scope);
            query.append_pair("state", state);
        }

        Ok(url.into())
    }

    /// Trade an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, AppError> {
        let request = TokenRequest {
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            code,
            redirect_uri: self.config.redirect_uri.as_deref(),
        };

        let response = self
            .send(
                self.client
                    .post(&self.config.token_uri)
                    .header(ACCEPT, "application/json")
                    .json(&request),
            )
            .await?;
        let token: TokenResponse = read_json(response).await?;

        // GitHub reports a rejected code with 200 and an `error` field.
        match token {
            TokenResponse {
                access_token: Some(access_token),
                ..
            } if !access_token.is_empty() => Ok(access_token),
            TokenResponse {
                error,
                error_description,
                ..
            } => Err(AppError::Unauthorized(
                error_description
                    .or(error)
                    .unwrap_or_else(|| "No access token in token response".to_string()),
            )),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    fn api_url_with_params(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, AppError> {
        let url = self.api_url(path);
        Url::parse_with_params(&url, params)
            .map_err(|e| AppError::ConfigError(format!("Invalid GitHub URL '{url}': {e}")))
    }

    /// Contents API URL of a file. Each path segment is percent-encoded, so
    /// `#`, `?` and `%` stay part of the file name.
    fn contents_url(&self, commit: &FileCommit) -> Result<Url, AppError> {
        let base = &self.config.api_base_url;
        let mut url = Url::parse(base)
            .map_err(|e| AppError::ConfigError(format!("Invalid GitHub URL '{base}': {e}")))?;

        url.path_segments_mut()
            .map_err(|_| AppError::ConfigError(format!("GitHub URL '{base}' cannot have a path")))?
            .pop_if_empty()
            .extend(["repos", commit.owner.as_str(), commit.repo.as_str(), "contents"])
            .extend(commit.path.split('/'));

        Ok(url)
    }

    /// Send a request, mapping transport failures and non-2xx statuses.
    async fn send(&self, request: RequestBuilder) -> Result<Response, AppError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GitHubErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or_else(|_| match body.trim() {
                "" => status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string(),
                text => format!("HTTP {}: {text}", status.as_u16()),
            });

        tracing::debug!(status = status.as_u16(), %message, "GitHub API request failed");

        Err(AppError::GitHubError {
            status: status.as_u16(),
            message,
        })
    }

    /// Blob SHA of an existing file, or `None` if the path does not exist yet.
    async fn existing_sha(&self, token: &str, commit: &FileCommit) -> Result<Option<String>, AppError> {
        let mut url = self.contents_url(commit)?;
        url.query_pairs_mut().append_pair("ref", &commit.branch);

        match self.send(self.client.get(url).bearer_auth(token)).await {
            Ok(response) => {
                let body: serde_json::Value = read_json(response).await?;
                Ok(body
                    .get("sha")
                    .and_then(|sha| sha.as_str())
                    .map(str::to_string))
            }
            Err(AppError::GitHubError { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}


async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, AppError> {
    response
        .json()
        .await
        .map_err(|e| AppError::HttpError(format!("Failed to parse GitHub response: {e}")))
}

// ---- GitHub API types ----

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct GitHubErrorBody {
    message: String,
}

#[derive(Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Deserialize)]
struct PutContentsResponse {
    content: ContentEntry,
    commit: CommitEntry,
}

#[derive(Deserialize)]
struct ContentEntry {
    path: String,
    sha: String,
    html_url: Option<String>,
}

#[derive(Deserialize)]
struct CommitEntry {
    sha: String,
}

impl GitHost for GitHubClient {
    async fn get_user(&self, token: &str) -> Result<GitUser, AppError> {
        let response = self
            .send(self.client.get(self.api_url("/user")).bearer_auth(token))
            .await?;
        read_json(response).await
    }

    async fn list_repositories(&self, token: &str) -> Result<Vec<Repository>, AppError> {
        let url =
            self.api_url_with_params("/user/repos", &[("per_page", "100"), ("sort", "updated")])?;
        let response = self.send(self.client.get(url).bearer_auth(token)).await?;
        read_json(response).await
    }

    async fn create_repository(
        &self,
        token: &str,
        repository: &NewRepository,
    ) -> Result<Repository, AppError> {
        let response = self
            .send(
                self.client
                    .post(self.api_url("/user/repos"))
                    .bearer_auth(token)
                    .json(repository),
            )
            .await?;
        let created: Repository = read_json(response).await?;
        tracing::info!(repository = %created.full_name, "Created GitHub repository");
        Ok(created)
    }

    async fn commit_file(&self, token: &str, commit: &FileCommit) -> Result<CommitResult, AppError> {
        commit.validate()?;

        let sha = self.existing_sha(token, commit).await?;
        let body = PutContents {
            message: &commit.message,
            content: STANDARD.encode(commit.content.as_bytes()),
            branch: &commit.branch,
            sha,
        };

        let response = self
            .send(
                self.client
                    .put(self.contents_url(commit)?)
                    .bearer_auth(token)
                    .json(&body),
            )
            .await?;
        let written: PutContentsResponse = read_json(response).await?;

        tracing::debug!(
            owner = %commit.owner,
            repo = %commit.repo,
            path = %written.content.path,
            "Committed file"
        );

        Ok(CommitResult {
            path: written.content.path,
            sha: written.content.sha,
            html_url: written.content.html_url,
            commit_sha: written.commit.sha,
        })
    }
}
