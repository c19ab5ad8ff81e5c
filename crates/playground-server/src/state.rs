use std::time::Duration;

use moka::future::Cache;

use playground_client::GitHubClient;
use playground_core::error::AppError;
use playground_core::{Principal, QueryArchiver, QueryService};
use playground_db::{Database, HistoryRepository, SandboxManager};

use crate::config::ServerConfig;

/// How long an OAuth `state` value stays redeemable.
const OAUTH_STATE_TTL: Duration = Duration::from_secs(10 * 60);
/// How long a validated bearer token is trusted without asking GitHub again.
const TOKEN_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    pub github: GitHubClient,
    pub queries: QueryService<SandboxManager, HistoryRepository>,
    pub archiver: QueryArchiver<GitHubClient>,
    /// Pending login attempts, keyed by the `state` sent to GitHub.
    pub oauth_states: Cache<String, ()>,
    /// Bearer tokens already checked against GitHub, keyed by token hash.
    pub token_cache: Cache<String, Principal>,
    pub session_ttl: chrono::Duration,
    pub cookie_secure: bool,
    pub openapi: utoipa::openapi::OpenApi,
}

impl AppState {
    pub fn new(config: &ServerConfig, db: Database) -> Result<Self, AppError> {
        let github = GitHubClient::new(config.github())?;
        let queries = QueryService::new(
            SandboxManager::new(config.sandbox()),
            db.history_repo(),
            config.sandbox_limits(),
        );

        Ok(Self {
            archiver: QueryArchiver::new(github.clone()),
            github,
            queries,
            db,
            oauth_states: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(OAUTH_STATE_TTL)
                .build(),
            token_cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(TOKEN_CACHE_TTL)
                .build(),
            session_ttl: config.session_ttl(),
            cookie_secure: config.session_cookie_secure,
            openapi: crate::openapi::api_doc(config),
        })
    }
}
