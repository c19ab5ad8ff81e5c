use std::time::Duration;

use clap::Parser;

use playground_client::GitHubConfig;
use playground_client::github::{DEFAULT_API_BASE_URL, DEFAULT_AUTHORIZATION_URI, DEFAULT_TOKEN_URI};
use playground_core::SandboxLimits;
use playground_db::SandboxConfig;

/// Server settings, read from the command line or the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "sql-playground", version, about = "SQL Playground API server")]
pub struct ServerConfig {
    /// Interface to bind
    #[arg(long, env = "PLAYGROUND_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PLAYGROUND_PORT", default_value_t = 8080)]
    pub port: u16,

    /// GitHub OAuth app client ID
    #[arg(long, env = "GITHUB_CLIENT_ID")]
    pub github_client_id: String,

    /// GitHub OAuth app client secret
    #[arg(long, env = "GITHUB_CLIENT_SECRET", hide_env_values = true)]
    pub github_client_secret: String,

    /// Callback URL registered with the OAuth app
    #[arg(long, env = "GITHUB_REDIRECT_URI")]
    pub github_redirect_uri: Option<String>,

    #[arg(long, env = "GITHUB_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub github_api_base_url: String,

    #[arg(long, env = "GITHUB_AUTHORIZATION_URI", default_value = DEFAULT_AUTHORIZATION_URI)]
    pub github_authorization_uri: String,

    #[arg(long, env = "GITHUB_TOKEN_URI", default_value = DEFAULT_TOKEN_URI)]
    pub github_token_uri: String,

    /// Development server advertised in the OpenAPI document
    #[arg(long, env = "OPENAPI_DEV_URL", default_value = "http://localhost:8080")]
    pub openapi_dev_url: String,

    /// Production server advertised in the OpenAPI document
    #[arg(long, env = "OPENAPI_PROD_URL", default_value = "https://api.example.com")]
    pub openapi_prod_url: String,

    /// Maximum rows a single query may return
    #[arg(long, env = "SANDBOX_MAX_ROWS", default_value_t = 1000)]
    pub sandbox_max_rows: usize,

    /// Query timeout when the request does not set one
    #[arg(long, env = "SANDBOX_DEFAULT_TIMEOUT_SECS", default_value_t = 30)]
    pub sandbox_default_timeout_secs: u64,

    /// Upper bound on a requested query timeout
    #[arg(long, env = "SANDBOX_MAX_TIMEOUT_SECS", default_value_t = 300)]
    pub sandbox_max_timeout_secs: u64,

    /// Idle time after which a user's sandbox is discarded
    #[arg(long, env = "SANDBOX_IDLE_MINUTES", default_value_t = 30)]
    pub sandbox_idle_minutes: u64,

    /// Maximum number of live sandboxes
    #[arg(long, env = "SANDBOX_MAX_SANDBOXES", default_value_t = 1000)]
    pub sandbox_max_sandboxes: u64,

    /// Lifetime of a login session
    #[arg(long, env = "SESSION_TTL_HOURS", default_value_t = 8)]
    pub session_ttl_hours: i64,

    /// Mark the session cookie `Secure` (serve over HTTPS)
    #[arg(long, env = "SESSION_COOKIE_SECURE", default_value_t = false)]
    pub session_cookie_secure: bool,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn github(&self) -> GitHubConfig {
        let config = GitHubConfig::new(&self.github_client_id, &self.github_client_secret)
            .with_api_base_url(&self.github_api_base_url)
            .with_oauth_urls(&self.github_authorization_uri, &self.github_token_uri);
        match &self.github_redirect_uri {
            Some(uri) => config.with_redirect_uri(uri),
            None => config,
        }
    }

    pub fn sandbox_limits(&self) -> SandboxLimits {
        SandboxLimits {
            max_rows: self.sandbox_max_rows.max(1),
            default_timeout: Duration::from_secs(self.sandbox_default_timeout_secs.max(1)),
            max_timeout: Duration::from_secs(self.sandbox_max_timeout_secs.max(1)),
        }
    }

    pub fn sandbox(&self) -> SandboxConfig {
        SandboxConfig {
            idle_timeout: Duration::from_secs(self.sandbox_idle_minutes.max(1) * 60),
            max_sandboxes: self.sandbox_max_sandboxes.max(1),
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours.max(1))
    }
}
