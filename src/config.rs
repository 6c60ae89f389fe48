use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Procurement API client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Backend API base URL
    #[arg(
        short = 'u',
        long,
        env = "API_BASE_URL",
        default_value = "http://127.0.0.1:8000/api/v1"
    )]
    pub base_url: String,

    /// Path to the SQLite session database
    #[arg(short = 'd', long, env = "SESSION_DB_FILE")]
    pub db_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Total attempts per request (first try included)
    #[arg(long, env = "HTTP_MAX_RETRIES", default_value = "3")]
    pub http_retries: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Sign out and clear the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Show the stored session state
    Status,
    /// Change the password of the signed-in user
    ChangePassword,
    /// GET an endpoint
    Get { endpoint: String },
    /// POST a JSON body to an endpoint
    Post { endpoint: String, body: Option<String> },
    /// PUT a JSON body to an endpoint
    Put { endpoint: String, body: Option<String> },
    /// PATCH an endpoint with a JSON body
    Patch { endpoint: String, body: Option<String> },
    /// DELETE an endpoint
    Delete { endpoint: String },
    /// Upload a file as multipart form data
    Upload {
        endpoint: String,
        file: PathBuf,
        /// Form field name for the file
        #[arg(long, default_value = "file")]
        field: String,
    },
    /// Save the raw response of a GET to a local file
    Download { endpoint: String, file: PathBuf },
    /// Check whether the signed-in user may open a page restricted to the given roles
    Access { roles: Vec<String> },
}

#[derive(Clone, Debug)]
pub struct Config {
    // Backend
    pub base_url: String,

    // HTTP client
    pub request_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,

    // Session
    pub token_refresh_threshold: Duration,
    pub login_path: String,
    pub session_db_file: PathBuf,

    // Debug
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api/v1".to_string(),
            request_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
            token_refresh_threshold: Duration::from_secs(300),
            login_path: "/login.html".to_string(),
            session_db_file: default_session_db_path(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Build configuration with priority: CLI > ENV > defaults
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let defaults = Config::default();

        let config = Config {
            base_url: args.base_url.trim_end_matches('/').to_string(),

            request_timeout: Duration::from_secs(args.http_timeout),

            retry_attempts: args.http_retries,

            retry_base_delay: std::env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),

            token_refresh_threshold: std::env::var("TOKEN_REFRESH_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.token_refresh_threshold),

            login_path: std::env::var("LOGIN_PATH").unwrap_or(defaults.login_path),

            session_db_file: args
                .db_file
                .as_deref()
                .map(expand_tilde)
                .unwrap_or(defaults.session_db_file),

            log_level: args.log_level.clone(),
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("API_BASE_URL is not a valid URL: {}", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("API_BASE_URL must use http or https: {}", self.base_url);
        }

        if self.retry_attempts == 0 {
            anyhow::bail!("HTTP_MAX_RETRIES must be at least 1");
        }

        if self.request_timeout.is_zero() {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be greater than zero");
        }

        Ok(())
    }

    /// Refresh lead time as a chrono duration for the credential store
    pub fn refresh_skew(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.token_refresh_threshold)
            .unwrap_or_else(|_| chrono::Duration::seconds(300))
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Default session database location under the platform data directory
fn default_session_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("procurement-client")
        .join("session.sqlite3")
}
