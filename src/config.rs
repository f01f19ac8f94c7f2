use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.twitter.com";
const DEFAULT_USER_AGENT: &str = "v2UserTweetsRust";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub bearer_token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    pub timeout_secs: Option<u64>,
}

/// Limits and pacing for the per-user fetch loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub page_size: u32,
    pub max_posts_per_user: usize,
    pub max_page_requests: u32,
    pub max_retries: u32,
    pub default_retry_after_secs: u64,
    pub max_backoff_secs: u64,
    pub page_pause_secs: u64,
    pub user_pause_secs: u64,
    pub monthly_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub quota_file: PathBuf,
    pub credentials_file: PathBuf,
    pub quota_baseline: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bearer_token: None,
            user_agent: default_user_agent(),
            timeout_secs: Some(30),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_posts_per_user: 1000,
            max_page_requests: 15,
            max_retries: 5,
            default_retry_after_secs: 60,
            max_backoff_secs: 900, // 15 minutes
            page_pause_secs: 1,
            user_pause_secs: 5,
            monthly_limit: 10_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("twitter_data"),
            quota_file: PathBuf::from("tweets_fetched.json"),
            credentials_file: PathBuf::from("twitter_keys.json"),
            quota_baseline: 2977,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Some("info".to_string()),
            file: None,
        }
    }
}

impl FetchConfig {
    pub fn page_pause(&self) -> Duration {
        Duration::from_secs(self.page_pause_secs)
    }

    pub fn user_pause(&self) -> Duration {
        Duration::from_secs(self.user_pause_secs)
    }
}

impl Config {
    /// Load configuration from TOML file with XDG directory support and environment variable overrides
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_file = match config_path {
            Some(path) => path,
            None => Self::find_config_file(),
        };

        let mut config = if config_file.exists() {
            tracing::debug!("Loading config from: {}", config_file.display());
            let content = std::fs::read_to_string(&config_file)?;
            toml::from_str::<Config>(&content)?
        } else {
            tracing::debug!("No config file found, using defaults and environment variables");
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Current directory first, then `<config_dir>/tweetpull/tweetpull.toml`
    fn find_config_file() -> PathBuf {
        let current_dir_config = PathBuf::from("tweetpull.toml");
        if current_dir_config.exists() {
            return current_dir_config;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("tweetpull").join("tweetpull.toml");
            if xdg_config.exists() {
                return xdg_config;
            }
        }

        current_dir_config
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // API configuration
        if let Ok(base_url) = env::var("TWEETPULL_API_BASE_URL") {
            self.api.base_url = base_url;
        }
        if let Ok(token) = env::var("TWEETPULL_BEARER_TOKEN") {
            self.api.bearer_token = Some(token);
        }
        if let Ok(user_agent) = env::var("TWEETPULL_API_USER_AGENT") {
            self.api.user_agent = user_agent;
        }
        if let Ok(timeout) = env::var("TWEETPULL_API_TIMEOUT_SECS") {
            self.api.timeout_secs = Some(parse_env("TWEETPULL_API_TIMEOUT_SECS", &timeout)?);
        }

        // Fetch limits
        if let Ok(value) = env::var("TWEETPULL_FETCH_MAX_POSTS_PER_USER") {
            self.fetch.max_posts_per_user = parse_env("TWEETPULL_FETCH_MAX_POSTS_PER_USER", &value)?;
        }
        if let Ok(value) = env::var("TWEETPULL_FETCH_MONTHLY_LIMIT") {
            self.fetch.monthly_limit = parse_env("TWEETPULL_FETCH_MONTHLY_LIMIT", &value)?;
        }
        if let Ok(value) = env::var("TWEETPULL_FETCH_USER_PAUSE_SECS") {
            self.fetch.user_pause_secs = parse_env("TWEETPULL_FETCH_USER_PAUSE_SECS", &value)?;
        }

        // Storage
        if let Ok(dir) = env::var("TWEETPULL_OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(dir);
        }
        if let Ok(file) = env::var("TWEETPULL_QUOTA_FILE") {
            self.storage.quota_file = PathBuf::from(file);
        }
        if let Ok(file) = env::var("TWEETPULL_CREDENTIALS_FILE") {
            self.storage.credentials_file = PathBuf::from(file);
        }

        // Logging
        if let Ok(level) = env::var("TWEETPULL_LOG_LEVEL") {
            self.logging.level = Some(level);
        }
        if let Ok(file) = env::var("TWEETPULL_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let base_url = url::Url::parse(&self.api.base_url).map_err(|e| {
            ConfigError::InvalidValue(format!("api.base_url is not a valid URL: {e}"))
        })?;
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            return Err(ConfigError::InvalidValue(
                "api.base_url must use http or https".to_string(),
            ));
        }

        if self.api.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "api.user_agent must not be empty".to_string(),
            ));
        }

        // The records endpoint accepts 5..=100 results per page
        if !(5..=100).contains(&self.fetch.page_size) {
            return Err(ConfigError::InvalidValue(
                "fetch.page_size must be between 5 and 100".to_string(),
            ));
        }

        if self.fetch.max_posts_per_user == 0 {
            return Err(ConfigError::InvalidValue(
                "fetch.max_posts_per_user must be greater than 0".to_string(),
            ));
        }

        if self.fetch.max_page_requests == 0 {
            return Err(ConfigError::InvalidValue(
                "fetch.max_page_requests must be greater than 0".to_string(),
            ));
        }

        if self.fetch.max_backoff_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "fetch.max_backoff_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs.unwrap_or(30))
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or("info")
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{name} must be a valid number")))
}
