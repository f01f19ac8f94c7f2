use crate::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TweetPullError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Request returned an error: {status} {body}")]
    Upstream { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to persist {path}: {reason}")]
    PersistFailed { path: String, reason: String },

    #[error("In-memory store lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Local problems detected before a batch starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Please select a CSV file with usernames")]
    MissingCsv,

    #[error("Could not read CSV file {path}: {reason}")]
    UnreadableCsv { path: String, reason: String },

    #[error("CSV file {path} contains no usernames")]
    NoUsernames { path: String },

    #[error("Please enter the bearer token")]
    MissingCredential,

    #[error("Start date {start} must be before end date {end}")]
    InvalidDateRange { start: String, end: String },
}

/// Recovery strategies for upstream failures
pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Seconds to wait after a rate limit: `retry_after * 2^attempt`, capped at `max_backoff`
    pub fn rate_limit_delay(retry_after: u64, attempt: u32, max_backoff: u64) -> u64 {
        let factor = 2_u64.checked_pow(attempt).unwrap_or(u64::MAX);
        retry_after.saturating_mul(factor).min(max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tweetpull_error_display() {
        let config_error = ConfigError::InvalidValue("fetch.page_size".to_string());
        let error = TweetPullError::Config(config_error);
        assert!(error.to_string().contains("Configuration error"));
        assert!(error.to_string().contains("fetch.page_size"));
    }

    #[test]
    fn test_api_error_variants() {
        let rate_limit_error = ApiError::RateLimitExceeded { retry_after: 60 };
        assert!(rate_limit_error.to_string().contains("Rate limit exceeded"));
        assert!(rate_limit_error.to_string().contains("60 seconds"));

        let upstream = ApiError::Upstream {
            status: 401,
            body: "Unauthorized".to_string(),
        };
        assert_eq!(
            upstream.to_string(),
            "Request returned an error: 401 Unauthorized"
        );
    }

    #[test]
    fn test_input_error_variants() {
        let range = InputError::InvalidDateRange {
            start: "2024-02-01".to_string(),
            end: "2024-01-01".to_string(),
        };
        assert!(range.to_string().contains("2024-02-01"));
        assert!(InputError::MissingCredential
            .to_string()
            .contains("bearer token"));
    }

    #[test]
    fn test_rate_limit_delay() {
        assert_eq!(ErrorRecovery::rate_limit_delay(60, 0, 900), 60);
        assert_eq!(ErrorRecovery::rate_limit_delay(60, 1, 900), 120);
        assert_eq!(ErrorRecovery::rate_limit_delay(60, 2, 900), 240);
        assert_eq!(ErrorRecovery::rate_limit_delay(60, 3, 900), 480);

        // Capped
        assert_eq!(ErrorRecovery::rate_limit_delay(60, 4, 900), 900);
        assert_eq!(ErrorRecovery::rate_limit_delay(1, 80, 900), 900);

        assert_eq!(ErrorRecovery::rate_limit_delay(1, 4, 900), 16);
    }

    #[test]
    fn test_error_conversion_from_std_errors() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = TweetPullError::from(io_error);
        assert!(matches!(error, TweetPullError::Io(_)));

        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error = TweetPullError::from(StorageError::from(json_error));
        assert!(matches!(error, TweetPullError::Storage(StorageError::Json(_))));

        let error = TweetPullError::from(InputError::MissingCsv);
        match error {
            TweetPullError::Input(inner) => assert_eq!(inner, InputError::MissingCsv),
            _ => panic!("Expected Input error variant"),
        }
    }
}
