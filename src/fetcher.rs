use crate::api::{PageRequest, Post, TimelineApi};
use crate::config::FetchConfig;
use crate::error::{ApiError, ErrorRecovery};
use crate::input::DateRange;
use crate::output::OutputWriter;
use crate::quota::QuotaCounter;
use crate::storage::StateStore;
use crate::username::{UserId, Username};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Per-user limits and pacing of the paged fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchLimits {
    pub page_size: u32,
    pub max_posts: usize,
    pub max_page_requests: u32,
    pub max_retries: u32,
    pub max_backoff_secs: u64,
    pub page_pause: Duration,
}

impl From<&FetchConfig> for FetchLimits {
    fn from(config: &FetchConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_posts: config.max_posts_per_user,
            max_page_requests: config.max_page_requests,
            max_retries: config.max_retries,
            max_backoff_secs: config.max_backoff_secs,
            page_pause: config.page_pause(),
        }
    }
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

/// Why the paging loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ReachedMaxPosts,
    PageRequestLimit,
    RetriesExhausted,
    NoContinuation,
    EmptyPage,
    QuotaExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPosts {
    pub posts: Vec<Post>,
    pub stop_reason: StopReason,
    pub page_requests: u32,
    pub retries: u32,
}

/// Result of fetching one user; never an error, every failure is a variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    ValidationError {
        username: String,
    },
    UpstreamError {
        username: String,
        status: u16,
        body: String,
    },
    /// Retry budget ran out; whatever had been accumulated is still saved
    RateLimitExhausted {
        username: String,
        count: usize,
        path: Option<PathBuf>,
    },
    Success {
        username: String,
        count: usize,
        path: PathBuf,
    },
    NoData {
        username: String,
    },
    Failed {
        username: String,
        message: String,
    },
}

impl FetchOutcome {
    pub fn username(&self) -> &str {
        match self {
            Self::ValidationError { username }
            | Self::UpstreamError { username, .. }
            | Self::RateLimitExhausted { username, .. }
            | Self::Success { username, .. }
            | Self::NoData { username }
            | Self::Failed { username, .. } => username,
        }
    }

    /// Number of posts written to disk for this user
    pub fn saved_count(&self) -> usize {
        match self {
            Self::Success { count, .. } | Self::RateLimitExhausted { count, .. } => *count,
            _ => 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ValidationError { .. } | Self::UpstreamError { .. } | Self::Failed { .. }
        )
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationError { username } => {
                write!(f, "Invalid username format: {username}")
            }
            Self::UpstreamError {
                username,
                status,
                body,
            } => write!(
                f,
                "Failed to fetch tweets for {username}: Request returned an error: {status} {body}"
            ),
            Self::RateLimitExhausted {
                username, count, ..
            } => {
                if *count == 0 {
                    write!(f, "Rate limit retries exhausted for {username}; no tweets saved")
                } else {
                    write!(
                        f,
                        "Rate limit retries exhausted for {username}; saved {count} tweets"
                    )
                }
            }
            Self::Success {
                username, count, ..
            } => write!(f, "Tweets for {username} saved successfully! Count: {count}"),
            Self::NoData { username } => write!(
                f,
                "No tweets found for {username} in the specified date range."
            ),
            Self::Failed { username, message } => {
                write!(f, "Failed to fetch tweets for {username}: {message}")
            }
        }
    }
}

/// Resolves users, pages through their posts and saves them
pub struct PostFetcher<A: TimelineApi, S: StateStore> {
    api: A,
    quota: QuotaCounter<S>,
    output: OutputWriter,
    limits: FetchLimits,
}

impl<A: TimelineApi, S: StateStore> PostFetcher<A, S> {
    pub fn new(api: A, quota: QuotaCounter<S>, output: OutputWriter, limits: FetchLimits) -> Self {
        Self {
            api,
            quota,
            output,
            limits,
        }
    }

    pub fn quota(&self) -> &QuotaCounter<S> {
        &self.quota
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Fetch and save one user's posts in `range`
    pub async fn fetch_user(&mut self, raw_username: &str, range: &DateRange) -> FetchOutcome {
        let Some(username) = Username::parse(raw_username) else {
            error!("Invalid username format: {}", raw_username);
            return FetchOutcome::ValidationError {
                username: raw_username.to_string(),
            };
        };

        let user_id = match self.api.resolve_user_id(&username).await {
            Ok(user_id) => user_id,
            Err(e) => return Self::failure(&username, e),
        };
        info!("User ID for {}: {}", username, user_id);

        let fetched = match self.fetch_posts(&user_id, range).await {
            Ok(fetched) => fetched,
            Err(e) => return Self::failure(&username, e),
        };

        let exhausted = fetched.stop_reason == StopReason::RetriesExhausted;
        let count = fetched.posts.len();

        if count == 0 {
            if exhausted {
                warn!("Rate limit retries exhausted for {} before any tweets arrived", username);
                return FetchOutcome::RateLimitExhausted {
                    username: username.to_string(),
                    count: 0,
                    path: None,
                };
            }
            info!("No tweets found for {} in the specified date range", username);
            return FetchOutcome::NoData {
                username: username.to_string(),
            };
        }

        match self.output.write_posts(&username, &fetched.posts) {
            Ok(path) if exhausted => FetchOutcome::RateLimitExhausted {
                username: username.to_string(),
                count,
                path: Some(path),
            },
            Ok(path) => FetchOutcome::Success {
                username: username.to_string(),
                count,
                path,
            },
            Err(e) => {
                error!("Failed to save tweets for {}: {}", username, e);
                FetchOutcome::Failed {
                    username: username.to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    /// Page through the user's posts until a stop condition triggers.
    ///
    /// Every attempt counts toward `max_page_requests`, including the
    /// rate-limited ones that also count toward `max_retries`. A rate-limited
    /// attempt repeats the same page, so nothing is appended or counted twice.
    pub async fn fetch_posts(
        &mut self,
        user_id: &UserId,
        range: &DateRange,
    ) -> Result<FetchedPosts, ApiError> {
        let limits = self.limits.clone();
        let mut posts: Vec<Post> = Vec::new();
        let mut next_token: Option<String> = None;
        let mut page_requests = 0;
        let mut retries = 0;

        let stop_reason = loop {
            if posts.len() >= limits.max_posts {
                break StopReason::ReachedMaxPosts;
            }
            // An exhausted retry budget wins over the page cap when both run out together
            if retries >= limits.max_retries {
                break StopReason::RetriesExhausted;
            }
            if page_requests >= limits.max_page_requests {
                break StopReason::PageRequestLimit;
            }

            debug!(
                "Making request for user {}. Request count: {}",
                user_id, page_requests
            );
            let result = self
                .api
                .fetch_page(PageRequest {
                    user_id,
                    range,
                    max_results: limits.page_size,
                    pagination_token: next_token.as_deref(),
                })
                .await;
            page_requests += 1;

            let page = match result {
                Ok(page) => page,
                Err(ApiError::RateLimitExceeded { retry_after }) => {
                    let delay =
                        ErrorRecovery::rate_limit_delay(retry_after, retries, limits.max_backoff_secs);
                    warn!(
                        "Rate limit exceeded (retry {}/{}). Sleeping for {} seconds.",
                        retries + 1,
                        limits.max_retries,
                        delay
                    );
                    sleep(Duration::from_secs(delay)).await;
                    retries += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            debug!(
                "Received response for user {}. Tweets in response: {}",
                user_id,
                page.posts.len()
            );

            if page.posts.is_empty() {
                debug!("No tweets in response, stopping");
                break StopReason::EmptyPage;
            }

            let received = page.posts.len() as u64;
            posts.extend(page.posts);
            self.quota.increment(received);

            match page.next_token {
                Some(token) => {
                    debug!("Pagination token received: {}", token);
                    next_token = Some(token);
                }
                None => {
                    debug!("No more pagination tokens, all tweets fetched");
                    break StopReason::NoContinuation;
                }
            }

            if self.quota.is_exhausted() {
                warn!(
                    "Monthly tweet limit reached ({}/{}), stopping",
                    self.quota.current(),
                    self.quota.monthly_limit()
                );
                break StopReason::QuotaExhausted;
            }

            sleep(limits.page_pause).await;
        };

        posts.truncate(limits.max_posts);
        info!(
            "Finished fetching tweets for user {}. Total tweets: {} ({:?})",
            user_id,
            posts.len(),
            stop_reason
        );

        Ok(FetchedPosts {
            posts,
            stop_reason,
            page_requests,
            retries,
        })
    }

    fn failure(username: &Username, error: ApiError) -> FetchOutcome {
        error!("Error fetching tweets for {}: {}", username, error);
        match error {
            ApiError::Upstream { status, body } => FetchOutcome::UpstreamError {
                username: username.to_string(),
                status,
                body,
            },
            // Identity lookup is never retried, a 429 there is final
            ApiError::RateLimitExceeded { retry_after } => FetchOutcome::UpstreamError {
                username: username.to_string(),
                status: 429,
                body: format!("retry after {retry_after} seconds"),
            },
            other => FetchOutcome::Failed {
                username: username.to_string(),
                message: other.to_string(),
            },
        }
    }
}
