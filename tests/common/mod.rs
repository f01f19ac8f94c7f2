#![allow(dead_code)] // Each test binary uses a different subset

use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tweetpull::api::{Page, PageRequest, Post, TimelineApi};
use tweetpull::error::ApiError;
use tweetpull::input::DateRange;
use tweetpull::username::{UserId, Username};

/// A page request as seen by the fake upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub user_id: String,
    pub pagination_token: Option<String>,
    pub max_results: u32,
}

#[derive(Default)]
struct ScriptState {
    lookups: Vec<String>,
    requests: Vec<RecordedRequest>,
    pages: HashMap<String, VecDeque<Result<Page, ApiError>>>,
    fallback: HashMap<String, Result<Page, ApiError>>,
}

/// In-memory upstream: users map to ids, each id replays a queue of page
/// responses and then repeats its fallback (an empty page by default)
#[derive(Default)]
pub struct ScriptedApi {
    users: HashMap<String, Result<UserId, ApiError>>,
    state: Mutex<ScriptState>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: &str, user_id: &str) -> Self {
        self.users
            .insert(username.to_string(), Ok(UserId(user_id.to_string())));
        self
    }

    pub fn with_lookup_error(mut self, username: &str, error: ApiError) -> Self {
        self.users.insert(username.to_string(), Err(error));
        self
    }

    pub fn with_page(self, user_id: &str, response: Result<Page, ApiError>) -> Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .entry(user_id.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn with_fallback(self, user_id: &str, response: Result<Page, ApiError>) -> Self {
        self.state
            .lock()
            .unwrap()
            .fallback
            .insert(user_id.to_string(), response);
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.state.lock().unwrap().lookups.clone()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

impl TimelineApi for ScriptedApi {
    async fn resolve_user_id(&self, username: &Username) -> Result<UserId, ApiError> {
        self.state
            .lock()
            .unwrap()
            .lookups
            .push(username.to_string());
        self.users
            .get(username.as_str())
            .cloned()
            .unwrap_or_else(|| {
                Err(ApiError::InvalidResponse(format!(
                    "Could not find user with username: [{username}]."
                )))
            })
    }

    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, ApiError> {
        let mut state = self.state.lock().unwrap();
        let user_id = request.user_id.as_str().to_string();
        state.requests.push(RecordedRequest {
            user_id: user_id.clone(),
            pagination_token: request.pagination_token.map(str::to_string),
            max_results: request.max_results,
        });

        if let Some(response) = state.pages.get_mut(&user_id).and_then(VecDeque::pop_front) {
            return response;
        }
        state
            .fallback
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Ok(Page::default()))
    }
}

/// `count` posts with ids `<prefix>-<n>`, one minute apart
pub fn posts(prefix: &str, count: usize) -> Vec<Post> {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    (0..count)
        .map(|n| Post {
            id: format!("{prefix}-{n}"),
            created_at: base - ChronoDuration::minutes(n as i64),
            text: format!("{prefix} post {n}"),
        })
        .collect()
}

pub fn page(prefix: &str, count: usize, next_token: Option<&str>) -> Result<Page, ApiError> {
    Ok(Page {
        posts: posts(prefix, count),
        next_token: next_token.map(str::to_string),
    })
}

pub fn rate_limited(retry_after: u64) -> Result<Page, ApiError> {
    Err(ApiError::RateLimitExceeded { retry_after })
}

pub fn one_day() -> DateRange {
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    DateRange::from_days(day, day).unwrap()
}
