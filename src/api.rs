use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::input::DateRange;
use crate::username::{UserId, Username};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A single post as returned by the records endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
}

/// One page of the time-bounded records collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub posts: Vec<Post>,
    pub next_token: Option<String>,
}

/// Parameters for one page request
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub user_id: &'a UserId,
    pub range: &'a DateRange,
    pub max_results: u32,
    pub pagination_token: Option<&'a str>,
}

/// Upstream operations consumed by the fetch loop
#[allow(async_fn_in_trait)] // Generic seam only; never used as a trait object
pub trait TimelineApi {
    async fn resolve_user_id(&self, username: &Username) -> Result<UserId, ApiError>;
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, ApiError>;
}

#[derive(Debug, Deserialize)]
struct UserLookupResponse {
    data: Option<UserData>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    detail: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    data: Vec<Post>,
    meta: Option<TimelineMeta>,
}

#[derive(Debug, Deserialize)]
struct TimelineMeta {
    next_token: Option<String>,
}

/// HTTP client for the identity-lookup and records endpoints.
///
/// Holds a single `reqwest::Client` so every request of a batch shares one
/// connection pool.
#[derive(Debug, Clone)]
pub struct HttpTimelineClient {
    http_client: Client,
    base_url: String,
    bearer_token: String,
    default_retry_after: u64,
}

impl HttpTimelineClient {
    pub fn new(
        config: &ApiConfig,
        bearer_token: String,
        timeout: Duration,
        default_retry_after: u64,
    ) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ApiError::RequestFailed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token,
            default_retry_after,
        })
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String, ApiError> {
        let response = self
            .http_client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.bearer_token))
            .query(query)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(format!("Request to {url} failed: {e}")))?;

        let response = self.check_status(response).await?;
        response
            .text()
            .await
            .map_err(|e| ApiError::RequestFailed(format!("Failed to read response: {e}")))
    }

    async fn check_status(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers(), self.default_retry_after);
            warn!("Rate limit exceeded, retry after {} seconds", retry_after);
            return Err(ApiError::RateLimitExceeded { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Request returned an error: {} {}", status.as_u16(), body);
            return Err(ApiError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

impl TimelineApi for HttpTimelineClient {
    async fn resolve_user_id(&self, username: &Username) -> Result<UserId, ApiError> {
        let url = format!("{}/2/users/by/username/{}", self.base_url, username);
        debug!("Fetching user ID for username: {}", username);

        let body = self.get(&url, &[]).await?;
        parse_user_lookup(&body)
    }

    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, ApiError> {
        let url = format!("{}/2/users/{}/tweets", self.base_url, request.user_id);

        let mut query = vec![
            ("max_results", request.max_results.to_string()),
            ("start_time", request.range.start.format(TIMESTAMP_FORMAT).to_string()),
            ("end_time", request.range.end.format(TIMESTAMP_FORMAT).to_string()),
            ("tweet.fields", "created_at,text".to_string()),
            ("expansions", "author_id".to_string()),
            ("user.fields", "id,name,username".to_string()),
        ];
        if let Some(token) = request.pagination_token {
            query.push(("pagination_token", token.to_string()));
        }

        let body = self.get(&url, &query).await?;
        parse_timeline_page(&body)
    }
}

/// `Retry-After` in whole seconds, `default` when missing or not a number
pub fn parse_retry_after(headers: &HeaderMap, default: u64) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_user_lookup(body: &str) -> Result<UserId, ApiError> {
    let response: UserLookupResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidResponse(format!("JSON parsing failed: {e}")))?;

    match response.data {
        Some(user) => {
            debug!("Resolved user ID: {}", user.id);
            Ok(UserId(user.id))
        }
        // The lookup endpoint answers 200 with an `errors` array for unknown users
        None => {
            let reason = response
                .errors
                .first()
                .and_then(|e| e.detail.clone().or_else(|| e.title.clone()))
                .unwrap_or_else(|| "response has no user data".to_string());
            Err(ApiError::InvalidResponse(reason))
        }
    }
}

fn parse_timeline_page(body: &str) -> Result<Page, ApiError> {
    let response: TimelineResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidResponse(format!("JSON parsing failed: {e}")))?;

    Ok(Page {
        posts: response.data,
        next_token: response.meta.and_then(|m| m.next_token),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use reqwest::header::HeaderValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accept one connection, answer with `response`, return the raw request head
    async fn serve_once(response: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{addr}"), handle)
    }

    fn create_test_client(base_url: &str) -> HttpTimelineClient {
        let config = ApiConfig {
            base_url: base_url.to_string(),
            ..ApiConfig::default()
        };
        HttpTimelineClient::new(&config, "secret".to_string(), Duration::from_secs(5), 60)
            .unwrap()
    }

    fn create_test_range() -> DateRange {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        DateRange::from_days(day, day).unwrap()
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers, 60), 60);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers, 60), 7);

        // HTTP-date form is not supported and falls back to the default
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers, 60), 60);
    }

    #[test]
    fn test_parse_user_lookup() {
        let id = parse_user_lookup(r#"{"data":{"id":"2244994945","name":"X Dev","username":"XDevelopers"}}"#)
            .unwrap();
        assert_eq!(id, UserId("2244994945".to_string()));

        let error = parse_user_lookup(
            r#"{"errors":[{"detail":"Could not find user with username: [nobody].","title":"Not Found Error"}]}"#,
        )
        .unwrap_err();
        assert_eq!(
            error,
            ApiError::InvalidResponse("Could not find user with username: [nobody].".to_string())
        );

        assert!(matches!(
            parse_user_lookup("<html>"),
            Err(ApiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_timeline_page() {
        let page = parse_timeline_page(
            r#"{
                "data": [
                    {"id": "1", "created_at": "2024-03-01T10:00:00.000Z", "text": "first", "author_id": "42"},
                    {"id": "2", "created_at": "2024-03-01T09:00:00.000Z", "text": "second", "author_id": "42"}
                ],
                "includes": {"users": [{"id": "42", "name": "Alice", "username": "alice"}]},
                "meta": {"result_count": 2, "next_token": "7140dibdnow9c7btw3w29grvxfcgvpb9n9coehpk7xz5i"}
            }"#,
        )
        .unwrap();

        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.posts[0].text, "first");
        assert_eq!(
            page.next_token.as_deref(),
            Some("7140dibdnow9c7btw3w29grvxfcgvpb9n9coehpk7xz5i")
        );

        // An empty window has no `data` and no `next_token`
        let empty = parse_timeline_page(r#"{"meta":{"result_count":0}}"#).unwrap();
        assert_eq!(empty, Page::default());
    }

    #[tokio::test]
    async fn test_resolve_user_id_sends_credentials() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 22\r\nConnection: close\r\n\r\n{\"data\":{\"id\":\"1234\"}}",
        )
        .await;

        let client = create_test_client(&base_url);
        let user_id = client
            .resolve_user_id(&Username::parse("alice").unwrap())
            .await
            .unwrap();
        assert_eq!(user_id.as_str(), "1234");

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /2/users/by/username/alice "));
        assert!(request.contains("authorization: bearer secret"));
        assert!(request.contains("user-agent: v2usertweetsrust"));
    }

    #[tokio::test]
    async fn test_fetch_page_rate_limited() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 429 Too Many Requests\r\nRetry-After: 7\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let client = create_test_client(&base_url);
        let user_id = UserId("42".to_string());
        let range = create_test_range();
        let result = client
            .fetch_page(PageRequest {
                user_id: &user_id,
                range: &range,
                max_results: 100,
                pagination_token: Some("tok"),
            })
            .await;

        assert_eq!(result, Err(ApiError::RateLimitExceeded { retry_after: 7 }));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /2/users/42/tweets?"));
        assert!(request.contains("max_results=100"));
        assert!(request.contains("start_time=2024-03-01T00%3A00%3A00Z"));
        assert!(request.contains("end_time=2024-03-01T23%3A59%3A59Z"));
        assert!(request.contains("pagination_token=tok"));
    }

    #[tokio::test]
    async fn test_fetch_page_upstream_error() {
        let (base_url, _server) = serve_once(
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: 12\r\nConnection: close\r\n\r\nUnauthorized",
        )
        .await;

        let client = create_test_client(&base_url);
        let user_id = UserId("42".to_string());
        let range = create_test_range();
        let result = client
            .fetch_page(PageRequest {
                user_id: &user_id,
                range: &range,
                max_results: 100,
                pagination_token: None,
            })
            .await;

        assert_eq!(
            result,
            Err(ApiError::Upstream {
                status: 401,
                body: "Unauthorized".to_string(),
            })
        );
    }
}
