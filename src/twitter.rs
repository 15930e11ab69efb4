/// Twitter (X) API v2 client
///
/// Search uses the app-only bearer token; replies and posts are made with the
/// account's OAuth 2.0 user access token. Every failure is folded into a
/// `PlatformError` so the executor can tell a rate limit apart from anything
/// else.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

const API_BASE: &str = "https://api.twitter.com/2";

/// Assumed window when a 429 arrives without an `x-rate-limit-reset` header
const DEFAULT_RESET_WINDOW_SECS: i64 = 15 * 60;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("rate limited until unix time {reset_at}")]
    RateLimited { reset_at: i64 },

    #[error("platform request failed: {0}")]
    Transient(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        PlatformError::Transient(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    #[serde(default)]
    pub author_id: Option<String>,
    pub text: String,
}

/// Matched tweets in the order the API returned them, plus the author
/// expansion (author id → username)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    pub tweets: Vec<Tweet>,
    pub users: HashMap<String, String>,
}

impl SearchResults {
    pub fn handle_for(&self, author_id: Option<&str>) -> &str {
        author_id
            .and_then(|id| self.users.get(id))
            .map(String::as_str)
            .unwrap_or("unknown")
    }
}

pub fn status_url(handle: &str, tweet_id: &str) -> String {
    format!("https://twitter.com/{}/status/{}", handle, tweet_id)
}

/// Remote platform operations the executor depends on
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        expand_authors: bool,
    ) -> Result<SearchResults, PlatformError>;

    /// Reply to `target_id`, returning the id of the new tweet
    async fn reply(&self, target_id: &str, text: &str) -> Result<String, PlatformError>;

    /// Publish a standalone tweet, returning its id
    async fn post(&self, text: &str) -> Result<String, PlatformError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
    includes: Option<SearchIncludes>,
}

#[derive(Debug, Deserialize)]
struct SearchIncludes {
    #[serde(default)]
    users: Vec<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
}

#[derive(Debug, Serialize)]
struct CreateTweetRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplySettings<'a>>,
}

#[derive(Debug, Serialize)]
struct ReplySettings<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    data: ApiUser,
}

impl From<SearchResponse> for SearchResults {
    fn from(response: SearchResponse) -> Self {
        let users = response
            .includes
            .map(|inc| inc.users.into_iter().map(|u| (u.id, u.username)).collect())
            .unwrap_or_default();

        Self {
            tweets: response.data,
            users,
        }
    }
}

pub struct TwitterClient {
    http_client: reqwest::Client,
    bearer_token: String,
    user_access_token: String,
}

impl TwitterClient {
    pub fn new(http_client: reqwest::Client, bearer_token: &str, user_access_token: &str) -> Self {
        Self {
            http_client,
            bearer_token: bearer_token.trim().to_string(),
            user_access_token: user_access_token.trim().to_string(),
        }
    }

    /// Look up the account behind the user token and return its username
    pub async fn verify_credentials(&self) -> Result<String, PlatformError> {
        let response = self
            .http_client
            .get(format!("{}/users/me", API_BASE))
            .bearer_auth(&self.user_access_token)
            .send()
            .await?;

        let response = check_status(response).await?;
        let me: MeResponse = response.json().await?;
        Ok(me.data.username)
    }

    async fn create_tweet(&self, body: &CreateTweetRequest<'_>) -> Result<String, PlatformError> {
        let response = self
            .http_client
            .post(format!("{}/tweets", API_BASE))
            .bearer_auth(&self.user_access_token)
            .json(body)
            .send()
            .await?;

        let response = check_status(response).await?;
        let created: CreateTweetResponse = response.json().await?;
        Ok(created.data.id)
    }
}

#[async_trait]
impl PlatformClient for TwitterClient {
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        expand_authors: bool,
    ) -> Result<SearchResults, PlatformError> {
        // The recent-search endpoint only accepts 10..=100
        let max_results = max_results.clamp(10, 100).to_string();

        let mut params = vec![
            ("query", query),
            ("max_results", max_results.as_str()),
            ("tweet.fields", "created_at,author_id,text"),
        ];
        if expand_authors {
            params.push(("expansions", "author_id"));
            params.push(("user.fields", "username"));
        }

        log::debug!("Searching recent tweets: {}", query);

        let response = self
            .http_client
            .get(format!("{}/tweets/search/recent", API_BASE))
            .bearer_auth(&self.bearer_token)
            .query(&params)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: SearchResponse = response.json().await?;
        Ok(body.into())
    }

    async fn reply(&self, target_id: &str, text: &str) -> Result<String, PlatformError> {
        self.create_tweet(&CreateTweetRequest {
            text,
            reply: Some(ReplySettings {
                in_reply_to_tweet_id: target_id,
            }),
        })
        .await
    }

    async fn post(&self, text: &str) -> Result<String, PlatformError> {
        self.create_tweet(&CreateTweetRequest { text, reply: None }).await
    }
}

/// Map non-success responses onto `PlatformError`, reading the rate limit
/// headers before the body is consumed
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
    let remaining = header_i64(&response, "x-rate-limit-remaining");
    let reset = header_i64(&response, "x-rate-limit-reset");

    if let Some(remaining) = remaining {
        log::debug!("Twitter API rate limit: {} requests remaining", remaining);
        if remaining < 5 {
            log::warn!("Low Twitter API rate limit remaining: {}", remaining);
        }
    }

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        return Err(PlatformError::RateLimited {
            reset_at: reset_or_default(reset, Utc::now().timestamp()),
        });
    }

    let text = response.text().await.unwrap_or_default();
    Err(PlatformError::Transient(format!(
        "Twitter API error: {} - {}",
        status, text
    )))
}

fn header_i64(response: &reqwest::Response, name: &str) -> Option<i64> {
    response
        .headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
}

fn reset_or_default(reset: Option<i64>, now: i64) -> i64 {
    reset.unwrap_or(now + DEFAULT_RESET_WINDOW_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_expands_authors() {
        let raw = r#"{
            "data": [
                {"id": "1", "author_id": "10", "text": "first"},
                {"id": "2", "author_id": "20", "text": "second"},
                {"id": "3", "text": "anonymous"}
            ],
            "includes": {"users": [{"id": "10", "username": "alice", "name": "Alice"}]},
            "meta": {"result_count": 3}
        }"#;

        let results: SearchResults = serde_json::from_str::<SearchResponse>(raw).unwrap().into();
        assert_eq!(results.tweets.len(), 3);
        assert_eq!(results.tweets[0].id, "1");
        assert_eq!(results.handle_for(Some("10")), "alice");
        assert_eq!(results.handle_for(Some("20")), "unknown");
        assert_eq!(results.handle_for(None), "unknown");
    }

    #[test]
    fn test_empty_search_response() {
        let raw = r#"{"meta": {"result_count": 0}}"#;
        let results: SearchResults = serde_json::from_str::<SearchResponse>(raw).unwrap().into();
        assert!(results.tweets.is_empty());
        assert!(results.users.is_empty());
    }

    #[test]
    fn test_reply_request_shape() {
        let body = CreateTweetRequest {
            text: "hey",
            reply: Some(ReplySettings {
                in_reply_to_tweet_id: "123",
            }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["reply"]["in_reply_to_tweet_id"], "123");

        let post = serde_json::to_value(CreateTweetRequest { text: "hi", reply: None }).unwrap();
        assert!(post.get("reply").is_none());
    }

    #[test]
    fn test_missing_reset_header_defaults_to_window() {
        assert_eq!(reset_or_default(Some(1_700_000_500), 1_700_000_000), 1_700_000_500);
        assert_eq!(reset_or_default(None, 1_700_000_000), 1_700_000_900);
    }

    #[test]
    fn test_status_url() {
        assert_eq!(status_url("bob", "77"), "https://twitter.com/bob/status/77");
    }
}
