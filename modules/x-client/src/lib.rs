pub mod error;
pub mod types;

pub use error::{Result, XApiError};
pub use types::{CreatePostInput, CreatedPost, FollowerEntry, ListResponse, RawAuthor, RawPost};

use serde::de::DeserializeOwned;
use serde::Serialize;

const BASE_URL: &str = "https://api.xscraper.dev/v1";

pub struct XClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl XClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(XApiError::from_status(status.as_u16(), body));
        }

        Ok(resp.json().await?)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(XApiError::from_status(status.as_u16(), body));
        }

        Ok(resp.json().await?)
    }

    /// Fetch recent posts for an account, newest first. `since_id` bounds the
    /// page to posts newer than the given id.
    pub async fn user_posts(
        &self,
        username: &str,
        since_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RawPost>> {
        tracing::debug!(username, ?since_id, limit, "Fetching user posts");
        let limit = limit.to_string();
        let mut query = vec![("username", username), ("limit", limit.as_str())];
        if let Some(since) = since_id {
            query.push(("sinceId", since));
        }
        let resp: ListResponse<RawPost> = self.get_json("/tweets/user", &query).await?;
        Ok(resp.into_items())
    }

    /// Run a keyword search over recent posts.
    pub async fn search_posts(&self, query: &str, limit: u32) -> Result<Vec<RawPost>> {
        tracing::debug!(query, limit, "Searching posts");
        let limit = limit.to_string();
        let resp: ListResponse<RawPost> = self
            .get_json("/tweets/search", &[("query", query), ("limit", limit.as_str())])
            .await?;
        Ok(resp.into_items())
    }

    /// Fetch recent posts from a community.
    pub async fn community_posts(&self, community_id: &str, limit: u32) -> Result<Vec<RawPost>> {
        tracing::debug!(community_id, limit, "Fetching community posts");
        let limit = limit.to_string();
        let resp: ListResponse<RawPost> = self
            .get_json(
                "/community/tweets",
                &[("communityId", community_id), ("limit", limit.as_str())],
            )
            .await?;
        Ok(resp.into_items())
    }

    /// Fetch a single post with current engagement counts.
    pub async fn post_detail(&self, post_id: &str) -> Result<RawPost> {
        self.get_json("/tweets/detail", &[("id", post_id)]).await
    }

    /// Fetch a page of the operator's followers. One batch call serves every
    /// follow-back check in a feedback cycle.
    pub async fn followers(&self, username: &str, limit: u32) -> Result<Vec<FollowerEntry>> {
        tracing::debug!(username, limit, "Fetching follower list");
        let limit = limit.to_string();
        let resp: ListResponse<FollowerEntry> = self
            .get_json(
                "/user/followers",
                &[("username", username), ("limit", limit.as_str())],
            )
            .await?;
        Ok(resp.into_items())
    }

    /// Publish a post, optionally as a reply. Returns the new post id.
    pub async fn create_post(&self, text: &str, reply_to_id: Option<&str>) -> Result<String> {
        tracing::info!(reply_to = ?reply_to_id, "Publishing post");
        let input = CreatePostInput {
            text: text.to_string(),
            reply_to_id: reply_to_id.map(|s| s.to_string()),
        };
        let created: CreatedPost = self.post_json("/tweets/create", &input).await?;
        created
            .post_id()
            .map(|s| s.to_string())
            .ok_or_else(|| XApiError::Api {
                status: 200,
                message: "create response missing post id".to_string(),
            })
    }
}
