// Trait abstractions for the pipeline's external collaborators.
//
// ContentSource — post fetching, follower lists, engagement lookups.
// ReplyGenerator — LLM reply drafting.
// ReplyPublisher — the publish call, with classified failures.
// Notifier — the operator channel (outbound only; inbound polling lives
//   in the binary's update loop).
// ReplyStore — the three durable tables.
//
// These enable deterministic testing with the mocks in `testing.rs`:
// no network, no database. `cargo test` in seconds.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use replyflow_common::{
    CandidateItem, EngagementSnapshot, NewPendingReply, PendingReply, Provenance, RepliedAuthor,
    ReplyPayload, ReplyStatus, SourceKind, SourceStatus, TrackedSource,
};

use crate::publisher::PublishError;

// ---------------------------------------------------------------------------
// ContentSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch recent posts for an account, newest first, optionally bounded
    /// to posts newer than `since_id`.
    async fn account_posts(
        &self,
        username: &str,
        since_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<CandidateItem>>;

    /// Keyword search over recent posts.
    async fn search_posts(&self, query: &str, limit: u32) -> Result<Vec<CandidateItem>>;

    /// Recent posts from a community.
    async fn community_posts(&self, community_id: &str, limit: u32) -> Result<Vec<CandidateItem>>;

    /// Current engagement counts for a single post.
    async fn post_engagement(&self, post_id: &str) -> Result<EngagementSnapshot>;

    /// Handles of accounts following `username`. One batch call serves every
    /// follow-back check in a feedback cycle.
    async fn followers(&self, username: &str, limit: u32) -> Result<Vec<String>>;
}

#[async_trait]
impl ContentSource for x_client::XClient {
    async fn account_posts(
        &self,
        username: &str,
        since_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<CandidateItem>> {
        let posts = self.user_posts(username, since_id, limit).await?;
        let provenance = Provenance {
            kind: SourceKind::Account,
            label: username.to_string(),
        };
        Ok(posts
            .into_iter()
            .filter_map(|p| p.into_candidate(provenance.clone()))
            .collect())
    }

    async fn search_posts(&self, query: &str, limit: u32) -> Result<Vec<CandidateItem>> {
        let posts = x_client::XClient::search_posts(self, query, limit).await?;
        let provenance = Provenance {
            kind: SourceKind::Search,
            label: query.to_string(),
        };
        Ok(posts
            .into_iter()
            .filter_map(|p| p.into_candidate(provenance.clone()))
            .collect())
    }

    async fn community_posts(&self, community_id: &str, limit: u32) -> Result<Vec<CandidateItem>> {
        let posts = x_client::XClient::community_posts(self, community_id, limit).await?;
        let provenance = Provenance {
            kind: SourceKind::Community,
            label: community_id.to_string(),
        };
        Ok(posts
            .into_iter()
            .filter_map(|p| p.into_candidate(provenance.clone()))
            .collect())
    }

    async fn post_engagement(&self, post_id: &str) -> Result<EngagementSnapshot> {
        let post = self.post_detail(post_id).await?;
        Ok(EngagementSnapshot {
            likes: post.like_count.unwrap_or(0),
            retweets: post.retweet_count.unwrap_or(0),
            views: post.view_count.unwrap_or(0),
            replies: post.reply_count.unwrap_or(0),
        })
    }

    async fn followers(&self, username: &str, limit: u32) -> Result<Vec<String>> {
        let entries = x_client::XClient::followers(self, username, limit).await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| e.handle().map(|h| h.to_string()))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// ReplyGenerator
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Draft reply text for a source post. `instructions` and `prior` seed
    /// regeneration.
    async fn draft(
        &self,
        source_text: &str,
        instructions: Option<&str>,
        prior: Option<&ReplyPayload>,
    ) -> Result<ReplyPayload>;
}

#[async_trait]
impl ReplyGenerator for llm_client::LlmClient {
    async fn draft(
        &self,
        source_text: &str,
        instructions: Option<&str>,
        prior: Option<&ReplyPayload>,
    ) -> Result<ReplyPayload> {
        self.draft_replies(source_text, instructions, prior).await
    }
}

// ---------------------------------------------------------------------------
// ReplyPublisher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReplyPublisher: Send + Sync {
    /// Publish text, optionally as a reply. Returns the new post id.
    async fn publish(
        &self,
        text: &str,
        reply_to: Option<&str>,
    ) -> std::result::Result<String, PublishError>;
}

#[async_trait]
impl ReplyPublisher for x_client::XClient {
    async fn publish(
        &self,
        text: &str,
        reply_to: Option<&str>,
    ) -> std::result::Result<String, PublishError> {
        self.create_post(text, reply_to)
            .await
            .map_err(PublishError::from)
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message to the operator. Returns a message id that later
    /// operator replies can reference.
    async fn notify(&self, text: &str) -> Result<i64>;
}

/// Telegram-backed notifier bound to the operator chat.
pub struct TelegramNotifier {
    client: telegram_client::TelegramClient,
    chat_id: i64,
}

impl TelegramNotifier {
    pub fn new(client: telegram_client::TelegramClient, chat_id: i64) -> Self {
        Self { client, chat_id }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<i64> {
        Ok(self.client.send_message(self.chat_id, text).await?)
    }
}

// ---------------------------------------------------------------------------
// ReplyStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReplyStore: Send + Sync {
    // --- Pending replies ---

    /// Insert a pending reply. Returns the new row id, or None when a row for
    /// the same source post id already exists (silent dedup).
    async fn insert_pending(&self, reply: &NewPendingReply) -> Result<Option<i64>>;

    /// Whether any row exists for this source post id, in any status.
    async fn has_pending(&self, source_post_id: &str) -> Result<bool>;

    async fn get_reply(&self, id: i64) -> Result<Option<PendingReply>>;

    async fn list_by_status(&self, status: ReplyStatus) -> Result<Vec<PendingReply>>;

    /// The oldest row still awaiting a decision, if any.
    async fn oldest_pending(&self) -> Result<Option<PendingReply>>;

    async fn count_by_status(&self, status: ReplyStatus) -> Result<i64>;

    /// Transition a pending row to `posted`, stamping final text, resolve
    /// time, and the published post id. Returns false when the row was not
    /// in `pending` (already resolved or missing) — the caller reports that,
    /// never overwrites.
    async fn resolve_posted(
        &self,
        id: i64,
        final_text: &str,
        posted_reply_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Transition a pending row to `rejected`. Same guard as resolve_posted.
    async fn resolve_rejected(&self, id: i64, now: DateTime<Utc>) -> Result<bool>;

    /// Reject every pending row. Returns how many were rejected.
    async fn reject_all_pending(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Replace the generated payload in place (regeneration). Valid on
    /// `pending` and `new` rows; a `new` row becomes `pending`. Returns false
    /// when the row is missing or already resolved.
    async fn replace_payload(&self, id: i64, payload: &ReplyPayload) -> Result<bool>;

    // --- Tracked sources ---

    /// Returns false if the (kind, identifier) pair already exists.
    async fn add_source(&self, kind: SourceKind, identifier: &str) -> Result<bool>;

    async fn remove_source(&self, kind: SourceKind, identifier: &str) -> Result<bool>;

    async fn list_sources(&self) -> Result<Vec<TrackedSource>>;

    async fn active_sources(&self, kind: SourceKind) -> Result<Vec<TrackedSource>>;

    async fn set_source_status(
        &self,
        kind: SourceKind,
        identifier: &str,
        status: SourceStatus,
    ) -> Result<bool>;

    /// Advance an account source's last-seen cursor. Never moves backwards.
    async fn advance_cursor(&self, id: i64, last_seen_id: &str) -> Result<()>;

    async fn increment_hit_count(&self, kind: SourceKind, identifier: &str) -> Result<()>;

    async fn increment_reply_count(&self, kind: SourceKind, identifier: &str) -> Result<()>;

    // --- Replied authors ---

    /// Idempotent: a second insert for the same (author, source post) pair is
    /// a no-op.
    async fn insert_replied_author(&self, row: &RepliedAuthor) -> Result<()>;

    /// Rows created within the trailing window and not checked within the
    /// cooldown, ordered oldest-checked first.
    async fn due_feedback(
        &self,
        window_days: i64,
        cooldown_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<RepliedAuthor>>;

    async fn update_feedback(
        &self,
        author: &str,
        source_post_id: &str,
        followed_back: bool,
        engagement: EngagementSnapshot,
        got_reply_back: bool,
        checked_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Advance last_checked_at without touching metrics. Used after a
    /// per-author failure so an unreachable author is not retried forever.
    async fn touch_checked(
        &self,
        author: &str,
        source_post_id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<()>;

    /// (total replied authors, follow-backs, reply-backs) for status reports.
    async fn feedback_totals(&self) -> Result<(i64, i64, i64)>;
}
