//! In-memory test doubles for the pipeline's trait boundaries.
//!
//! `MemoryStore` mirrors the Postgres store's conditional-update semantics
//! (status guards, dedup on source post id) so state-machine tests exercise
//! the same transitions without a database. The mocks register canned
//! responses through `.on_*()` builders and record calls for assertions.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use replyflow_common::{
    CandidateItem, EngagementSnapshot, NewPendingReply, PendingReply, Provenance, RepliedAuthor,
    ReplyPayload, ReplyStatus, SourceKind, SourceStatus, TrackedSource,
};

use crate::publisher::PublishError;
use crate::traits::{ContentSource, Notifier, ReplyGenerator, ReplyPublisher, ReplyStore};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreInner {
    replies: Vec<PendingReply>,
    sources: Vec<TrackedSource>,
    replied: Vec<RepliedAuthor>,
    next_reply_id: i64,
    next_source_id: i64,
}

pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                next_reply_id: 1,
                next_source_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Insert a fully-formed row as-is, keeping its id. Tests use this to
    /// pin specific ids.
    pub async fn push_reply(&self, reply: PendingReply) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_reply_id = inner.next_reply_id.max(reply.id + 1);
        inner.replies.push(reply);
    }

    /// Minimal occupied row for a source post id, for dedup tests.
    pub async fn seed_pending_for(&self, source_post_id: &str) {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_reply_id;
        inner.next_reply_id += 1;
        inner.replies.push(PendingReply {
            id,
            source_post_id: source_post_id.to_string(),
            source_text: "seeded".to_string(),
            source_author: "seeded".to_string(),
            source_url: String::new(),
            payload: None,
            final_text: None,
            status: ReplyStatus::Pending,
            provenance: Provenance {
                kind: SourceKind::Search,
                label: "seed".to_string(),
            },
            author_followers: None,
            created_at: now,
            resolved_at: None,
            posted_reply_id: None,
        });
    }

    pub async fn replied_authors(&self) -> Vec<RepliedAuthor> {
        self.inner.lock().unwrap().replied.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplyStore for MemoryStore {
    async fn insert_pending(&self, reply: &NewPendingReply) -> Result<Option<i64>> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .replies
            .iter()
            .any(|r| r.source_post_id == reply.source_post_id)
        {
            return Ok(None);
        }
        let id = inner.next_reply_id;
        inner.next_reply_id += 1;
        inner.replies.push(PendingReply {
            id,
            source_post_id: reply.source_post_id.clone(),
            source_text: reply.source_text.clone(),
            source_author: reply.source_author.clone(),
            source_url: reply.source_url.clone(),
            payload: reply.payload.clone(),
            final_text: None,
            status: reply.status,
            provenance: reply.provenance.clone(),
            author_followers: reply.author_followers,
            created_at: reply.created_at,
            resolved_at: None,
            posted_reply_id: None,
        });
        Ok(Some(id))
    }

    async fn has_pending(&self, source_post_id: &str) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .replies
            .iter()
            .any(|r| r.source_post_id == source_post_id))
    }

    async fn get_reply(&self, id: i64) -> Result<Option<PendingReply>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .replies
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list_by_status(&self, status: ReplyStatus) -> Result<Vec<PendingReply>> {
        let mut rows: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .replies
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn oldest_pending(&self) -> Result<Option<PendingReply>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .replies
            .iter()
            .filter(|r| r.status == ReplyStatus::Pending)
            .min_by_key(|r| r.id)
            .cloned())
    }

    async fn count_by_status(&self, status: ReplyStatus) -> Result<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .replies
            .iter()
            .filter(|r| r.status == status)
            .count() as i64)
    }

    async fn resolve_posted(
        &self,
        id: i64,
        final_text: &str,
        posted_reply_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner
            .replies
            .iter_mut()
            .find(|r| r.id == id && r.status == ReplyStatus::Pending)
        else {
            return Ok(false);
        };
        row.status = ReplyStatus::Posted;
        row.final_text = Some(final_text.to_string());
        row.posted_reply_id = Some(posted_reply_id.to_string());
        row.resolved_at = Some(now);
        Ok(true)
    }

    async fn resolve_rejected(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner
            .replies
            .iter_mut()
            .find(|r| r.id == id && r.status == ReplyStatus::Pending)
        else {
            return Ok(false);
        };
        row.status = ReplyStatus::Rejected;
        row.resolved_at = Some(now);
        Ok(true)
    }

    async fn reject_all_pending(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut count = 0;
        for row in inner
            .replies
            .iter_mut()
            .filter(|r| r.status == ReplyStatus::Pending)
        {
            row.status = ReplyStatus::Rejected;
            row.resolved_at = Some(now);
            count += 1;
        }
        Ok(count)
    }

    async fn replace_payload(&self, id: i64, payload: &ReplyPayload) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner.replies.iter_mut().find(|r| {
            r.id == id && matches!(r.status, ReplyStatus::Pending | ReplyStatus::New)
        }) else {
            return Ok(false);
        };
        row.payload = Some(payload.clone());
        row.status = ReplyStatus::Pending;
        Ok(true)
    }

    async fn add_source(&self, kind: SourceKind, identifier: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .sources
            .iter()
            .any(|s| s.kind == kind && s.identifier == identifier)
        {
            return Ok(false);
        }
        let id = inner.next_source_id;
        inner.next_source_id += 1;
        inner.sources.push(TrackedSource {
            id,
            kind,
            identifier: identifier.to_string(),
            status: SourceStatus::Active,
            last_seen_id: None,
            hit_count: 0,
            reply_count: 0,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn remove_source(&self, kind: SourceKind, identifier: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.sources.len();
        inner
            .sources
            .retain(|s| !(s.kind == kind && s.identifier == identifier));
        Ok(inner.sources.len() < before)
    }

    async fn list_sources(&self) -> Result<Vec<TrackedSource>> {
        Ok(self.inner.lock().unwrap().sources.clone())
    }

    async fn active_sources(&self, kind: SourceKind) -> Result<Vec<TrackedSource>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sources
            .iter()
            .filter(|s| s.kind == kind && s.status == SourceStatus::Active)
            .cloned()
            .collect())
    }

    async fn set_source_status(
        &self,
        kind: SourceKind,
        identifier: &str,
        status: SourceStatus,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner
            .sources
            .iter_mut()
            .find(|s| s.kind == kind && s.identifier == identifier)
        else {
            return Ok(false);
        };
        row.status = status;
        Ok(true)
    }

    async fn advance_cursor(&self, id: i64, last_seen_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner.sources.iter_mut().find(|s| s.id == id) {
            row.last_seen_id = Some(last_seen_id.to_string());
        }
        Ok(())
    }

    async fn increment_hit_count(&self, kind: SourceKind, identifier: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner
            .sources
            .iter_mut()
            .find(|s| s.kind == kind && s.identifier == identifier)
        {
            row.hit_count += 1;
        }
        Ok(())
    }

    async fn increment_reply_count(&self, kind: SourceKind, identifier: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner
            .sources
            .iter_mut()
            .find(|s| s.kind == kind && s.identifier == identifier)
        {
            row.reply_count += 1;
        }
        Ok(())
    }

    async fn insert_replied_author(&self, row: &RepliedAuthor) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .replied
            .iter()
            .any(|r| r.author == row.author && r.source_post_id == row.source_post_id)
        {
            return Ok(());
        }
        inner.replied.push(row.clone());
        Ok(())
    }

    async fn due_feedback(
        &self,
        window_days: i64,
        cooldown_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<RepliedAuthor>> {
        let window_start = now - chrono::Duration::days(window_days);
        let cooldown_cutoff = now - chrono::Duration::hours(cooldown_hours);
        let mut rows: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .replied
            .iter()
            .filter(|r| r.created_at >= window_start && r.last_checked_at <= cooldown_cutoff)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.last_checked_at);
        Ok(rows)
    }

    async fn update_feedback(
        &self,
        author: &str,
        source_post_id: &str,
        followed_back: bool,
        engagement: EngagementSnapshot,
        got_reply_back: bool,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner
            .replied
            .iter_mut()
            .find(|r| r.author == author && r.source_post_id == source_post_id)
        {
            row.followed_back = followed_back;
            row.engagement = engagement;
            row.got_reply_back = got_reply_back;
            row.last_checked_at = checked_at;
        }
        Ok(())
    }

    async fn touch_checked(
        &self,
        author: &str,
        source_post_id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner
            .replied
            .iter_mut()
            .find(|r| r.author == author && r.source_post_id == source_post_id)
        {
            row.last_checked_at = checked_at;
        }
        Ok(())
    }

    async fn feedback_totals(&self) -> Result<(i64, i64, i64)> {
        let inner = self.inner.lock().unwrap();
        let total = inner.replied.len() as i64;
        let follow_backs = inner.replied.iter().filter(|r| r.followed_back).count() as i64;
        let reply_backs = inner.replied.iter().filter(|r| r.got_reply_back).count() as i64;
        Ok((total, follow_backs, reply_backs))
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockSource {
    accounts: HashMap<String, Vec<CandidateItem>>,
    searches: HashMap<String, Vec<CandidateItem>>,
    communities: HashMap<String, Vec<CandidateItem>>,
    followers: HashMap<String, Vec<String>>,
    engagement: HashMap<String, EngagementSnapshot>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_account(mut self, username: &str, posts: Vec<CandidateItem>) -> Self {
        self.accounts.insert(username.to_string(), posts);
        self
    }

    pub fn on_search(mut self, query: &str, posts: Vec<CandidateItem>) -> Self {
        self.searches.insert(query.to_string(), posts);
        self
    }

    pub fn on_community(mut self, community_id: &str, posts: Vec<CandidateItem>) -> Self {
        self.communities.insert(community_id.to_string(), posts);
        self
    }

    pub fn on_followers(mut self, username: &str, handles: Vec<String>) -> Self {
        self.followers.insert(username.to_string(), handles);
        self
    }

    pub fn on_engagement(mut self, post_id: &str, snapshot: EngagementSnapshot) -> Self {
        self.engagement.insert(post_id.to_string(), snapshot);
        self
    }
}

#[async_trait]
impl ContentSource for MockSource {
    async fn account_posts(
        &self,
        username: &str,
        _since_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<CandidateItem>> {
        let mut posts = self.accounts.get(username).cloned().unwrap_or_default();
        posts.truncate(limit as usize);
        Ok(posts)
    }

    async fn search_posts(&self, query: &str, limit: u32) -> Result<Vec<CandidateItem>> {
        let mut posts = self.searches.get(query).cloned().unwrap_or_default();
        posts.truncate(limit as usize);
        Ok(posts)
    }

    async fn community_posts(&self, community_id: &str, limit: u32) -> Result<Vec<CandidateItem>> {
        let mut posts = self.communities.get(community_id).cloned().unwrap_or_default();
        posts.truncate(limit as usize);
        Ok(posts)
    }

    async fn post_engagement(&self, post_id: &str) -> Result<EngagementSnapshot> {
        self.engagement
            .get(post_id)
            .copied()
            .ok_or_else(|| anyhow!("no engagement registered for {post_id}"))
    }

    async fn followers(&self, username: &str, _limit: u32) -> Result<Vec<String>> {
        Ok(self.followers.get(username).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedDraft {
    pub source_text: String,
    pub instructions: Option<String>,
    pub had_prior: bool,
}

enum GeneratorMode {
    Payload(ReplyPayload),
    Failing(String),
}

pub struct MockGenerator {
    mode: GeneratorMode,
    calls: Mutex<Vec<RecordedDraft>>,
}

impl MockGenerator {
    pub fn single(text: &str) -> Self {
        Self {
            mode: GeneratorMode::Payload(ReplyPayload::Single {
                text: text.to_string(),
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn payload(payload: ReplyPayload) -> Self {
        Self {
            mode: GeneratorMode::Payload(payload),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            mode: GeneratorMode::Failing(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedDraft> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyGenerator for MockGenerator {
    async fn draft(
        &self,
        source_text: &str,
        instructions: Option<&str>,
        prior: Option<&ReplyPayload>,
    ) -> Result<ReplyPayload> {
        self.calls.lock().unwrap().push(RecordedDraft {
            source_text: source_text.to_string(),
            instructions: instructions.map(|s| s.to_string()),
            had_prior: prior.is_some(),
        });
        match &self.mode {
            GeneratorMode::Payload(payload) => Ok(payload.clone()),
            GeneratorMode::Failing(message) => Err(anyhow!("{message}")),
        }
    }
}

// ---------------------------------------------------------------------------
// MockPublisher
// ---------------------------------------------------------------------------

enum PublishMode {
    Success,
    AuthFailed(String),
    RateLimited(String),
    Other(String),
}

pub struct MockPublisher {
    mode: PublishMode,
    published: Mutex<Vec<(String, Option<String>)>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            mode: PublishMode::Success,
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn auth_failed(message: &str) -> Self {
        Self {
            mode: PublishMode::AuthFailed(message.to_string()),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn rate_limited(message: &str) -> Self {
        Self {
            mode: PublishMode::RateLimited(message.to_string()),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            mode: PublishMode::Other(message.to_string()),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Every successful publish call as (text, reply_to).
    pub fn published(&self) -> Vec<(String, Option<String>)> {
        self.published.lock().unwrap().clone()
    }
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplyPublisher for MockPublisher {
    async fn publish(
        &self,
        text: &str,
        reply_to: Option<&str>,
    ) -> std::result::Result<String, PublishError> {
        match &self.mode {
            PublishMode::Success => {
                let mut published = self.published.lock().unwrap();
                published.push((text.to_string(), reply_to.map(|s| s.to_string())));
                Ok(format!("posted_{}", published.len()))
            }
            PublishMode::AuthFailed(message) => Err(PublishError::Auth(message.clone())),
            PublishMode::RateLimited(message) => Err(PublishError::RateLimited(message.clone())),
            PublishMode::Other(message) => Err(PublishError::Other(message.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// MockNotifier
// ---------------------------------------------------------------------------

pub struct MockNotifier {
    sent: Mutex<Vec<String>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, text: &str) -> Result<i64> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(text.to_string());
        Ok(sent.len() as i64)
    }
}
