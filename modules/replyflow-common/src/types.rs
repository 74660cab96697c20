use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tracked sources
// ---------------------------------------------------------------------------

/// What kind of thing a TrackedSource monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// An account username polled for new posts.
    Account,
    /// A keyword search query.
    Search,
    /// A community id polled for recent posts.
    Community,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Account => "account",
            SourceKind::Search => "search",
            SourceKind::Community => "community",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "account" => Some(SourceKind::Account),
            "search" => Some(SourceKind::Search),
            "community" => Some(SourceKind::Community),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Active,
    Paused,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Active => "active",
            SourceStatus::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SourceStatus::Active),
            "paused" => Some(SourceStatus::Paused),
            _ => None,
        }
    }
}

/// A monitored account, search query, or community.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedSource {
    pub id: i64,
    pub kind: SourceKind,
    /// Username, query string, or community id depending on `kind`.
    pub identifier: String,
    pub status: SourceStatus,
    /// Newest post id seen by account polling. Always advances, never retried.
    pub last_seen_id: Option<String>,
    /// Candidates this source has put into the queue.
    pub hit_count: i64,
    /// Replies actually published from this source's candidates.
    pub reply_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Where a candidate came from, carried through to the durable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub kind: SourceKind,
    /// The source identifier: account handle, query text, or community id.
    pub label: String,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.label)
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// A freshly discovered post, not yet committed to durable storage.
/// Produced by the discovery engine, consumed by the generation stage.
#[derive(Debug, Clone)]
pub struct CandidateItem {
    pub post_id: String,
    pub text: String,
    pub author: String,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub follower_count: Option<i64>,
    pub is_reply: Option<bool>,
    pub provenance: Provenance,
}

// ---------------------------------------------------------------------------
// Pending replies
// ---------------------------------------------------------------------------

/// Status of a queued reply. `rejected` and `posted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// Discovered, but reply generation failed. Revived only by an explicit
    /// regenerate command.
    New,
    /// Reply generated, awaiting human decision.
    Pending,
    /// Human declined.
    Rejected,
    /// Publish call returned a new post id.
    Posted,
}

impl ReplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyStatus::New => "new",
            ReplyStatus::Pending => "pending",
            ReplyStatus::Rejected => "rejected",
            ReplyStatus::Posted => "posted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(ReplyStatus::New),
            "pending" => Some(ReplyStatus::Pending),
            "rejected" => Some(ReplyStatus::Rejected),
            "posted" => Some(ReplyStatus::Posted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplyStatus::Rejected | ReplyStatus::Posted)
    }
}

impl std::fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labeled reply option, e.g. `a) nice work`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyOption {
    pub label: String,
    pub text: String,
}

/// The generated reply payload: one string or a labeled option set.
/// Stored as JSONB on the pending_replies row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReplyPayload {
    Single { text: String },
    Options { options: Vec<ReplyOption> },
}

impl ReplyPayload {
    /// The default text when the operator approves without a selector:
    /// the single reply, or the first labeled option.
    pub fn default_text(&self) -> Option<&str> {
        match self {
            ReplyPayload::Single { text } => Some(text),
            ReplyPayload::Options { options } => options.first().map(|o| o.text.as_str()),
        }
    }

    /// Resolve a selector letter against the option set. A `Single` payload
    /// ignores the selector and returns its text.
    pub fn select(&self, selector: &str) -> Option<&str> {
        match self {
            ReplyPayload::Single { text } => Some(text),
            ReplyPayload::Options { options } => options
                .iter()
                .find(|o| o.label.eq_ignore_ascii_case(selector))
                .map(|o| o.text.as_str()),
        }
    }

    pub fn has_options(&self) -> bool {
        matches!(self, ReplyPayload::Options { .. })
    }
}

/// The central durable entity: a candidate that survived filtering and
/// generation, queued for human resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReply {
    pub id: i64,
    /// Unique — the dedup contract. One row per source post, ever.
    pub source_post_id: String,
    pub source_text: String,
    pub source_author: String,
    pub source_url: String,
    /// None when generation failed at discovery time (status `new`).
    pub payload: Option<ReplyPayload>,
    /// Null until resolved; the text actually published.
    pub final_text: Option<String>,
    pub status: ReplyStatus,
    pub provenance: Provenance,
    pub author_followers: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Id of the published reply post, set on successful publish.
    pub posted_reply_id: Option<String>,
}

/// Insert shape for a pending reply. The store assigns the row id.
#[derive(Debug, Clone)]
pub struct NewPendingReply {
    pub source_post_id: String,
    pub source_text: String,
    pub source_author: String,
    pub source_url: String,
    pub payload: Option<ReplyPayload>,
    pub status: ReplyStatus,
    pub provenance: Provenance,
    pub author_followers: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Replied authors (feedback loop)
// ---------------------------------------------------------------------------

/// Engagement metrics snapshot for a published reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementSnapshot {
    pub likes: i64,
    pub retweets: i64,
    pub views: i64,
    pub replies: i64,
}

/// One row per (author, source post) once a reply is actually published.
/// Mutated only by the feedback loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepliedAuthor {
    pub author: String,
    pub source_post_id: String,
    pub pending_reply_id: i64,
    pub followers_at_reply: Option<i64>,
    pub provenance: Provenance,
    pub posted_reply_id: String,
    pub followed_back: bool,
    pub engagement: EngagementSnapshot,
    pub got_reply_back: bool,
    pub last_checked_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
