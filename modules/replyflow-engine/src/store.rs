//! PgStore — the three durable tables behind the pipeline.
//!
//! The uniqueness constraints are load-bearing: source_post_id on
//! pending_replies is the dedup contract, and every resolution runs as a
//! single conditional UPDATE guarded on status='pending'. rows_affected = 0
//! means "already resolved", which callers report rather than overwrite.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use replyflow_common::{
    EngagementSnapshot, NewPendingReply, PendingReply, Provenance, RepliedAuthor, ReplyPayload,
    ReplyStatus, SourceKind, SourceStatus, TrackedSource,
};

use crate::traits::ReplyStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pending_replies (
    id               BIGSERIAL PRIMARY KEY,
    source_post_id   TEXT NOT NULL UNIQUE,
    source_text      TEXT NOT NULL,
    source_author    TEXT NOT NULL,
    source_url       TEXT NOT NULL,
    payload          JSONB,
    final_text       TEXT,
    status           TEXT NOT NULL,
    provenance_kind  TEXT NOT NULL,
    provenance_label TEXT NOT NULL,
    author_followers BIGINT,
    created_at       TIMESTAMPTZ NOT NULL,
    resolved_at      TIMESTAMPTZ,
    posted_reply_id  TEXT
);

CREATE INDEX IF NOT EXISTS idx_pending_replies_status ON pending_replies (status);

CREATE TABLE IF NOT EXISTS tracked_sources (
    id           BIGSERIAL PRIMARY KEY,
    kind         TEXT NOT NULL,
    identifier   TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'active',
    last_seen_id TEXT,
    hit_count    BIGINT NOT NULL DEFAULT 0,
    reply_count  BIGINT NOT NULL DEFAULT 0,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (kind, identifier)
);

CREATE TABLE IF NOT EXISTS replied_authors (
    author             TEXT NOT NULL,
    source_post_id     TEXT NOT NULL,
    pending_reply_id   BIGINT NOT NULL,
    followers_at_reply BIGINT,
    provenance_kind    TEXT NOT NULL,
    provenance_label   TEXT NOT NULL,
    posted_reply_id    TEXT NOT NULL,
    followed_back      BOOLEAN NOT NULL DEFAULT FALSE,
    likes              BIGINT NOT NULL DEFAULT 0,
    retweets           BIGINT NOT NULL DEFAULT 0,
    views              BIGINT NOT NULL DEFAULT 0,
    reply_count        BIGINT NOT NULL DEFAULT 0,
    got_reply_back     BOOLEAN NOT NULL DEFAULT FALSE,
    last_checked_at    TIMESTAMPTZ NOT NULL,
    created_at         TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (author, source_post_id)
);
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they don't exist. Idempotent.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct PendingRow {
    id: i64,
    source_post_id: String,
    source_text: String,
    source_author: String,
    source_url: String,
    payload: Option<serde_json::Value>,
    final_text: Option<String>,
    status: String,
    provenance_kind: String,
    provenance_label: String,
    author_followers: Option<i64>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    posted_reply_id: Option<String>,
}

const PENDING_COLUMNS: &str = "id, source_post_id, source_text, source_author, source_url, \
     payload, final_text, status, provenance_kind, provenance_label, \
     author_followers, created_at, resolved_at, posted_reply_id";

impl PendingRow {
    fn into_reply(self) -> Result<PendingReply> {
        let status = ReplyStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("unknown reply status in store: {}", self.status))?;
        let kind = SourceKind::parse(&self.provenance_kind)
            .ok_or_else(|| anyhow!("unknown source kind in store: {}", self.provenance_kind))?;
        let payload = match self.payload {
            Some(value) => Some(serde_json::from_value(value)?),
            None => None,
        };
        Ok(PendingReply {
            id: self.id,
            source_post_id: self.source_post_id,
            source_text: self.source_text,
            source_author: self.source_author,
            source_url: self.source_url,
            payload,
            final_text: self.final_text,
            status,
            provenance: Provenance {
                kind,
                label: self.provenance_label,
            },
            author_followers: self.author_followers,
            created_at: self.created_at,
            resolved_at: self.resolved_at,
            posted_reply_id: self.posted_reply_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SourceRow {
    id: i64,
    kind: String,
    identifier: String,
    status: String,
    last_seen_id: Option<String>,
    hit_count: i64,
    reply_count: i64,
    created_at: DateTime<Utc>,
}

impl SourceRow {
    fn into_source(self) -> Result<TrackedSource> {
        Ok(TrackedSource {
            id: self.id,
            kind: SourceKind::parse(&self.kind)
                .ok_or_else(|| anyhow!("unknown source kind in store: {}", self.kind))?,
            identifier: self.identifier,
            status: SourceStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("unknown source status in store: {}", self.status))?,
            last_seen_id: self.last_seen_id,
            hit_count: self.hit_count,
            reply_count: self.reply_count,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RepliedRow {
    author: String,
    source_post_id: String,
    pending_reply_id: i64,
    followers_at_reply: Option<i64>,
    provenance_kind: String,
    provenance_label: String,
    posted_reply_id: String,
    followed_back: bool,
    likes: i64,
    retweets: i64,
    views: i64,
    reply_count: i64,
    got_reply_back: bool,
    last_checked_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl RepliedRow {
    fn into_replied(self) -> Result<RepliedAuthor> {
        Ok(RepliedAuthor {
            author: self.author,
            source_post_id: self.source_post_id,
            pending_reply_id: self.pending_reply_id,
            followers_at_reply: self.followers_at_reply,
            provenance: Provenance {
                kind: SourceKind::parse(&self.provenance_kind)
                    .ok_or_else(|| anyhow!("unknown source kind in store: {}", self.provenance_kind))?,
                label: self.provenance_label,
            },
            posted_reply_id: self.posted_reply_id,
            followed_back: self.followed_back,
            engagement: EngagementSnapshot {
                likes: self.likes,
                retweets: self.retweets,
                views: self.views,
                replies: self.reply_count,
            },
            got_reply_back: self.got_reply_back,
            last_checked_at: self.last_checked_at,
            created_at: self.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// ReplyStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl ReplyStore for PgStore {
    async fn insert_pending(&self, reply: &NewPendingReply) -> Result<Option<i64>> {
        let payload = match &reply.payload {
            Some(p) => Some(serde_json::to_value(p)?),
            None => None,
        };
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO pending_replies
                (source_post_id, source_text, source_author, source_url, payload,
                 status, provenance_kind, provenance_label, author_followers, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_post_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&reply.source_post_id)
        .bind(&reply.source_text)
        .bind(&reply.source_author)
        .bind(&reply.source_url)
        .bind(payload)
        .bind(reply.status.as_str())
        .bind(reply.provenance.kind.as_str())
        .bind(&reply.provenance.label)
        .bind(reply.author_followers)
        .bind(reply.created_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| id))
    }

    async fn has_pending(&self, source_post_id: &str) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT 1 FROM pending_replies WHERE source_post_id = $1 LIMIT 1",
        )
        .bind(source_post_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn get_reply(&self, id: i64) -> Result<Option<PendingReply>> {
        let row = sqlx::query_as::<_, PendingRow>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_replies WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PendingRow::into_reply).transpose()
    }

    async fn list_by_status(&self, status: ReplyStatus) -> Result<Vec<PendingReply>> {
        let rows = sqlx::query_as::<_, PendingRow>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_replies WHERE status = $1 ORDER BY id ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PendingRow::into_reply).collect()
    }

    async fn oldest_pending(&self) -> Result<Option<PendingReply>> {
        let row = sqlx::query_as::<_, PendingRow>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_replies \
             WHERE status = 'pending' ORDER BY id ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.map(PendingRow::into_reply).transpose()
    }

    async fn count_by_status(&self, status: ReplyStatus) -> Result<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM pending_replies WHERE status = $1",
        )
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn resolve_posted(
        &self,
        id: i64,
        final_text: &str,
        posted_reply_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pending_replies
            SET status = 'posted', final_text = $2, posted_reply_id = $3, resolved_at = $4
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(final_text)
        .bind(posted_reply_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn resolve_rejected(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pending_replies
            SET status = 'rejected', resolved_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reject_all_pending(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE pending_replies
            SET status = 'rejected', resolved_at = $1
            WHERE status = 'pending'
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn replace_payload(&self, id: i64, payload: &ReplyPayload) -> Result<bool> {
        let value = serde_json::to_value(payload)?;
        let result = sqlx::query(
            r#"
            UPDATE pending_replies
            SET payload = $2, status = 'pending'
            WHERE id = $1 AND status IN ('pending', 'new')
            "#,
        )
        .bind(id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_source(&self, kind: SourceKind, identifier: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO tracked_sources (kind, identifier, status)
            VALUES ($1, $2, 'active')
            ON CONFLICT (kind, identifier) DO NOTHING
            "#,
        )
        .bind(kind.as_str())
        .bind(identifier)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_source(&self, kind: SourceKind, identifier: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tracked_sources WHERE kind = $1 AND identifier = $2")
            .bind(kind.as_str())
            .bind(identifier)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_sources(&self) -> Result<Vec<TrackedSource>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT id, kind, identifier, status, last_seen_id, hit_count, reply_count, created_at \
             FROM tracked_sources ORDER BY kind, identifier",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SourceRow::into_source).collect()
    }

    async fn active_sources(&self, kind: SourceKind) -> Result<Vec<TrackedSource>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT id, kind, identifier, status, last_seen_id, hit_count, reply_count, created_at \
             FROM tracked_sources WHERE kind = $1 AND status = 'active' ORDER BY identifier",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SourceRow::into_source).collect()
    }

    async fn set_source_status(
        &self,
        kind: SourceKind,
        identifier: &str,
        status: SourceStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tracked_sources SET status = $3 WHERE kind = $1 AND identifier = $2",
        )
        .bind(kind.as_str())
        .bind(identifier)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn advance_cursor(&self, id: i64, last_seen_id: &str) -> Result<()> {
        sqlx::query("UPDATE tracked_sources SET last_seen_id = $2 WHERE id = $1")
            .bind(id)
            .bind(last_seen_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment_hit_count(&self, kind: SourceKind, identifier: &str) -> Result<()> {
        sqlx::query(
            "UPDATE tracked_sources SET hit_count = hit_count + 1 \
             WHERE kind = $1 AND identifier = $2",
        )
        .bind(kind.as_str())
        .bind(identifier)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_reply_count(&self, kind: SourceKind, identifier: &str) -> Result<()> {
        sqlx::query(
            "UPDATE tracked_sources SET reply_count = reply_count + 1 \
             WHERE kind = $1 AND identifier = $2",
        )
        .bind(kind.as_str())
        .bind(identifier)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_replied_author(&self, row: &RepliedAuthor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO replied_authors
                (author, source_post_id, pending_reply_id, followers_at_reply,
                 provenance_kind, provenance_label, posted_reply_id,
                 followed_back, likes, retweets, views, reply_count,
                 got_reply_back, last_checked_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (author, source_post_id) DO NOTHING
            "#,
        )
        .bind(&row.author)
        .bind(&row.source_post_id)
        .bind(row.pending_reply_id)
        .bind(row.followers_at_reply)
        .bind(row.provenance.kind.as_str())
        .bind(&row.provenance.label)
        .bind(&row.posted_reply_id)
        .bind(row.followed_back)
        .bind(row.engagement.likes)
        .bind(row.engagement.retweets)
        .bind(row.engagement.views)
        .bind(row.engagement.replies)
        .bind(row.got_reply_back)
        .bind(row.last_checked_at)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
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
        let rows = sqlx::query_as::<_, RepliedRow>(
            r#"
            SELECT author, source_post_id, pending_reply_id, followers_at_reply,
                   provenance_kind, provenance_label, posted_reply_id,
                   followed_back, likes, retweets, views, reply_count,
                   got_reply_back, last_checked_at, created_at
            FROM replied_authors
            WHERE created_at >= $1 AND last_checked_at <= $2
            ORDER BY last_checked_at ASC
            "#,
        )
        .bind(window_start)
        .bind(cooldown_cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RepliedRow::into_replied).collect()
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
        sqlx::query(
            r#"
            UPDATE replied_authors
            SET followed_back = $3, likes = $4, retweets = $5, views = $6,
                reply_count = $7, got_reply_back = $8, last_checked_at = $9
            WHERE author = $1 AND source_post_id = $2
            "#,
        )
        .bind(author)
        .bind(source_post_id)
        .bind(followed_back)
        .bind(engagement.likes)
        .bind(engagement.retweets)
        .bind(engagement.views)
        .bind(engagement.replies)
        .bind(got_reply_back)
        .bind(checked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_checked(
        &self,
        author: &str,
        source_post_id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE replied_authors SET last_checked_at = $3 \
             WHERE author = $1 AND source_post_id = $2",
        )
        .bind(author)
        .bind(source_post_id)
        .bind(checked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn feedback_totals(&self) -> Result<(i64, i64, i64)> {
        let row = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE followed_back),
                   COUNT(*) FILTER (WHERE got_reply_back)
            FROM replied_authors
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
