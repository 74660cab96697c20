//! Discovery — the three ingestion strategies.
//!
//! Account polling takes the single newest post per account per cycle and
//! always advances the last-seen cursor past everything fetched, so a burst
//! of posts between polls is never retried. Search and community polling
//! share one per-cycle candidate cap; overflow is dropped, not carried
//! over.
//!
//! A cycle is phase 1 only: fetch + dedup + filter across every source
//! before any generation call, so one failing source cannot starve the rest.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};

use replyflow_common::{CandidateItem, SourceKind, TrackedSource};

use crate::filter::QualityFilter;
use crate::traits::{ContentSource, ReplyStore};

/// Posts older than this are ignored by account polling, in hours. On-demand
/// fetch bypasses it.
const POLL_WINDOW_HOURS: i64 = 1;

const ACCOUNT_FETCH_LIMIT: u32 = 20;
const SEARCH_FETCH_LIMIT: u32 = 30;

/// Per-cycle counters, logged after each discovery pass.
#[derive(Debug, Default, Clone)]
pub struct DiscoveryStats {
    pub sources_checked: usize,
    pub posts_fetched: usize,
    pub duplicates: usize,
    pub filtered: usize,
    pub overflow_dropped: usize,
    pub accepted: usize,
    pub errors: usize,
}

impl fmt::Display for DiscoveryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sources checked: {} fetched, {} duplicate, {} filtered, {} overflow, {} queued, {} errors",
            self.sources_checked,
            self.posts_fetched,
            self.duplicates,
            self.filtered,
            self.overflow_dropped,
            self.accepted,
            self.errors
        )
    }
}

pub struct DiscoveryEngine {
    source: Arc<dyn ContentSource>,
    store: Arc<dyn ReplyStore>,
    filter: QualityFilter,
    min_followers: i64,
    max_followers: i64,
    max_candidates: usize,
    fetch_delay: Duration,
}

impl DiscoveryEngine {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: Arc<dyn ReplyStore>,
        filter: QualityFilter,
        min_followers: i64,
        max_followers: i64,
        max_candidates: usize,
    ) -> Self {
        Self {
            source,
            store,
            filter,
            min_followers,
            max_followers,
            max_candidates,
            fetch_delay: Duration::from_millis(1000),
        }
    }

    /// Zero out the inter-fetch delay. Tests only.
    pub fn without_fetch_delay(mut self) -> Self {
        self.fetch_delay = Duration::ZERO;
        self
    }

    // -----------------------------------------------------------------------
    // Account polling
    // -----------------------------------------------------------------------

    /// One polling pass over every active account source. Returns at most one
    /// candidate per account.
    pub async fn poll_accounts(&self) -> Result<(Vec<CandidateItem>, DiscoveryStats)> {
        let sources = self.store.active_sources(SourceKind::Account).await?;
        let mut stats = DiscoveryStats::default();
        let mut candidates = Vec::new();
        let now = Utc::now();

        for (i, tracked) in sources.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.fetch_delay).await;
            }
            stats.sources_checked += 1;

            let posts = match self
                .source
                .account_posts(
                    &tracked.identifier,
                    tracked.last_seen_id.as_deref(),
                    ACCOUNT_FETCH_LIMIT,
                )
                .await
            {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(account = %tracked.identifier, error = %e, "account poll failed");
                    stats.errors += 1;
                    continue;
                }
            };
            if posts.is_empty() {
                continue;
            }
            stats.posts_fetched += posts.len();

            // Cursor moves past everything fetched, queued or not. Gaps are
            // intentional: one candidate per account per cycle bounds cost.
            let newest = &posts[0];
            self.store
                .advance_cursor(tracked.id, &newest.post_id)
                .await?;

            let fresh = match newest.created_at {
                Some(created) if now - created <= chrono::Duration::hours(POLL_WINDOW_HOURS) => {
                    true
                }
                _ => false,
            };
            if !fresh {
                debug!(account = %tracked.identifier, post = %newest.post_id, "newest post outside poll window");
                stats.filtered += 1;
                continue;
            }

            if let Some(candidate) = self.vet(newest.clone(), &mut stats).await? {
                candidates.push(candidate);
            }
        }

        stats.accepted = candidates.len();
        Ok((candidates, stats))
    }

    /// On-demand fetch of an account's newest post. Bypasses the poll window
    /// but not dedup or the quality filter.
    pub async fn fetch_latest(&self, username: &str) -> Result<Option<CandidateItem>> {
        let posts = self.source.account_posts(username, None, 1).await?;
        let Some(newest) = posts.into_iter().next() else {
            return Ok(None);
        };
        let mut stats = DiscoveryStats::default();
        self.vet(newest, &mut stats).await
    }

    // -----------------------------------------------------------------------
    // Search + community polling
    // -----------------------------------------------------------------------

    /// One pass over every active search query and community. All sources
    /// share a single candidate cap for the cycle.
    pub async fn run_search_cycle(&self) -> Result<(Vec<CandidateItem>, DiscoveryStats)> {
        let mut stats = DiscoveryStats::default();
        let mut candidates: Vec<CandidateItem> = Vec::new();

        let queries = self.store.active_sources(SourceKind::Search).await?;
        let communities = self.store.active_sources(SourceKind::Community).await?;

        let mut first = true;
        for tracked in queries.iter().chain(communities.iter()) {
            if !first {
                tokio::time::sleep(self.fetch_delay).await;
            }
            first = false;
            stats.sources_checked += 1;

            let posts = match self.fetch_for(tracked).await {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(source = %tracked.identifier, kind = %tracked.kind, error = %e, "search fetch failed");
                    stats.errors += 1;
                    continue;
                }
            };
            stats.posts_fetched += posts.len();

            for post in posts {
                if !self.follower_range_ok(&post) {
                    stats.filtered += 1;
                    continue;
                }
                let Some(candidate) = self.vet(post, &mut stats).await? else {
                    continue;
                };
                if candidates.len() >= self.max_candidates {
                    stats.overflow_dropped += 1;
                    continue;
                }
                candidates.push(candidate);
            }
        }

        stats.accepted = candidates.len();
        Ok((candidates, stats))
    }

    async fn fetch_for(&self, tracked: &TrackedSource) -> Result<Vec<CandidateItem>> {
        match tracked.kind {
            SourceKind::Search => {
                self.source
                    .search_posts(&tracked.identifier, SEARCH_FETCH_LIMIT)
                    .await
            }
            SourceKind::Community => {
                self.source
                    .community_posts(&tracked.identifier, SEARCH_FETCH_LIMIT)
                    .await
            }
            SourceKind::Account => {
                self.source
                    .account_posts(&tracked.identifier, None, ACCOUNT_FETCH_LIMIT)
                    .await
            }
        }
    }

    fn follower_range_ok(&self, post: &CandidateItem) -> bool {
        match post.follower_count {
            Some(count) => count >= self.min_followers && count <= self.max_followers,
            None => false,
        }
    }

    /// Dedup + quality check for one post. Updates `stats`; returns the
    /// candidate only when it should proceed to generation.
    async fn vet(
        &self,
        post: CandidateItem,
        stats: &mut DiscoveryStats,
    ) -> Result<Option<CandidateItem>> {
        if self.store.has_pending(&post.post_id).await? {
            stats.duplicates += 1;
            return Ok(None);
        }
        if let Err(reason) = self.filter.check(&post, Utc::now()) {
            debug!(post = %post.post_id, reason = reason.as_str(), "candidate filtered");
            stats.filtered += 1;
            return Ok(None);
        }
        Ok(Some(post))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, MockSource};
    use replyflow_common::Provenance;

    fn post(id: &str, text: &str, followers: i64) -> CandidateItem {
        CandidateItem {
            post_id: id.to_string(),
            text: text.to_string(),
            author: format!("author_{id}"),
            url: format!("https://x.com/a/status/{id}"),
            created_at: Some(Utc::now()),
            follower_count: Some(followers),
            is_reply: Some(false),
            provenance: Provenance {
                kind: SourceKind::Search,
                label: "rust".to_string(),
            },
        }
    }

    fn engine(source: MockSource, store: Arc<MemoryStore>) -> DiscoveryEngine {
        DiscoveryEngine::new(
            Arc::new(source),
            store,
            QualityFilter::new(vec![]),
            50,
            50_000,
            5,
        )
        .without_fetch_delay()
    }

    #[tokio::test]
    async fn search_cycle_filters_short_posts() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_source(SourceKind::Search, "rust")
            .await
            .unwrap();
        let source = MockSource::new().on_search(
            "rust",
            vec![
                post("1", "ok", 500),
                post("2", "a genuinely substantial post about borrow checking", 500),
            ],
        );

        let (candidates, stats) = engine(source, store).run_search_cycle().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].post_id, "2");
        assert_eq!(stats.filtered, 1);
    }

    #[tokio::test]
    async fn search_cycle_enforces_follower_range_and_cap() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_source(SourceKind::Search, "rust")
            .await
            .unwrap();
        let mut posts = vec![post("tiny", "small account posting about rust stuff", 3)];
        for i in 0..8 {
            posts.push(post(
                &format!("p{i}"),
                "a genuinely substantial post about borrow checking",
                500,
            ));
        }
        let source = MockSource::new().on_search("rust", posts);

        let (candidates, stats) = engine(source, store).run_search_cycle().await.unwrap();
        assert_eq!(candidates.len(), 5);
        assert_eq!(stats.overflow_dropped, 3);
        assert_eq!(stats.filtered, 1);
    }

    #[tokio::test]
    async fn poll_takes_newest_only_and_advances_cursor() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_source(SourceKind::Account, "alice")
            .await
            .unwrap();
        let source = MockSource::new().on_account(
            "alice",
            vec![
                post("30", "newest post with enough text to pass the filter", 500),
                post("20", "older post with enough text to pass the filter", 500),
                post("10", "oldest post with enough text to pass the filter", 500),
            ],
        );

        let (candidates, _) = engine(source, store.clone()).poll_accounts().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].post_id, "30");

        let sources = store.list_sources().await.unwrap();
        assert_eq!(sources[0].last_seen_id.as_deref(), Some("30"));
    }

    #[tokio::test]
    async fn poll_skips_posts_outside_window_but_fetch_latest_does_not() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_source(SourceKind::Account, "alice")
            .await
            .unwrap();
        let mut old = post("9", "an older post with enough text to pass the filter", 500);
        old.created_at = Some(Utc::now() - chrono::Duration::hours(3));
        old.provenance.kind = SourceKind::Account;
        let source = MockSource::new().on_account("alice", vec![old]);
        let engine = engine(source, store);

        let (candidates, stats) = engine.poll_accounts().await.unwrap();
        assert!(candidates.is_empty());
        assert_eq!(stats.filtered, 1);

        let fetched = engine.fetch_latest("alice").await.unwrap();
        assert_eq!(fetched.unwrap().post_id, "9");
    }

    #[tokio::test]
    async fn duplicate_across_poll_and_search_vetted_once() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_source(SourceKind::Search, "rust")
            .await
            .unwrap();
        store.seed_pending_for("12345").await;
        let source = MockSource::new().on_search(
            "rust",
            vec![post("12345", "a genuinely substantial post about rust", 500)],
        );

        let (candidates, stats) = engine(source, store).run_search_cycle().await.unwrap();
        assert!(candidates.is_empty());
        assert_eq!(stats.duplicates, 1);
    }
}
