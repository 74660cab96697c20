//! Feedback loop — measure what published replies earned.
//!
//! One batch follower fetch serves every follow-back check in the cycle.
//! Writes are unconditional and idempotent; the summary notification fires
//! only when something changed. A per-author failure still advances
//! last_checked_at so an unreachable author does not hog every cycle.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::traits::{ContentSource, Notifier, ReplyStore};

const WINDOW_DAYS: i64 = 7;
const COOLDOWN_HOURS: i64 = 4;
const FOLLOWER_FETCH_LIMIT: u32 = 1000;

pub struct FeedbackLoop {
    source: Arc<dyn ContentSource>,
    store: Arc<dyn ReplyStore>,
    notifier: Arc<dyn Notifier>,
    /// The operator's own handle, whose follower list answers the
    /// follow-back question.
    operator_username: String,
}

impl FeedbackLoop {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: Arc<dyn ReplyStore>,
        notifier: Arc<dyn Notifier>,
        operator_username: String,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            operator_username,
        }
    }

    pub async fn run_cycle(&self) -> Result<()> {
        let now = Utc::now();
        let due = self.store.due_feedback(WINDOW_DAYS, COOLDOWN_HOURS, now).await?;
        if due.is_empty() {
            return Ok(());
        }

        let followers: HashSet<String> = match self
            .source
            .followers(&self.operator_username, FOLLOWER_FETCH_LIMIT)
            .await
        {
            Ok(handles) => handles.into_iter().map(|h| h.to_lowercase()).collect(),
            Err(e) => {
                // Follow-back flags are monotonic, so an empty set never
                // regresses a row.
                warn!(error = %e, "follower fetch failed, skipping follow-back checks");
                HashSet::new()
            }
        };

        let mut checked = 0usize;
        let mut new_follow_backs = 0usize;
        let mut new_reply_backs = 0usize;
        let mut errors = 0usize;

        for row in due {
            let checked_at = Utc::now();
            let engagement = match self.source.post_engagement(&row.posted_reply_id).await {
                Ok(engagement) => engagement,
                Err(e) => {
                    warn!(author = %row.author, post = %row.posted_reply_id, error = %e, "feedback check failed");
                    errors += 1;
                    self.store
                        .touch_checked(&row.author, &row.source_post_id, checked_at)
                        .await?;
                    continue;
                }
            };

            let followed_back =
                row.followed_back || followers.contains(&row.author.to_lowercase());
            // Approximation: the detail endpoint only exposes a reply count,
            // not who replied, so any reply to our reply sets the flag.
            let got_reply_back = row.got_reply_back || engagement.replies > 0;

            if followed_back && !row.followed_back {
                new_follow_backs += 1;
            }
            if got_reply_back && !row.got_reply_back {
                new_reply_backs += 1;
            }

            self.store
                .update_feedback(
                    &row.author,
                    &row.source_post_id,
                    followed_back,
                    engagement,
                    got_reply_back,
                    checked_at,
                )
                .await?;
            checked += 1;
        }

        info!(checked, new_follow_backs, new_reply_backs, errors, "feedback cycle done");

        if new_follow_backs > 0 || new_reply_backs > 0 {
            let message = format!(
                "📈 Feedback: {new_follow_backs} new follow-backs, {new_reply_backs} new replies to your replies ({checked} checked)"
            );
            if let Err(e) = self.notifier.notify(&message).await {
                warn!(error = %e, "feedback summary notification failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, MockNotifier, MockSource};
    use chrono::Duration;
    use replyflow_common::{EngagementSnapshot, Provenance, RepliedAuthor, SourceKind};

    fn replied(author: &str, posted_id: &str) -> RepliedAuthor {
        let past = Utc::now() - Duration::hours(12);
        RepliedAuthor {
            author: author.to_string(),
            source_post_id: format!("src_{author}"),
            pending_reply_id: 1,
            followers_at_reply: Some(300),
            provenance: Provenance {
                kind: SourceKind::Search,
                label: "rust".to_string(),
            },
            posted_reply_id: posted_id.to_string(),
            followed_back: false,
            engagement: EngagementSnapshot::default(),
            got_reply_back: false,
            last_checked_at: past,
            created_at: past,
        }
    }

    fn loop_with(
        source: MockSource,
        store: Arc<MemoryStore>,
        notifier: Arc<MockNotifier>,
    ) -> FeedbackLoop {
        FeedbackLoop::new(Arc::new(source), store, notifier, "operator".to_string())
    }

    #[tokio::test]
    async fn detects_follow_back_and_notifies_once() {
        let store = Arc::new(MemoryStore::new());
        store.insert_replied_author(&replied("alice", "p1")).await.unwrap();
        let notifier = Arc::new(MockNotifier::new());
        let source = MockSource::new()
            .on_followers("operator", vec!["alice".to_string()])
            .on_engagement("p1", EngagementSnapshot::default());

        loop_with(source, store.clone(), notifier.clone())
            .run_cycle()
            .await
            .unwrap();

        let rows = store.replied_authors().await;
        assert!(rows[0].followed_back);
        assert_eq!(notifier.sent().len(), 1);
        assert!(notifier.sent()[0].contains("1 new follow-backs"));
    }

    #[tokio::test]
    async fn no_change_means_no_notification() {
        let store = Arc::new(MemoryStore::new());
        store.insert_replied_author(&replied("alice", "p1")).await.unwrap();
        let notifier = Arc::new(MockNotifier::new());
        let source = MockSource::new()
            .on_followers("operator", vec![])
            .on_engagement("p1", EngagementSnapshot { likes: 3, ..Default::default() });

        loop_with(source, store.clone(), notifier.clone())
            .run_cycle()
            .await
            .unwrap();

        assert!(notifier.sent().is_empty());
        assert_eq!(store.replied_authors().await[0].engagement.likes, 3);
    }

    #[tokio::test]
    async fn per_author_failure_still_advances_checked_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let row = replied("alice", "p_missing");
        let before = row.last_checked_at;
        store.insert_replied_author(&row).await.unwrap();
        let notifier = Arc::new(MockNotifier::new());
        // No engagement registered for p_missing: the mock errors.
        let source = MockSource::new().on_followers("operator", vec![]);

        loop_with(source, store.clone(), notifier.clone())
            .run_cycle()
            .await
            .unwrap();

        assert!(store.replied_authors().await[0].last_checked_at > before);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn reply_back_flag_is_monotonic() {
        let store = Arc::new(MemoryStore::new());
        let mut row = replied("alice", "p1");
        row.got_reply_back = true;
        store.insert_replied_author(&row).await.unwrap();
        let notifier = Arc::new(MockNotifier::new());
        let source = MockSource::new()
            .on_followers("operator", vec![])
            .on_engagement("p1", EngagementSnapshot::default());

        loop_with(source, store.clone(), notifier.clone())
            .run_cycle()
            .await
            .unwrap();

        // Already true, zero replies now: stays true, no "new" notification.
        assert!(store.replied_authors().await[0].got_reply_back);
        assert!(notifier.sent().is_empty());
    }
}
