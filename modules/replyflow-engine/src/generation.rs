//! Generation — turn vetted candidates into queued pending replies.
//!
//! The only bounded-parallel stage: drafts run in fixed-size concurrent
//! batches against the rate-limited generator. Store writes stay sequential.
//! A draft failure still inserts the row (status `new`, no payload) so the
//! post is not re-surfaced next cycle; the operator can regenerate it by id.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures::{stream, StreamExt};
use tracing::{info, warn};

use replyflow_common::{CandidateItem, NewPendingReply, ReplyPayload, ReplyStatus};

use crate::traits::{Notifier, ReplyGenerator, ReplyStore};

const DRAFT_CONCURRENCY: usize = 3;
const EXCERPT_MAX_CHARS: usize = 240;

pub struct GenerationStage {
    generator: Arc<dyn ReplyGenerator>,
    store: Arc<dyn ReplyStore>,
    notifier: Arc<dyn Notifier>,
    max_per_cycle: usize,
}

impl GenerationStage {
    pub fn new(
        generator: Arc<dyn ReplyGenerator>,
        store: Arc<dyn ReplyStore>,
        notifier: Arc<dyn Notifier>,
        max_per_cycle: usize,
    ) -> Self {
        Self {
            generator,
            store,
            notifier,
            max_per_cycle,
        }
    }

    /// Draft replies for up to `max_per_cycle` candidates and queue them.
    /// Returns how many rows were inserted.
    pub async fn process(&self, mut candidates: Vec<CandidateItem>) -> Result<usize> {
        if candidates.len() > self.max_per_cycle {
            candidates.truncate(self.max_per_cycle);
        }
        if candidates.is_empty() {
            return Ok(0);
        }

        let drafts: Vec<(CandidateItem, Option<ReplyPayload>)> = stream::iter(candidates)
            .map(|candidate| async {
                let draft = self.generator.draft(&candidate.text, None, None).await;
                let payload = match draft {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(post = %candidate.post_id, error = %e, "reply generation failed");
                        None
                    }
                };
                (candidate, payload)
            })
            .buffer_unordered(DRAFT_CONCURRENCY)
            .collect()
            .await;

        let mut queued = 0;
        for (candidate, payload) in drafts {
            let status = if payload.is_some() {
                ReplyStatus::Pending
            } else {
                ReplyStatus::New
            };
            let row = NewPendingReply {
                source_post_id: candidate.post_id.clone(),
                source_text: candidate.text.clone(),
                source_author: candidate.author.clone(),
                source_url: candidate.url.clone(),
                payload: payload.clone(),
                status,
                provenance: candidate.provenance.clone(),
                author_followers: candidate.follower_count,
                created_at: Utc::now(),
            };

            // A concurrent cycle may have inserted the same post; None means
            // the dedup constraint absorbed it.
            let Some(id) = self.store.insert_pending(&row).await? else {
                continue;
            };
            queued += 1;
            self.store
                .increment_hit_count(candidate.provenance.kind, &candidate.provenance.label)
                .await?;

            if let Some(payload) = &payload {
                let message = format_candidate_notification(id, &candidate, payload);
                if let Err(e) = self.notifier.notify(&message).await {
                    warn!(reply_id = id, error = %e, "candidate notification failed");
                }
            }
        }

        info!(queued, "generation cycle complete");
        Ok(queued)
    }
}

/// The message the approval grammar later resolves ids from, so the `#<id>`
/// marker in the first line is part of the contract.
pub fn format_candidate_notification(
    id: i64,
    candidate: &CandidateItem,
    payload: &ReplyPayload,
) -> String {
    let followers = candidate
        .follower_count
        .map(|n| format!("{n} followers"))
        .unwrap_or_else(|| "followers unknown".to_string());

    let mut excerpt: String = candidate.text.chars().take(EXCERPT_MAX_CHARS).collect();
    if candidate.text.chars().count() > EXCERPT_MAX_CHARS {
        excerpt.push('…');
    }

    let mut out = format!(
        "💬 Reply candidate #{id}\n@{} ({followers}) via {}\n{}\n\n\"{excerpt}\"\n",
        candidate.author, candidate.provenance, candidate.url
    );

    match payload {
        ReplyPayload::Single { text } => {
            out.push_str(&format!("\nDraft:\n{text}\n"));
        }
        ReplyPayload::Options { options } => {
            out.push_str("\nDrafts:\n");
            for option in options {
                out.push_str(&format!("{}) {}\n", option.label, option.text));
            }
        }
    }
    out.push_str(&format!(
        "\n1 #{id} = approve · 2 #{id} = reject · #{id} <text> = edit"
    ));
    out
}
