//! Approval state machine: command grammar + resolution transitions.
//!
//! Parsing is an ordered (pattern, constructor) list, first match wins, with
//! a reply-to-notification shorthand tried after the explicit forms. Every
//! resolution goes through the store's conditional updates, so a second
//! resolution of the same id reports "already resolved" instead of
//! overwriting.

use std::sync::Arc;
use std::sync::LazyLock;

use anyhow::Result;
use chrono::Utc;
use regex::Regex;
use tracing::{info, warn};

use replyflow_common::{RepliedAuthor, ReplyStatus};

use crate::traits::{ReplyPublisher, ReplyStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalCommand {
    /// Approve by id, optionally selecting a labeled option. Empty ids
    /// targets the oldest pending row.
    Approve { ids: Vec<i64>, option: Option<String> },
    Reject { ids: Vec<i64> },
    RejectAll,
    /// Bare option letter: approve the oldest pending row with that option.
    SelectOption { letter: String },
    /// Operator-supplied text replaces the draft entirely.
    Edit { id: i64, text: String },
}

static APPROVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:1|approve)((?:\s+#\d+)+)(?:\s+([a-zA-Z]))?$").unwrap());
static REJECT_ALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:2|reject)\s+all$").unwrap());
static REJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:2|reject)((?:\s+#\d+)+)$").unwrap());
static EDIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)^#(\d+)\s+(.+)$").unwrap());
static OPTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([a-zA-Z])$").unwrap());
static REPLY_APPROVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^1(?:\s+([a-zA-Z]))?$").unwrap());
static ID_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\d+)").unwrap());

fn parse_ids(list: &str) -> Vec<i64> {
    ID_MARKER_RE
        .captures_iter(list)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// Parse operator input against the approval grammar. `replied_to` is the
/// text of the notification the operator replied to, if any; its `#<id>`
/// marker resolves the shorthand forms. Returns None when nothing matched.
pub fn parse(input: &str, replied_to: Option<&str>) -> Option<ApprovalCommand> {
    let text = input.trim();

    if let Some(caps) = APPROVE_RE.captures(text) {
        return Some(ApprovalCommand::Approve {
            ids: parse_ids(&caps[1]),
            option: caps.get(2).map(|m| m.as_str().to_lowercase()),
        });
    }
    if REJECT_ALL_RE.is_match(text) {
        return Some(ApprovalCommand::RejectAll);
    }
    if let Some(caps) = REJECT_RE.captures(text) {
        return Some(ApprovalCommand::Reject {
            ids: parse_ids(&caps[1]),
        });
    }
    if let Some(caps) = EDIT_RE.captures(text) {
        return Some(ApprovalCommand::Edit {
            id: caps[1].parse().ok()?,
            text: caps[2].to_string(),
        });
    }

    // Shorthand against the replied-to notification's id.
    if let Some(id) = replied_to.and_then(|r| {
        ID_MARKER_RE
            .captures(r)
            .and_then(|c| c[1].parse::<i64>().ok())
    }) {
        if let Some(caps) = REPLY_APPROVE_RE.captures(text) {
            return Some(ApprovalCommand::Approve {
                ids: vec![id],
                option: caps.get(1).map(|m| m.as_str().to_lowercase()),
            });
        }
        if text == "2" {
            return Some(ApprovalCommand::Reject { ids: vec![id] });
        }
        if let Some(caps) = OPTION_RE.captures(text) {
            return Some(ApprovalCommand::Approve {
                ids: vec![id],
                option: Some(caps[1].to_lowercase()),
            });
        }
        if !text.is_empty() {
            return Some(ApprovalCommand::Edit {
                id,
                text: text.to_string(),
            });
        }
    }

    if let Some(caps) = OPTION_RE.captures(text) {
        return Some(ApprovalCommand::SelectOption {
            letter: caps[1].to_lowercase(),
        });
    }
    if text == "1" {
        return Some(ApprovalCommand::Approve {
            ids: vec![],
            option: None,
        });
    }

    None
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

pub struct ApprovalEngine {
    store: Arc<dyn ReplyStore>,
    publisher: Arc<dyn ReplyPublisher>,
}

impl ApprovalEngine {
    pub fn new(store: Arc<dyn ReplyStore>, publisher: Arc<dyn ReplyPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Execute one command. Always returns exactly one operator-visible
    /// response.
    pub async fn handle(&self, command: ApprovalCommand) -> Result<String> {
        match command {
            ApprovalCommand::Approve { ids, option } => self.approve(ids, option).await,
            ApprovalCommand::Reject { ids } => self.reject(ids).await,
            ApprovalCommand::RejectAll => {
                let count = self.store.reject_all_pending(Utc::now()).await?;
                Ok(format!("Rejected {count} pending replies."))
            }
            ApprovalCommand::SelectOption { letter } => {
                self.approve(vec![], Some(letter)).await
            }
            ApprovalCommand::Edit { id, text } => self.publish_reply(id, Some(text)).await,
        }
    }

    async fn approve(&self, mut ids: Vec<i64>, option: Option<String>) -> Result<String> {
        if ids.is_empty() {
            match self.store.oldest_pending().await? {
                Some(reply) => ids.push(reply.id),
                None => return Ok("Nothing pending.".to_string()),
            }
        }

        let mut lines = Vec::new();
        for id in ids {
            let line = match self.resolve_draft_text(id, option.as_deref()).await? {
                Ok(text) => self.publish_reply_text(id, text).await?,
                Err(message) => message,
            };
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    /// Look up the draft text an approve would publish. The outer Result is
    /// operational failure; the inner Err is an operator-facing refusal.
    async fn resolve_draft_text(
        &self,
        id: i64,
        option: Option<&str>,
    ) -> Result<std::result::Result<String, String>> {
        let Some(reply) = self.store.get_reply(id).await? else {
            return Ok(Err(format!("#{id}: not found.")));
        };
        // `new` is not resolved, just draftless. The regenerate hint matters.
        if reply.status == ReplyStatus::New {
            return Ok(Err(format!("#{id}: no draft yet. Regenerate it first.")));
        }
        if reply.status != ReplyStatus::Pending {
            return Ok(Err(format!("#{id}: already resolved ({}).", reply.status)));
        }
        let Some(payload) = &reply.payload else {
            return Ok(Err(format!("#{id}: no draft yet. Regenerate it first.")));
        };
        let text = match option {
            Some(letter) => payload.select(letter),
            None => payload.default_text(),
        };
        match text {
            Some(text) => Ok(Ok(text.to_string())),
            None => Ok(Err(format!(
                "#{id}: no option '{}' in the draft.",
                option.unwrap_or("?")
            ))),
        }
    }

    async fn reject(&self, ids: Vec<i64>) -> Result<String> {
        let mut lines = Vec::new();
        for id in ids {
            let line = if self.store.resolve_rejected(id, Utc::now()).await? {
                format!("#{id}: rejected.")
            } else {
                format!("#{id}: not found or already resolved.")
            };
            lines.push(line);
        }
        if lines.is_empty() {
            return Ok("No ids given.".to_string());
        }
        Ok(lines.join("\n"))
    }

    /// Edit path: operator text replaces the draft entirely.
    async fn publish_reply(&self, id: i64, custom_text: Option<String>) -> Result<String> {
        match custom_text {
            Some(text) => {
                let Some(reply) = self.store.get_reply(id).await? else {
                    return Ok(format!("#{id}: not found."));
                };
                if reply.status == ReplyStatus::New {
                    return Ok(format!("#{id}: no draft yet. Regenerate it first."));
                }
                if reply.status != ReplyStatus::Pending {
                    return Ok(format!("#{id}: already resolved ({}).", reply.status));
                }
                self.publish_reply_text(id, text).await
            }
            None => self.approve(vec![id], None).await,
        }
    }

    /// Publish `text` as the reply for row `id` and run the post-publish
    /// bookkeeping. The row is re-read inside so the conditional update is
    /// still the arbiter.
    async fn publish_reply_text(&self, id: i64, text: String) -> Result<String> {
        let Some(reply) = self.store.get_reply(id).await? else {
            return Ok(format!("#{id}: not found."));
        };
        if reply.status == ReplyStatus::New {
            return Ok(format!("#{id}: no draft yet. Regenerate it first."));
        }
        if reply.status != ReplyStatus::Pending {
            return Ok(format!("#{id}: already resolved ({}).", reply.status));
        }

        let posted_id = match self
            .publisher
            .publish(&text, Some(&reply.source_post_id))
            .await
        {
            Ok(posted_id) => posted_id,
            Err(e) => {
                warn!(reply_id = id, error = %e, "publish failed");
                return Ok(e
                    .operator_alert()
                    .unwrap_or_else(|| format!("#{id}: posting failed ({e}). Still pending.")));
            }
        };

        let now = Utc::now();
        if !self.store.resolve_posted(id, &text, &posted_id, now).await? {
            // Lost the race to another resolution after a successful publish.
            warn!(reply_id = id, "row resolved concurrently after publish");
            return Ok(format!("#{id}: already resolved."));
        }

        self.store
            .insert_replied_author(&RepliedAuthor {
                author: reply.source_author.clone(),
                source_post_id: reply.source_post_id.clone(),
                pending_reply_id: id,
                followers_at_reply: reply.author_followers,
                provenance: reply.provenance.clone(),
                posted_reply_id: posted_id.clone(),
                followed_back: false,
                engagement: Default::default(),
                got_reply_back: false,
                last_checked_at: now,
                created_at: now,
            })
            .await?;
        self.store
            .increment_reply_count(reply.provenance.kind, &reply.provenance.label)
            .await?;

        info!(reply_id = id, posted_id = %posted_id, "reply published");
        Ok(format!(
            "✅ #{id}: posted reply to @{} ({})",
            reply.source_author, posted_id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_with_id_and_option() {
        assert_eq!(
            parse("1 #42", None),
            Some(ApprovalCommand::Approve {
                ids: vec![42],
                option: None
            })
        );
        assert_eq!(
            parse("1 #42 #43 b", None),
            Some(ApprovalCommand::Approve {
                ids: vec![42, 43],
                option: Some("b".to_string())
            })
        );
    }

    #[test]
    fn reject_forms() {
        assert_eq!(parse("2 all", None), Some(ApprovalCommand::RejectAll));
        assert_eq!(
            parse("2 #7 #8", None),
            Some(ApprovalCommand::Reject { ids: vec![7, 8] })
        );
    }

    #[test]
    fn edit_keeps_newlines() {
        let cmd = parse("#42 first line\nsecond line", None);
        assert_eq!(
            cmd,
            Some(ApprovalCommand::Edit {
                id: 42,
                text: "first line\nsecond line".to_string()
            })
        );
    }

    #[test]
    fn bare_letter_selects_option_on_oldest() {
        assert_eq!(
            parse("b", None),
            Some(ApprovalCommand::SelectOption {
                letter: "b".to_string()
            })
        );
    }

    #[test]
    fn reply_shorthand_resolves_id_from_notification() {
        let notification = "💬 Reply candidate #42\n@alice ...";
        assert_eq!(
            parse("1", Some(notification)),
            Some(ApprovalCommand::Approve {
                ids: vec![42],
                option: None
            })
        );
        assert_eq!(
            parse("2", Some(notification)),
            Some(ApprovalCommand::Reject { ids: vec![42] })
        );
        assert_eq!(
            parse("b", Some(notification)),
            Some(ApprovalCommand::Approve {
                ids: vec![42],
                option: Some("b".to_string())
            })
        );
        assert_eq!(
            parse("use this text instead", Some(notification)),
            Some(ApprovalCommand::Edit {
                id: 42,
                text: "use this text instead".to_string()
            })
        );
    }

    #[test]
    fn explicit_id_wins_over_reply_shorthand() {
        let notification = "💬 Reply candidate #42";
        assert_eq!(
            parse("1 #7", Some(notification)),
            Some(ApprovalCommand::Approve {
                ids: vec![7],
                option: None
            })
        );
    }

    #[test]
    fn garbage_matches_nothing() {
        assert_eq!(parse("what is going on", None), None);
        assert_eq!(parse("", None), None);
    }
}
