//! Operator command router.
//!
//! Free-text input is matched against an ordered pattern list, first match
//! wins, and anything unmatched falls through to the approval grammar and
//! finally to a guaranteed "not understood" response. Every input produces
//! exactly one reply message.

use std::sync::Arc;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::error;

use replyflow_common::{ReplyStatus, SourceKind, SourceStatus};

use crate::approval::{self, ApprovalCommand, ApprovalEngine};
use crate::discovery::DiscoveryEngine;
use crate::generation::GenerationStage;
use crate::scheduler::{Pipeline, Scheduler};
use crate::traits::{ReplyGenerator, ReplyStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    StartPipeline(Pipeline),
    StopPipeline(Pipeline),
    RunPipeline(Pipeline),
    AddSource { kind: SourceKind, identifier: String },
    RemoveSource { kind: SourceKind, identifier: String },
    /// Keep the source and its counters, stop polling it.
    SetSourceStatus {
        kind: SourceKind,
        identifier: String,
        status: SourceStatus,
    },
    ListSources,
    /// On-demand fetch-and-generate for one account. Bypasses the poll window.
    Fetch { username: String },
    /// Regenerate a draft: by id or the newest pending row, with optional
    /// free-form instructions for the generator.
    Regenerate {
        id: Option<i64>,
        instructions: Option<String>,
    },
    Status,
    Approval(ApprovalCommand),
    NotUnderstood,
}

static START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^start\s+(poll|polling|search|feedback)$").unwrap());
static STOP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^stop\s+(poll|polling|search|feedback)$").unwrap());
static RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^run\s+(poll|polling|search|feedback)$").unwrap());
static ADD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^add\s+(account|query|search|community)\s+(.+)$").unwrap()
});
static REMOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^remove\s+(account|query|search|community)\s+(.+)$").unwrap()
});
static PAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(pause|resume)\s+(account|query|search|community)\s+(.+)$").unwrap()
});
static LIST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^list(\s+sources)?$").unwrap());
static FETCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^fetch\s+@?(\w+)$").unwrap());
static REGEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(?:3|regen(?:erate)?)(?:\s+#(\d+))?(?:\s+(.+))?$").unwrap()
});
static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^status$").unwrap());

fn parse_pipeline(word: &str) -> Pipeline {
    match word.to_lowercase().as_str() {
        "search" => Pipeline::Search,
        "feedback" => Pipeline::Feedback,
        _ => Pipeline::Poll,
    }
}

fn parse_kind(word: &str) -> SourceKind {
    match word.to_lowercase().as_str() {
        "query" | "search" => SourceKind::Search,
        "community" => SourceKind::Community,
        _ => SourceKind::Account,
    }
}

/// Parse operator input. `replied_to` carries the text of the notification
/// the operator replied to, if any.
pub fn parse_command(input: &str, replied_to: Option<&str>) -> OperatorCommand {
    let text = input.trim();

    if let Some(caps) = START_RE.captures(text) {
        return OperatorCommand::StartPipeline(parse_pipeline(&caps[1]));
    }
    if let Some(caps) = STOP_RE.captures(text) {
        return OperatorCommand::StopPipeline(parse_pipeline(&caps[1]));
    }
    if let Some(caps) = RUN_RE.captures(text) {
        return OperatorCommand::RunPipeline(parse_pipeline(&caps[1]));
    }
    if let Some(caps) = ADD_RE.captures(text) {
        return OperatorCommand::AddSource {
            kind: parse_kind(&caps[1]),
            identifier: caps[2].trim().trim_start_matches('@').to_string(),
        };
    }
    if let Some(caps) = REMOVE_RE.captures(text) {
        return OperatorCommand::RemoveSource {
            kind: parse_kind(&caps[1]),
            identifier: caps[2].trim().trim_start_matches('@').to_string(),
        };
    }
    if let Some(caps) = PAUSE_RE.captures(text) {
        let status = if caps[1].eq_ignore_ascii_case("pause") {
            SourceStatus::Paused
        } else {
            SourceStatus::Active
        };
        return OperatorCommand::SetSourceStatus {
            kind: parse_kind(&caps[2]),
            identifier: caps[3].trim().trim_start_matches('@').to_string(),
            status,
        };
    }
    if LIST_RE.is_match(text) {
        return OperatorCommand::ListSources;
    }
    if let Some(caps) = FETCH_RE.captures(text) {
        return OperatorCommand::Fetch {
            username: caps[1].to_string(),
        };
    }
    if let Some(caps) = REGEN_RE.captures(text) {
        return OperatorCommand::Regenerate {
            id: caps.get(1).and_then(|m| m.as_str().parse().ok()),
            instructions: caps.get(2).map(|m| m.as_str().trim().to_string()),
        };
    }
    if STATUS_RE.is_match(text) {
        return OperatorCommand::Status;
    }
    if let Some(command) = approval::parse(text, replied_to) {
        return OperatorCommand::Approval(command);
    }
    OperatorCommand::NotUnderstood
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub struct CommandRouter {
    scheduler: Arc<Scheduler>,
    discovery: Arc<DiscoveryEngine>,
    generation: Arc<GenerationStage>,
    approval: Arc<ApprovalEngine>,
    store: Arc<dyn ReplyStore>,
    generator: Arc<dyn ReplyGenerator>,
}

impl CommandRouter {
    pub fn new(
        scheduler: Arc<Scheduler>,
        discovery: Arc<DiscoveryEngine>,
        generation: Arc<GenerationStage>,
        approval: Arc<ApprovalEngine>,
        store: Arc<dyn ReplyStore>,
        generator: Arc<dyn ReplyGenerator>,
    ) -> Self {
        Self {
            scheduler,
            discovery,
            generation,
            approval,
            store,
            generator,
        }
    }

    /// Handle one operator message. Always returns a response; internal
    /// errors become an operator-visible failure line.
    pub async fn handle(&self, input: &str, replied_to: Option<&str>) -> String {
        let command = parse_command(input, replied_to);
        match self.execute(command).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "command handling failed");
                format!("⚠️ Something went wrong: {e}")
            }
        }
    }

    async fn execute(&self, command: OperatorCommand) -> Result<String> {
        match command {
            OperatorCommand::StartPipeline(pipeline) => {
                self.scheduler.control().set_enabled(pipeline, true);
                Ok(format!("▶️ {pipeline} pipeline started."))
            }
            OperatorCommand::StopPipeline(pipeline) => {
                self.scheduler.control().set_enabled(pipeline, false);
                Ok(format!("⏸ {pipeline} pipeline stopped."))
            }
            OperatorCommand::RunPipeline(pipeline) => {
                let queued = match pipeline {
                    Pipeline::Poll => self.scheduler.run_poll_cycle().await?,
                    Pipeline::Search => self.scheduler.run_search_cycle().await?,
                    Pipeline::Feedback => {
                        self.scheduler.run_feedback_cycle().await?;
                        return Ok("Feedback cycle complete.".to_string());
                    }
                };
                Ok(format!("{pipeline} cycle complete, {queued} replies queued."))
            }
            OperatorCommand::AddSource { kind, identifier } => {
                if self.store.add_source(kind, &identifier).await? {
                    Ok(format!("Added {kind} source: {identifier}"))
                } else {
                    Ok(format!("Already tracking {kind} source: {identifier}"))
                }
            }
            OperatorCommand::RemoveSource { kind, identifier } => {
                if self.store.remove_source(kind, &identifier).await? {
                    Ok(format!("Removed {kind} source: {identifier}"))
                } else {
                    Ok(format!("Not tracking {kind} source: {identifier}"))
                }
            }
            OperatorCommand::SetSourceStatus {
                kind,
                identifier,
                status,
            } => {
                if self.store.set_source_status(kind, &identifier, status).await? {
                    let verb = match status {
                        SourceStatus::Paused => "Paused",
                        SourceStatus::Active => "Resumed",
                    };
                    Ok(format!("{verb} {kind} source: {identifier}"))
                } else {
                    Ok(format!("Not tracking {kind} source: {identifier}"))
                }
            }
            OperatorCommand::ListSources => self.list_sources().await,
            OperatorCommand::Fetch { username } => self.fetch(&username).await,
            OperatorCommand::Regenerate { id, instructions } => {
                self.regenerate(id, instructions.as_deref()).await
            }
            OperatorCommand::Status => self.scheduler.status_report().await,
            OperatorCommand::Approval(command) => self.approval.handle(command).await,
            OperatorCommand::NotUnderstood => Ok(
                "🤔 Not understood. Try: status · list · add account <name> · fetch <name> · \
                 1 #<id> (approve) · 2 #<id> (reject) · 2 all · #<id> <text> (edit) · \
                 regen #<id> [instructions]"
                    .to_string(),
            ),
        }
    }

    async fn list_sources(&self) -> Result<String> {
        let sources = self.store.list_sources().await?;
        if sources.is_empty() {
            return Ok("No tracked sources.".to_string());
        }
        let mut out = String::from("Tracked sources:\n");
        for source in sources {
            out.push_str(&format!(
                "• [{}] {} ({}) — {} hits, {} replies\n",
                source.kind,
                source.identifier,
                source.status.as_str(),
                source.hit_count,
                source.reply_count
            ));
        }
        Ok(out.trim_end().to_string())
    }

    async fn fetch(&self, username: &str) -> Result<String> {
        match self.discovery.fetch_latest(username).await? {
            Some(candidate) => {
                let queued = self.generation.process(vec![candidate]).await?;
                if queued > 0 {
                    Ok(format!("Fetched @{username}'s latest post, reply queued."))
                } else {
                    Ok(format!("@{username}'s latest post is already queued."))
                }
            }
            None => Ok(format!(
                "No usable new post from @{username} (already seen or filtered)."
            )),
        }
    }

    async fn regenerate(&self, id: Option<i64>, instructions: Option<&str>) -> Result<String> {
        let reply = match id {
            Some(id) => self.store.get_reply(id).await?,
            None => self
                .store
                .list_by_status(ReplyStatus::Pending)
                .await?
                .into_iter()
                .last(),
        };
        let Some(reply) = reply else {
            return Ok(match id {
                Some(id) => format!("#{id}: not found."),
                None => "Nothing pending to regenerate.".to_string(),
            });
        };
        if reply.status.is_terminal() {
            return Ok(format!("#{}: already resolved ({}).", reply.id, reply.status));
        }

        let payload = match self
            .generator
            .draft(&reply.source_text, instructions, reply.payload.as_ref())
            .await
        {
            Ok(payload) => payload,
            Err(e) => return Ok(format!("#{}: regeneration failed ({e}).", reply.id)),
        };
        if !self.store.replace_payload(reply.id, &payload).await? {
            return Ok(format!("#{}: already resolved.", reply.id));
        }

        let mut out = format!("♻️ #{} regenerated:\n", reply.id);
        match &payload {
            replyflow_common::ReplyPayload::Single { text } => out.push_str(text),
            replyflow_common::ReplyPayload::Options { options } => {
                for option in options {
                    out.push_str(&format!("{}) {}\n", option.label, option.text));
                }
            }
        }
        Ok(out.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipeline_controls() {
        assert_eq!(
            parse_command("start polling", None),
            OperatorCommand::StartPipeline(Pipeline::Poll)
        );
        assert_eq!(
            parse_command("stop search", None),
            OperatorCommand::StopPipeline(Pipeline::Search)
        );
        assert_eq!(
            parse_command("run feedback", None),
            OperatorCommand::RunPipeline(Pipeline::Feedback)
        );
    }

    #[test]
    fn parses_source_management() {
        assert_eq!(
            parse_command("add account @alice", None),
            OperatorCommand::AddSource {
                kind: SourceKind::Account,
                identifier: "alice".to_string()
            }
        );
        assert_eq!(
            parse_command("add query rust async", None),
            OperatorCommand::AddSource {
                kind: SourceKind::Search,
                identifier: "rust async".to_string()
            }
        );
        assert_eq!(
            parse_command("remove community 12345", None),
            OperatorCommand::RemoveSource {
                kind: SourceKind::Community,
                identifier: "12345".to_string()
            }
        );
        assert_eq!(parse_command("list", None), OperatorCommand::ListSources);
        assert_eq!(
            parse_command("pause account alice", None),
            OperatorCommand::SetSourceStatus {
                kind: SourceKind::Account,
                identifier: "alice".to_string(),
                status: SourceStatus::Paused
            }
        );
        assert_eq!(
            parse_command("resume query rust", None),
            OperatorCommand::SetSourceStatus {
                kind: SourceKind::Search,
                identifier: "rust".to_string(),
                status: SourceStatus::Active
            }
        );
    }

    #[test]
    fn parses_regen_variants() {
        assert_eq!(
            parse_command("regen", None),
            OperatorCommand::Regenerate {
                id: None,
                instructions: None
            }
        );
        assert_eq!(
            parse_command("regen #7 make it shorter", None),
            OperatorCommand::Regenerate {
                id: Some(7),
                instructions: Some("make it shorter".to_string())
            }
        );
        assert_eq!(
            parse_command("3 #7", None),
            OperatorCommand::Regenerate {
                id: Some(7),
                instructions: None
            }
        );
    }

    #[test]
    fn approval_grammar_is_the_fallback() {
        assert_eq!(
            parse_command("1 #42", None),
            OperatorCommand::Approval(ApprovalCommand::Approve {
                ids: vec![42],
                option: None
            })
        );
        assert_eq!(
            parse_command("2 all", None),
            OperatorCommand::Approval(ApprovalCommand::RejectAll)
        );
    }

    #[test]
    fn unknown_input_is_not_understood() {
        assert_eq!(
            parse_command("make me a sandwich", None),
            OperatorCommand::NotUnderstood
        );
    }

    #[test]
    fn fetch_strips_at_sign() {
        assert_eq!(
            parse_command("fetch @bob", None),
            OperatorCommand::Fetch {
                username: "bob".to_string()
            }
        );
    }
}
