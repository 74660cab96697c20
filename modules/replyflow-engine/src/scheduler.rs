//! Scheduler — three independent, pausable interval loops.
//!
//! Pausing flips a flag read at the top of each tick; an in-flight cycle
//! always runs to completion. All scheduler state lives in one injectable
//! struct so pause/resume and the status report are testable without a
//! live timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use replyflow_common::ReplyStatus;

use crate::discovery::DiscoveryEngine;
use crate::feedback::FeedbackLoop;
use crate::generation::GenerationStage;
use crate::traits::ReplyStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipeline {
    Poll,
    Search,
    Feedback,
}

impl Pipeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Poll => "poll",
            Pipeline::Search => "search",
            Pipeline::Feedback => "feedback",
        }
    }

    pub fn all() -> [Pipeline; 3] {
        [Pipeline::Poll, Pipeline::Search, Pipeline::Feedback]
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct PipelineState {
    enabled: bool,
    last_run: Option<DateTime<Utc>>,
}

/// Enabled flags and last-run timestamps for every pipeline. Shared between
/// the scheduler loops and the operator command handlers.
pub struct PipelineControl {
    inner: Mutex<HashMap<Pipeline, PipelineState>>,
}

impl PipelineControl {
    /// All pipelines start enabled.
    pub fn new() -> Self {
        let mut map = HashMap::new();
        for pipeline in Pipeline::all() {
            map.insert(
                pipeline,
                PipelineState {
                    enabled: true,
                    last_run: None,
                },
            );
        }
        Self {
            inner: Mutex::new(map),
        }
    }

    pub fn is_enabled(&self, pipeline: Pipeline) -> bool {
        self.inner.lock().unwrap()[&pipeline].enabled
    }

    pub fn set_enabled(&self, pipeline: Pipeline, enabled: bool) {
        self.inner
            .lock()
            .unwrap()
            .get_mut(&pipeline)
            .expect("all pipelines registered at construction")
            .enabled = enabled;
    }

    pub fn mark_run(&self, pipeline: Pipeline, at: DateTime<Utc>) {
        self.inner
            .lock()
            .unwrap()
            .get_mut(&pipeline)
            .expect("all pipelines registered at construction")
            .last_run = Some(at);
    }

    pub fn last_run(&self, pipeline: Pipeline) -> Option<DateTime<Utc>> {
        self.inner.lock().unwrap()[&pipeline].last_run
    }
}

impl Default for PipelineControl {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    discovery: Arc<DiscoveryEngine>,
    generation: Arc<GenerationStage>,
    feedback: Arc<FeedbackLoop>,
    store: Arc<dyn ReplyStore>,
    control: Arc<PipelineControl>,
    poll_interval: Duration,
    search_interval: Duration,
    feedback_interval: Duration,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        discovery: Arc<DiscoveryEngine>,
        generation: Arc<GenerationStage>,
        feedback: Arc<FeedbackLoop>,
        store: Arc<dyn ReplyStore>,
        control: Arc<PipelineControl>,
        poll_interval: Duration,
        search_interval: Duration,
        feedback_interval: Duration,
    ) -> Self {
        Self {
            discovery,
            generation,
            feedback,
            store,
            control,
            poll_interval,
            search_interval,
            feedback_interval,
        }
    }

    pub fn control(&self) -> &Arc<PipelineControl> {
        &self.control
    }

    /// One account-polling cycle: discovery phase 1, then generation.
    pub async fn run_poll_cycle(&self) -> Result<usize> {
        let (candidates, stats) = self.discovery.poll_accounts().await?;
        info!(pipeline = %Pipeline::Poll, %stats, "discovery cycle done");
        let queued = self.generation.process(candidates).await?;
        self.control.mark_run(Pipeline::Poll, Utc::now());
        Ok(queued)
    }

    /// One search + community cycle.
    pub async fn run_search_cycle(&self) -> Result<usize> {
        let (candidates, stats) = self.discovery.run_search_cycle().await?;
        info!(pipeline = %Pipeline::Search, %stats, "discovery cycle done");
        let queued = self.generation.process(candidates).await?;
        self.control.mark_run(Pipeline::Search, Utc::now());
        Ok(queued)
    }

    /// One feedback cycle.
    pub async fn run_feedback_cycle(&self) -> Result<()> {
        self.feedback.run_cycle().await?;
        self.control.mark_run(Pipeline::Feedback, Utc::now());
        Ok(())
    }

    /// Drive all three loops forever. Each tick checks its enabled flag; a
    /// cycle error is logged and the loop keeps going.
    pub async fn run(self: Arc<Self>) {
        let poll = {
            let this = self.clone();
            async move {
                let mut ticker = tokio::time::interval(this.poll_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if !this.control.is_enabled(Pipeline::Poll) {
                        continue;
                    }
                    if let Err(e) = this.run_poll_cycle().await {
                        error!(pipeline = %Pipeline::Poll, error = %e, "cycle failed");
                    }
                }
            }
        };
        let search = {
            let this = self.clone();
            async move {
                let mut ticker = tokio::time::interval(this.search_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if !this.control.is_enabled(Pipeline::Search) {
                        continue;
                    }
                    if let Err(e) = this.run_search_cycle().await {
                        error!(pipeline = %Pipeline::Search, error = %e, "cycle failed");
                    }
                }
            }
        };
        let feedback = {
            let this = self.clone();
            async move {
                let mut ticker = tokio::time::interval(this.feedback_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if !this.control.is_enabled(Pipeline::Feedback) {
                        continue;
                    }
                    if let Err(e) = this.run_feedback_cycle().await {
                        error!(pipeline = %Pipeline::Feedback, error = %e, "cycle failed");
                    }
                }
            }
        };
        tokio::join!(poll, search, feedback);
    }

    /// Operator-facing status summary.
    pub async fn status_report(&self) -> Result<String> {
        let mut out = String::from("📊 Status\n");
        for pipeline in Pipeline::all() {
            let state = if self.control.is_enabled(pipeline) {
                "running"
            } else {
                "paused"
            };
            let last = self
                .control
                .last_run(pipeline)
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "never".to_string());
            out.push_str(&format!("{pipeline}: {state}, last run {last}\n"));
        }

        let pending = self.store.count_by_status(ReplyStatus::Pending).await?;
        let posted = self.store.count_by_status(ReplyStatus::Posted).await?;
        out.push_str(&format!("\nReplies: {pending} pending, {posted} posted\n"));

        let (total, follow_backs, reply_backs) = self.store.feedback_totals().await?;
        out.push_str(&format!(
            "Feedback: {total} replied authors, {follow_backs} follow-backs, {reply_backs} reply-backs"
        ));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipelines_start_enabled_and_toggle() {
        let control = PipelineControl::new();
        for pipeline in Pipeline::all() {
            assert!(control.is_enabled(pipeline));
        }
        control.set_enabled(Pipeline::Search, false);
        assert!(!control.is_enabled(Pipeline::Search));
        assert!(control.is_enabled(Pipeline::Poll));
        control.set_enabled(Pipeline::Search, true);
        assert!(control.is_enabled(Pipeline::Search));
    }

    #[test]
    fn mark_run_records_timestamp_per_pipeline() {
        let control = PipelineControl::new();
        assert!(control.last_run(Pipeline::Poll).is_none());
        let now = Utc::now();
        control.mark_run(Pipeline::Poll, now);
        assert_eq!(control.last_run(Pipeline::Poll), Some(now));
        assert!(control.last_run(Pipeline::Search).is_none());
    }
}
