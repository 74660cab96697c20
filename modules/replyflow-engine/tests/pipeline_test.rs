//! End-to-end pipeline tests over the in-memory test doubles: discovery
//! through approval through publish, driven by operator messages.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use replyflow_common::{
    CandidateItem, PendingReply, Provenance, ReplyPayload, ReplyStatus, SourceKind,
};
use replyflow_engine::approval::ApprovalEngine;
use replyflow_engine::commands::CommandRouter;
use replyflow_engine::discovery::DiscoveryEngine;
use replyflow_engine::feedback::FeedbackLoop;
use replyflow_engine::filter::QualityFilter;
use replyflow_engine::generation::GenerationStage;
use replyflow_engine::scheduler::{PipelineControl, Scheduler};
use replyflow_engine::testing::{
    MemoryStore, MockGenerator, MockNotifier, MockPublisher, MockSource,
};
use replyflow_engine::traits::ReplyStore;

struct Harness {
    store: Arc<MemoryStore>,
    publisher: Arc<MockPublisher>,
    notifier: Arc<MockNotifier>,
    generator: Arc<MockGenerator>,
    scheduler: Arc<Scheduler>,
    router: CommandRouter,
}

impl Harness {
    fn new(source: MockSource, generator: MockGenerator, publisher: MockPublisher) -> Self {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(publisher);
        let notifier = Arc::new(MockNotifier::new());
        let generator = Arc::new(generator);
        let source = Arc::new(source);

        let discovery = Arc::new(
            DiscoveryEngine::new(
                source.clone(),
                store.clone(),
                QualityFilter::new(vec!["operator".to_string()]),
                50,
                50_000,
                5,
            )
            .without_fetch_delay(),
        );
        let generation = Arc::new(GenerationStage::new(
            generator.clone(),
            store.clone(),
            notifier.clone(),
            5,
        ));
        let feedback = Arc::new(FeedbackLoop::new(
            source,
            store.clone(),
            notifier.clone(),
            "operator".to_string(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            discovery.clone(),
            generation.clone(),
            feedback,
            store.clone(),
            Arc::new(PipelineControl::new()),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        ));
        let approval = Arc::new(ApprovalEngine::new(store.clone(), publisher.clone()));
        let router = CommandRouter::new(
            scheduler.clone(),
            discovery,
            generation,
            approval,
            store.clone(),
            generator.clone(),
        );

        Self {
            store,
            publisher,
            notifier,
            generator,
            scheduler,
            router,
        }
    }
}

fn pending_reply(id: i64, source_post_id: &str, draft: &str) -> PendingReply {
    PendingReply {
        id,
        source_post_id: source_post_id.to_string(),
        source_text: "a thoughtful post about rust worth replying to".to_string(),
        source_author: "alice".to_string(),
        source_url: format!("https://x.com/alice/status/{source_post_id}"),
        payload: Some(ReplyPayload::Single {
            text: draft.to_string(),
        }),
        final_text: None,
        status: ReplyStatus::Pending,
        provenance: Provenance {
            kind: SourceKind::Search,
            label: "rust".to_string(),
        },
        author_followers: Some(800),
        created_at: Utc::now(),
        resolved_at: None,
        posted_reply_id: None,
    }
}

fn post(id: &str, text: &str) -> CandidateItem {
    CandidateItem {
        post_id: id.to_string(),
        text: text.to_string(),
        author: "bob".to_string(),
        url: format!("https://x.com/bob/status/{id}"),
        created_at: Some(Utc::now()),
        follower_count: Some(900),
        is_reply: Some(false),
        provenance: Provenance {
            kind: SourceKind::Search,
            label: "rust".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Discovery scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_post_id_across_poll_and_search_yields_one_row() {
    let mut account_post = post("12345", "an interesting post about rust from a tracked account");
    account_post.provenance = Provenance {
        kind: SourceKind::Account,
        label: "bob".to_string(),
    };
    let source = MockSource::new()
        .on_account("bob", vec![account_post])
        .on_search(
            "rust",
            vec![post("12345", "an interesting post about rust from a tracked account")],
        );
    let harness = Harness::new(source, MockGenerator::single("nice"), MockPublisher::new());
    harness.store.add_source(SourceKind::Account, "bob").await.unwrap();
    harness.store.add_source(SourceKind::Search, "rust").await.unwrap();

    harness.scheduler.run_poll_cycle().await.unwrap();
    harness.scheduler.run_search_cycle().await.unwrap();

    let pending = harness.store.list_by_status(ReplyStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].source_post_id, "12345");
}

#[tokio::test]
async fn two_char_post_never_reaches_generation() {
    let source = MockSource::new().on_search("rust", vec![post("1", "ok")]);
    let harness = Harness::new(source, MockGenerator::single("nice"), MockPublisher::new());
    harness.store.add_source(SourceKind::Search, "rust").await.unwrap();

    harness.scheduler.run_search_cycle().await.unwrap();

    assert!(harness.generator.calls().is_empty());
    assert_eq!(
        harness.store.count_by_status(ReplyStatus::Pending).await.unwrap(),
        0
    );
}

// ---------------------------------------------------------------------------
// Approval scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn approve_publishes_draft_and_records_replied_author() {
    let harness = Harness::new(
        MockSource::new(),
        MockGenerator::single("unused"),
        MockPublisher::new(),
    );
    harness.store.add_source(SourceKind::Search, "rust").await.unwrap();
    harness.store.push_reply(pending_reply(42, "src42", "nice work")).await;

    let response = harness.router.handle("1 #42", None).await;
    assert!(response.contains("posted"), "unexpected response: {response}");

    let published = harness.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "nice work");
    assert_eq!(published[0].1.as_deref(), Some("src42"));

    let row = harness.store.get_reply(42).await.unwrap().unwrap();
    assert_eq!(row.status, ReplyStatus::Posted);
    assert_eq!(row.final_text.as_deref(), Some("nice work"));
    assert!(row.resolved_at.is_some());

    let replied = harness.store.replied_authors().await;
    assert_eq!(replied.len(), 1);
    assert_eq!(replied[0].author, "alice");
    assert_eq!(replied[0].pending_reply_id, 42);

    let sources = harness.store.list_sources().await.unwrap();
    assert_eq!(sources[0].reply_count, 1);
}

#[tokio::test]
async fn reject_all_rejects_everything_with_zero_publishes() {
    let harness = Harness::new(
        MockSource::new(),
        MockGenerator::single("unused"),
        MockPublisher::new(),
    );
    for id in [1, 2, 3] {
        harness
            .store
            .push_reply(pending_reply(id, &format!("src{id}"), "draft"))
            .await;
    }

    let response = harness.router.handle("2 all", None).await;
    assert!(response.contains("3"), "unexpected response: {response}");

    assert_eq!(
        harness.store.count_by_status(ReplyStatus::Rejected).await.unwrap(),
        3
    );
    assert!(harness.publisher.published().is_empty());
}

#[tokio::test]
async fn rate_limited_publish_keeps_row_pending_with_one_alert() {
    let harness = Harness::new(
        MockSource::new(),
        MockGenerator::single("unused"),
        MockPublisher::rate_limited("429 too many requests"),
    );
    harness.store.push_reply(pending_reply(42, "src42", "nice work")).await;

    let response = harness.router.handle("1 #42", None).await;
    assert!(response.contains("rate limited"), "unexpected response: {response}");

    let row = harness.store.get_reply(42).await.unwrap().unwrap();
    assert_eq!(row.status, ReplyStatus::Pending);
    assert!(row.final_text.is_none());
    // The alert is the single command response; no extra notifications fire.
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn second_resolution_of_same_id_is_a_reported_noop() {
    let harness = Harness::new(
        MockSource::new(),
        MockGenerator::single("unused"),
        MockPublisher::new(),
    );
    harness.store.push_reply(pending_reply(42, "src42", "nice work")).await;

    let first = harness.router.handle("1 #42", None).await;
    assert!(first.contains("posted"));
    let second = harness.router.handle("1 #42", None).await;
    assert!(second.contains("already resolved"), "unexpected: {second}");
    let third = harness.router.handle("2 #42", None).await;
    assert!(third.contains("already resolved"), "unexpected: {third}");

    assert_eq!(harness.publisher.published().len(), 1);
    assert_eq!(
        harness.store.get_reply(42).await.unwrap().unwrap().status,
        ReplyStatus::Posted
    );
}

#[tokio::test]
async fn edit_publishes_operator_text_with_newlines() {
    let harness = Harness::new(
        MockSource::new(),
        MockGenerator::single("unused"),
        MockPublisher::new(),
    );
    harness.store.push_reply(pending_reply(7, "src7", "draft text")).await;

    let response = harness.router.handle("#7 my own words\nsecond line", None).await;
    assert!(response.contains("posted"), "unexpected response: {response}");

    let published = harness.publisher.published();
    assert_eq!(published[0].0, "my own words\nsecond line");
    let row = harness.store.get_reply(7).await.unwrap().unwrap();
    assert_eq!(row.final_text.as_deref(), Some("my own words\nsecond line"));
}

#[tokio::test]
async fn reply_shorthand_resolves_id_from_notification_text() {
    let harness = Harness::new(
        MockSource::new(),
        MockGenerator::single("unused"),
        MockPublisher::new(),
    );
    harness.store.push_reply(pending_reply(42, "src42", "nice work")).await;

    let notification = "💬 Reply candidate #42\n@alice (800 followers)";
    let response = harness.router.handle("1", Some(notification)).await;
    assert!(response.contains("posted"), "unexpected response: {response}");
    assert_eq!(harness.publisher.published().len(), 1);
}

#[tokio::test]
async fn draftless_row_gets_regenerate_hint_not_resolved() {
    let harness = Harness::new(
        MockSource::new(),
        MockGenerator::single("unused"),
        MockPublisher::new(),
    );
    let mut row = pending_reply(42, "src42", "ignored");
    row.status = ReplyStatus::New;
    row.payload = None;
    harness.store.push_reply(row).await;

    let approve = harness.router.handle("1 #42", None).await;
    assert!(approve.contains("no draft yet"), "unexpected: {approve}");
    assert!(!approve.contains("already resolved"), "unexpected: {approve}");

    let edit = harness.router.handle("#42 custom words", None).await;
    assert!(edit.contains("no draft yet"), "unexpected: {edit}");

    assert!(harness.publisher.published().is_empty());
    assert_eq!(
        harness.store.get_reply(42).await.unwrap().unwrap().status,
        ReplyStatus::New
    );

    // Regenerate is the way out: the row becomes pending and approvable.
    let harness2 = Harness::new(
        MockSource::new(),
        MockGenerator::single("a real draft"),
        MockPublisher::new(),
    );
    let mut row = pending_reply(7, "src7", "ignored");
    row.status = ReplyStatus::New;
    row.payload = None;
    harness2.store.push_reply(row).await;
    harness2.router.handle("regen #7", None).await;
    let approve = harness2.router.handle("1 #7", None).await;
    assert!(approve.contains("posted"), "unexpected: {approve}");
}

// ---------------------------------------------------------------------------
// Regeneration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn regeneration_replaces_payload_and_nothing_else() {
    let harness = Harness::new(
        MockSource::new(),
        MockGenerator::single("a fresh take"),
        MockPublisher::new(),
    );
    harness.store.push_reply(pending_reply(42, "src42", "stale draft")).await;
    let before = harness.store.get_reply(42).await.unwrap().unwrap();

    let response = harness.router.handle("regen #42 make it warmer", None).await;
    assert!(response.contains("a fresh take"), "unexpected: {response}");

    let after = harness.store.get_reply(42).await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.source_post_id, before.source_post_id);
    assert_eq!(after.status, ReplyStatus::Pending);
    assert_eq!(
        after.payload,
        Some(ReplyPayload::Single {
            text: "a fresh take".to_string()
        })
    );
    assert_eq!(after.created_at, before.created_at);

    let calls = harness.generator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].instructions.as_deref(), Some("make it warmer"));
    assert!(calls[0].had_prior);
}

#[tokio::test]
async fn regenerating_resolved_row_is_refused() {
    let harness = Harness::new(
        MockSource::new(),
        MockGenerator::single("a fresh take"),
        MockPublisher::new(),
    );
    let mut row = pending_reply(42, "src42", "draft");
    row.status = ReplyStatus::Posted;
    harness.store.push_reply(row).await;

    let response = harness.router.handle("regen #42", None).await;
    assert!(response.contains("already resolved"), "unexpected: {response}");
    assert!(harness.generator.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Router plumbing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_input_gets_not_understood_response() {
    let harness = Harness::new(
        MockSource::new(),
        MockGenerator::single("unused"),
        MockPublisher::new(),
    );
    let response = harness.router.handle("do the thing", None).await;
    assert!(response.contains("Not understood"), "unexpected: {response}");
}

#[tokio::test]
async fn status_reports_pipelines_and_counts() {
    let harness = Harness::new(
        MockSource::new(),
        MockGenerator::single("unused"),
        MockPublisher::new(),
    );
    harness.store.push_reply(pending_reply(1, "src1", "draft")).await;
    harness.router.handle("stop search", None).await;

    let response = harness.router.handle("status", None).await;
    assert!(response.contains("search: paused"), "unexpected: {response}");
    assert!(response.contains("poll: running"));
    assert!(response.contains("1 pending"));
}

#[tokio::test]
async fn paused_source_is_skipped_by_discovery() {
    let source = MockSource::new().on_search(
        "rust",
        vec![post("1", "a genuinely substantial post about borrow checking")],
    );
    let harness = Harness::new(source, MockGenerator::single("nice"), MockPublisher::new());
    harness.store.add_source(SourceKind::Search, "rust").await.unwrap();

    harness.router.handle("pause query rust", None).await;
    harness.scheduler.run_search_cycle().await.unwrap();
    assert_eq!(
        harness.store.count_by_status(ReplyStatus::Pending).await.unwrap(),
        0
    );

    harness.router.handle("resume query rust", None).await;
    harness.scheduler.run_search_cycle().await.unwrap();
    assert_eq!(
        harness.store.count_by_status(ReplyStatus::Pending).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn stopped_pipeline_resumes_on_start() {
    let harness = Harness::new(
        MockSource::new(),
        MockGenerator::single("unused"),
        MockPublisher::new(),
    );
    harness.router.handle("stop poll", None).await;
    let response = harness.router.handle("start poll", None).await;
    assert!(response.contains("started"), "unexpected: {response}");
    let status = harness.router.handle("status", None).await;
    assert!(status.contains("poll: running"));
}
