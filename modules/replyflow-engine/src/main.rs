use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use llm_client::LlmClient;
use replyflow_common::Config;
use telegram_client::TelegramClient;
use x_client::XClient;

use replyflow_engine::approval::ApprovalEngine;
use replyflow_engine::commands::CommandRouter;
use replyflow_engine::discovery::DiscoveryEngine;
use replyflow_engine::feedback::FeedbackLoop;
use replyflow_engine::filter::QualityFilter;
use replyflow_engine::generation::GenerationStage;
use replyflow_engine::scheduler::{PipelineControl, Scheduler};
use replyflow_engine::store::PgStore;
use replyflow_engine::traits::{
    ContentSource, Notifier, ReplyGenerator, ReplyPublisher, ReplyStore, TelegramNotifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let pg = Arc::new(PgStore::new(pool));
    pg.ensure_schema().await?;
    let store: Arc<dyn ReplyStore> = pg;

    let x = Arc::new(XClient::new(config.x_api_key.clone()));
    let source: Arc<dyn ContentSource> = x.clone();
    let publisher: Arc<dyn ReplyPublisher> = x;
    let generator: Arc<dyn ReplyGenerator> =
        Arc::new(LlmClient::new(&config.llm_api_key, &config.llm_model));

    let telegram = TelegramClient::new(config.telegram_bot_token.clone());
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(
        telegram.clone(),
        config.telegram_chat_id,
    ));

    let filter = QualityFilter::new(vec![config.x_username.clone()]);
    let discovery = Arc::new(DiscoveryEngine::new(
        source.clone(),
        store.clone(),
        filter,
        config.min_followers,
        config.max_followers,
        config.max_candidates_per_cycle,
    ));
    let generation = Arc::new(GenerationStage::new(
        generator.clone(),
        store.clone(),
        notifier.clone(),
        config.max_candidates_per_cycle,
    ));
    let feedback = Arc::new(FeedbackLoop::new(
        source,
        store.clone(),
        notifier.clone(),
        config.x_username.clone(),
    ));

    let control = Arc::new(PipelineControl::new());
    let scheduler = Arc::new(Scheduler::new(
        discovery.clone(),
        generation.clone(),
        feedback,
        store.clone(),
        control,
        Duration::from_secs(config.poll_interval_secs),
        Duration::from_secs(config.search_interval_secs),
        Duration::from_secs(config.feedback_interval_secs),
    ));

    let approval = Arc::new(ApprovalEngine::new(store.clone(), publisher));
    let router = CommandRouter::new(
        scheduler.clone(),
        discovery,
        generation,
        approval,
        store,
        generator,
    );

    info!("replyflow started");

    tokio::join!(
        scheduler.run(),
        operator_loop(telegram, config.telegram_chat_id, router),
    );
    Ok(())
}

/// Long-poll the operator chat and answer every message.
async fn operator_loop(telegram: TelegramClient, chat_id: i64, router: CommandRouter) {
    let mut offset = 0i64;
    loop {
        let updates = match telegram.get_updates(offset, 30).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "telegram update poll failed");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            if message.chat.id != chat_id {
                continue;
            }
            let Some(text) = message.text.as_deref() else {
                continue;
            };
            let replied_to = message
                .reply_to_message
                .as_ref()
                .and_then(|m| m.text.as_deref());

            let response = router.handle(text, replied_to).await;
            if let Err(e) = telegram.send_message(chat_id, &response).await {
                warn!(error = %e, "failed to send command response");
            }
        }
    }
}
