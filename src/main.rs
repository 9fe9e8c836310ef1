use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use assistant_relay::{
    analytics::Analytics,
    bot::Bot,
    config::Config,
    media::SpeechService,
    relay::{AssistantManager, Conversation, KnowledgeManager, ModelValueValidator, RunDriver},
    telegram::TelegramClient,
    users::{MemoryUserStore, PgUserStore, UserStore},
    AssistantApi, OpenAiClient,
};

const VALIDATOR_MODEL: &str = "gpt-4o";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let client = Arc::new(OpenAiClient::new(config.credentials.clone())?);
    let api: Arc<dyn AssistantApi> = client.clone();

    let users: Arc<dyn UserStore> = match &config.database_url {
        Some(url) => Arc::new(
            PgUserStore::connect(url)
                .await
                .context("failed to open the user database")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, users are kept in memory only");
            Arc::new(MemoryUserStore::new())
        }
    };

    let knowledge = KnowledgeManager::new(api.clone(), users.clone(), &config.knowledge_dir)
        .with_indexing_deadline(config.indexing_deadline);
    let assistants = AssistantManager::new(api.clone(), knowledge, config.assistant_settings());
    let validator = Arc::new(ModelValueValidator::new(api.clone(), VALIDATOR_MODEL));
    let driver = RunDriver::new(api.clone(), users.clone(), validator).with_settings(config.run);
    let conversation = Conversation::new(api, users.clone(), assistants, driver);

    let analytics = Analytics::new(config.amplitude_api_key.clone());
    if !analytics.is_enabled() {
        info!("AMPLITUDE_API_KEY not set, analytics disabled");
    }

    let bot = Arc::new(Bot::new(
        TelegramClient::new(&config.telegram_token),
        users,
        conversation,
        SpeechService::new(client, config.speech.clone()),
        analytics,
    ));

    info!("assistant relay started");
    tokio::select! {
        _ = bot.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("shutting down");
        }
    }
    Ok(())
}
