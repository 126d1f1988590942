use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;

use study_match::config::BotConfig;
use study_match::dialogue::DialogueEngine;
use study_match::store::{LibSqlBackend, ProfileStore};
use study_match::transport::{TelegramTransport, Transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().context("Failed to load configuration")?;

    eprintln!("🎓 Study Match v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Age tolerance: ±{}", config.age_tolerance);

    let store: Arc<dyn ProfileStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .context("Failed to open database")?,
    );

    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(config.bot_token));
    transport
        .health_check()
        .await
        .context("Telegram Bot API unreachable")?;

    let engine =
        DialogueEngine::new(store, Arc::clone(&transport)).with_age_tolerance(config.age_tolerance);

    // One event at a time: per-user dialogue turns are processed in the
    // order received, with no cross-event races.
    let mut events = transport.start().await.context("Failed to start transport")?;
    tracing::info!("Bot started");
    while let Some(event) = events.next().await {
        let user = event.user;
        if let Err(e) = engine.handle_event(event).await {
            tracing::error!(user, "Handler failed: {e}");
        }
    }

    Ok(())
}
