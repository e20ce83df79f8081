// Feed relay entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config
// 3. Open database (schema init; failure here is fatal)
// 4. Build the feed and channel clients
// 5. Spawn the background relay loop
// 6. Run the update dispatch loop (blocks for the life of the process)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use feed_relay::channel::TelegramChannel;
use feed_relay::config;
use feed_relay::db::Database;
use feed_relay::feed::TwitterFeed;
use feed_relay::interaction::{self, InteractionHandler};
use feed_relay::ledger::VoteLedger;
use feed_relay::relay::RelayOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Feed relay starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {} accounts, {} minute poll interval, channel {}",
        config.relay.accounts.len(),
        config.relay.poll_interval_minutes,
        config.telegram.channel_id
    );

    // 3. Open database
    let db = Arc::new(Database::open(&config.db_path).context("failed to open database")?);
    info!("Database opened at {}", config.db_path);

    // 4. Build clients
    let feed = Arc::new(TwitterFeed::new(
        config.credentials.twitter_bearer_token.clone(),
    ));
    let telegram = Arc::new(TelegramChannel::new(
        config.credentials.telegram_bot_token.clone(),
        config.telegram.channel_id.clone(),
    ));

    // 5. Spawn the background relay loop
    let orchestrator = RelayOrchestrator::new(
        feed,
        telegram.clone(),
        db.clone(),
        config.relay.accounts.clone(),
        config.relay.feed_page_size,
    );
    let interval = Duration::from_secs(config.relay.poll_interval_minutes * 60);
    let relay_handle = tokio::spawn(async move { orchestrator.run(interval).await });

    // 6. Run the update dispatch loop
    let handler = InteractionHandler::new(VoteLedger::new(db), telegram.clone());
    let status_text = format!("Relaying monitored accounts to {}", config.telegram.channel_id);
    info!("Listening for interactions");

    let result = interaction::run(telegram, handler, status_text).await;

    // Only reachable if the dispatch loop bails out.
    relay_handle.abort();
    result
}

/// Initialize tracing to stdout with an env-filter override
/// (`RUST_LOG=feed_relay=debug` etc).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("feed_relay=info,warn")),
        )
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
