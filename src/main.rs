mod config;
mod forward;
mod handlers;
mod matcher;
mod storage;
mod tg;

use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::{prelude::*, utils::command::BotCommands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // без токена и канала дальше не идём
    let cfg = config::Config::from_env()?;

    let client = teloxide::net::default_reqwest_settings().build()?;
    let mut bot = Bot::with_client(cfg.token.clone(), client);
    if let Some(url) = cfg.api_url.clone() {
        bot = bot.set_api_url(url);
    }

    let me = bot.get_me().await?;
    if let Err(e) = bot.set_my_commands(tg::Command::bot_commands()).await {
        tracing::warn!(error = %e, "failed to register bot commands");
    }

    let storage = storage::Storage::open(&cfg.store_path).await?;
    tracing::info!(
        bot = %me.username(),
        channel = cfg.channel_id.0,
        store = %storage.path().display(),
        entries = storage.count().await,
        strategy = %cfg.strategy,
        forward_limit = cfg.forward_limit,
        "starting"
    );

    let app = handlers::App {
        storage,
        forwarder: Arc::new(forward::TelegramForwarder::new(bot.clone(), forward::DEFAULT_RATE_LIMIT_CAP)),
        channel_id: cfg.channel_id,
        strategy: cfg.strategy,
        forward_limit: cfg.forward_limit,
    };

    tg::run(bot, app).await;
    Ok(())
}
