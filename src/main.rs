//! straybot - Straylight chat bot
//!
//! A resilient chat-over-IRC client for Twitch-style relays: one
//! authenticated session, automatic reconnection, rate-limited sends, and
//! prioritized handler/command dispatch.

mod bot;
mod commands;
mod config;
mod error;
mod events;
mod gate;
mod network;
mod plugins;
mod scheduler;

use crate::bot::Bot;
use crate::config::Config;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "straybot.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "failed to load config");
        e
    })?;

    info!(
        host = %config.server.host,
        nick = %config.server.nick,
        channel = %config.bot.channel,
        "starting straybot"
    );

    Bot::new(config).run().await
}
