mod config;
mod dispatcher;
mod error;
mod heartbeat;
mod http;
mod notifier;
mod platform;
mod protocol;
mod registry;
mod relay;
#[cfg(test)]
mod test_support;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatcher::CommandDispatcher;
use crate::notifier::ChatNotifier;
use crate::platform::telegram::{ChatState, TelegramNotifier};
use crate::platform::KeywordMatcher;
use crate::registry::RecipientRegistry;
use crate::relay::StatusRelay;
use crate::transport::Transport;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,petfeeder_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if config.telegram.bot_token.is_empty() {
        anyhow::bail!("telegram.bot_token (or TELEGRAM_BOT_TOKEN) is required");
    }

    info!("Configuration loaded successfully");
    info!("  Broker: {}:{}", config.mqtt.host, config.mqtt.port);
    info!("  Command topic: {}", config.device.command_topic);
    info!("  Status topic: {}", config.device.status_topic);
    info!("  Keywords: {:?}", config.bridge.keywords);
    if let Some(echo) = &config.bridge.echo_on_status {
        info!("  Echo on status: {}", echo);
    }

    let registry = match config.bridge.max_recipients {
        Some(cap) => RecipientRegistry::with_capacity_limit(cap),
        None => RecipientRegistry::new(),
    };

    // Device link
    let (mqtt, link, inbound) =
        transport::mqtt::connect(&config.mqtt, &config.device.status_topic);
    let transport: Arc<dyn Transport> = Arc::new(mqtt);
    tokio::spawn(link.run());

    // Chat provider
    let bot = Bot::new(&config.telegram.bot_token);
    let telegram = Arc::new(TelegramNotifier::new(bot.clone()));
    let notifier: Arc<dyn ChatNotifier> = telegram.clone();
    tokio::spawn(async move { telegram.establish_session().await });

    let relay = StatusRelay::new(
        registry.clone(),
        notifier.clone(),
        transport.clone(),
        &config.device,
        &config.bridge,
    );
    tokio::spawn(relay.run(inbound));

    let http_state = http::HttpState {
        qr_image_path: config.http.qr_image_path.clone(),
        registry: registry.clone(),
        notifier: notifier.clone(),
    };
    let http_port = config.http.port;
    tokio::spawn(async move {
        if let Err(e) = http::serve(http_port, http_state).await {
            error!("HTTP server stopped: {:#}", e);
        }
    });

    let _heartbeat = if config.heartbeat.enabled {
        Some(heartbeat::start(&config.heartbeat.cron, registry.clone(), notifier.clone()).await?)
    } else {
        None
    };

    let chat_state = Arc::new(ChatState {
        dispatcher: CommandDispatcher::new(
            registry,
            transport,
            notifier,
            &config.device,
            &config.bridge,
        ),
        matcher: KeywordMatcher::new(
            &config.bridge.keywords,
            config.bridge.case_insensitive_keywords,
        ),
    });

    info!("Bridge is starting...");
    platform::telegram::run(bot, chat_state, config.telegram.allowed_user_ids.clone()).await?;

    Ok(())
}
