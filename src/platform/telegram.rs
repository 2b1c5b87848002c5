use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{debug, info, warn};

use crate::dispatcher::CommandDispatcher;
use crate::error::BridgeError;
use crate::notifier::{ChatNotifier, Readiness, ReadinessFlag};
use crate::platform::KeywordMatcher;

const SESSION_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Sends status notifications through the Telegram Bot API. Recipients are
/// decimal chat ids.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    ready: ReadinessFlag,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            ready: ReadinessFlag::new(),
        }
    }

    /// Poll `getMe` until the Bot API answers, then mark the notifier ready.
    pub async fn establish_session(&self) {
        loop {
            match self.bot.get_me().await {
                Ok(me) => {
                    info!("Telegram session ready (bot id {})", me.user.id);
                    self.ready.mark_ready();
                    return;
                }
                Err(e) => {
                    warn!("Telegram session not ready yet: {}", e);
                    tokio::time::sleep(SESSION_RETRY_DELAY).await;
                }
            }
        }
    }
}

fn parse_chat_id(recipient: &str) -> Result<ChatId, BridgeError> {
    recipient
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| BridgeError::InvalidRecipient(recipient.to_string()))
}

#[async_trait]
impl ChatNotifier for TelegramNotifier {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()> {
        let chat_id = parse_chat_id(recipient)?;
        self.bot
            .send_message(chat_id, text)
            .await
            .with_context(|| format!("Failed to send message to {}", recipient))?;
        Ok(())
    }

    fn readiness(&self) -> Readiness {
        self.ready.get()
    }
}

/// Everything the message handler needs.
pub struct ChatState {
    pub dispatcher: CommandDispatcher,
    pub matcher: KeywordMatcher,
}

/// Run the Telegram update loop
pub async fn run(bot: Bot, state: Arc<ChatState>, allowed_user_ids: Vec<u64>) -> Result<()> {
    info!("Starting Telegram platform...");

    let handler = Update::filter_message()
        .filter_map(move |msg: Message| {
            if allowed_user_ids.is_empty() {
                return Some(msg);
            }
            let user = msg.from.as_ref()?;
            if allowed_user_ids.contains(&user.id.0) {
                Some(msg)
            } else {
                None
            }
        })
        .endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<ChatState>) -> ResponseResult<()> {
    let text = match msg.text() {
        Some(t) => t,
        None => return Ok(()),
    };

    if text == "/start" {
        bot.send_message(
            msg.chat.id,
            format!(
                "Send {} to feed your pet. You will receive the feeder's status updates here.",
                state.matcher.keywords().join(" / ")
            ),
        )
        .await?;
        return Ok(());
    }

    if !state.matcher.matches(text) {
        debug!("Ignoring message in chat {}", msg.chat.id);
        return Ok(());
    }

    // Messages without a user (channel posts) still trigger the feeder but
    // do not subscribe the chat to status updates.
    let sender = msg.from.as_ref().map(|_| msg.chat.id.0.to_string());
    info!(
        "Dispense command from chat {} (user: {:?})",
        msg.chat.id,
        msg.from.as_ref().map(|u| u.id.0)
    );

    state.dispatcher.dispatch(sender.as_deref()).await;
    Ok(())
}
