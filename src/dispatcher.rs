use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::{BridgeConfig, DeviceConfig};
use crate::notifier::ChatNotifier;
use crate::protocol::CommandMessage;
use crate::registry::RecipientRegistry;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Published,
    PublishFailed,
}

/// Turns a chat "dispense" command into a signed device command.
pub struct CommandDispatcher {
    registry: RecipientRegistry,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn ChatNotifier>,
    command_topic: String,
    token: String,
    ack_text: String,
    confirmation_text: String,
}

impl CommandDispatcher {
    pub fn new(
        registry: RecipientRegistry,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn ChatNotifier>,
        device: &DeviceConfig,
        bridge: &BridgeConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            notifier,
            command_topic: device.command_topic.clone(),
            token: device.token.clone(),
            ack_text: bridge.ack_text.clone(),
            confirmation_text: bridge.confirmation_text.clone(),
        }
    }

    /// Register the sender (if any), publish one dispense command and reply
    /// to the sender with the outcome. Never retries.
    pub async fn dispatch(&self, sender: Option<&str>) -> DispatchOutcome {
        let sender = sender.filter(|s| !s.is_empty());

        match sender {
            Some(id) => {
                self.registry.register(id).await;
            }
            None => warn!("Dispense command without sender id, not registering"),
        }

        if let Some(id) = sender {
            self.reply(id, &self.ack_text).await;
        }

        let payload = match CommandMessage::dispense(&self.token).to_payload() {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to encode dispense command: {}", e);
                return DispatchOutcome::PublishFailed;
            }
        };

        if let Err(e) = self.transport.publish(&self.command_topic, payload).await {
            error!("{}", e);
            return DispatchOutcome::PublishFailed;
        }

        info!("Message published to topic \"{}\"", self.command_topic);
        if let Some(id) = sender {
            self.reply(id, &self.confirmation_text).await;
        }
        DispatchOutcome::Published
    }

    async fn reply(&self, recipient: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Err(e) = self.notifier.send_text(recipient, text).await {
            warn!("Failed to reply to {}: {:#}", recipient, e);
        }
    }
}
