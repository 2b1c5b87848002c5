use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{BridgeConfig, DeviceConfig};
use crate::notifier::{ChatNotifier, Readiness};
use crate::protocol::{CommandMessage, InboundMessage, StatusEvent};
use crate::registry::RecipientRegistry;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoRecipients,
    NotifierNotReady,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Payload was not a valid status event
    Dropped,
    Skipped(SkipReason),
    FannedOut { delivered: usize, failed: Vec<String> },
}

/// One status event with its recipient set already decided.
struct Prepared {
    text: String,
    recipients: Result<Vec<String>, SkipReason>,
    echo: bool,
}

/// Fans device status events out to every registered recipient.
pub struct StatusRelay {
    registry: RecipientRegistry,
    notifier: Arc<dyn ChatNotifier>,
    transport: Arc<dyn Transport>,
    status_topic: String,
    command_topic: String,
    token: String,
    status_template: String,
    echo_on_status: Option<String>,
}

impl StatusRelay {
    pub fn new(
        registry: RecipientRegistry,
        notifier: Arc<dyn ChatNotifier>,
        transport: Arc<dyn Transport>,
        device: &DeviceConfig,
        bridge: &BridgeConfig,
    ) -> Self {
        Self {
            registry,
            notifier,
            transport,
            status_topic: device.status_topic.clone(),
            command_topic: device.command_topic.clone(),
            token: device.token.clone(),
            status_template: bridge.status_template.clone(),
            echo_on_status: bridge.echo_on_status.clone(),
        }
    }

    /// Consume inbound messages in arrival order until the channel closes.
    ///
    /// Each event is parsed and snapshotted here, in order; delivery runs in
    /// its own task so a stalled recipient never stops the channel draining.
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundMessage>) {
        info!("Status relay listening on \"{}\"", self.status_topic);
        let relay = Arc::new(self);
        while let Some(message) = inbound.recv().await {
            if message.topic != relay.status_topic {
                debug!("Ignoring message on topic \"{}\"", message.topic);
                continue;
            }
            if let Some(prepared) = relay.prepare(&message.payload).await {
                let relay = relay.clone();
                tokio::spawn(async move {
                    relay.complete(prepared).await;
                });
            }
        }
        info!("Status stream closed, relay stopping");
    }

    pub async fn handle_payload(&self, payload: &[u8]) -> RelayOutcome {
        match self.prepare(payload).await {
            Some(prepared) => self.complete(prepared).await,
            None => RelayOutcome::Dropped,
        }
    }

    /// Parse the event and fix its recipient set. None if the payload is
    /// malformed.
    async fn prepare(&self, payload: &[u8]) -> Option<Prepared> {
        let event = match StatusEvent::parse(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed status payload: {}", e);
                return None;
            }
        };

        info!("Estado del dispositivo: {}", event.status);

        let recipients = self.registry.snapshot().await;
        let recipients = if recipients.is_empty() {
            info!("No registered recipients, skipping status delivery");
            Err(SkipReason::NoRecipients)
        } else if self.notifier.readiness() != Readiness::Ready {
            info!("Chat notifier not ready yet, skipping status delivery");
            Err(SkipReason::NotifierNotReady)
        } else {
            Ok(recipients)
        };

        Some(Prepared {
            text: event.render(&self.status_template),
            echo: self.echo_on_status.as_deref() == Some(event.status.as_str()),
            recipients,
        })
    }

    async fn complete(&self, prepared: Prepared) -> RelayOutcome {
        let outcome = match &prepared.recipients {
            Ok(recipients) => self.fan_out(&prepared.text, recipients).await,
            Err(reason) => RelayOutcome::Skipped(*reason),
        };
        if prepared.echo {
            self.echo_command().await;
        }
        outcome
    }

    async fn fan_out(&self, text: &str, recipients: &[String]) -> RelayOutcome {
        let deliveries = recipients.iter().map(|recipient| async move {
            match self.notifier.send_text(recipient, text).await {
                Ok(()) => {
                    debug!("Message sent to {}", recipient);
                    None
                }
                Err(e) => {
                    error!("Failed to send message to {}: {:#}", recipient, e);
                    Some(recipient.clone())
                }
            }
        });

        let failed: Vec<String> = join_all(deliveries).await.into_iter().flatten().collect();
        let delivered = recipients.len() - failed.len();
        info!(
            "Status delivered to {}/{} recipients",
            delivered,
            recipients.len()
        );
        RelayOutcome::FannedOut { delivered, failed }
    }

    async fn echo_command(&self) {
        info!("Echo status matched, publishing dispense command");
        let payload = match CommandMessage::dispense(&self.token).to_payload() {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to encode dispense command: {}", e);
                return;
            }
        };
        if let Err(e) = self.transport.publish(&self.command_topic, payload).await {
            error!("{}", e);
        }
    }
}
