//! rumqttc-backed device link.
//!
//! `connect` splits the client in two: `MqttTransport` publishes commands and
//! is shared with the bridge, `MqttLink` owns the event loop and forwards
//! status messages into a channel. Reconnection is left to rumqttc's event
//! loop; the link only resubscribes after each ConnAck.
//!
//! A publish only succeeds once the broker has acknowledged it. The link
//! pairs each outgoing PUBLISH with its PUBACK and resolves the waiting
//! caller; while the broker is unreachable publishes fail immediately.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;
use crate::error::BridgeError;
use crate::protocol::InboundMessage;
use crate::transport::Transport;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Connection state and PUBACK bookkeeping shared by both halves.
#[derive(Default)]
struct AckTracker {
    connected: AtomicBool,
    /// Accepted by rumqttc, not yet written to the socket (FIFO)
    queued: Mutex<VecDeque<oneshot::Sender<()>>>,
    /// Written to the socket, keyed by packet id
    inflight: Mutex<HashMap<u16, oneshot::Sender<()>>>,
}

impl AckTracker {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    async fn on_outgoing(&self, pkid: u16) {
        if let Some(tx) = self.queued.lock().await.pop_front() {
            self.inflight.lock().await.insert(pkid, tx);
        }
    }

    async fn on_puback(&self, pkid: u16) {
        if let Some(tx) = self.inflight.lock().await.remove(&pkid) {
            let _ = tx.send(());
        }
    }

    /// Mark the link down. Dropping the senders fails every waiting publish.
    async fn fail_all(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.queued.lock().await.clear();
        self.inflight.lock().await.clear();
    }
}

#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    acks: Arc<AckTracker>,
    ack_timeout: Duration,
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BridgeError> {
        let failed = |reason: &str| BridgeError::Publish {
            topic: topic.to_string(),
            reason: reason.to_string(),
        };

        if !self.acks.is_connected() {
            return Err(failed("broker not connected"));
        }

        let (tx, rx) = oneshot::channel();
        {
            // Held across try_publish so queue order matches rumqttc's request order
            let mut queued = self.acks.queued.lock().await;
            self.client
                .try_publish(topic, QoS::AtLeastOnce, false, payload)
                .map_err(|e| failed(&e.to_string()))?;
            queued.push_back(tx);
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(())) => {
                debug!("Broker acknowledged publish to \"{}\"", topic);
                Ok(())
            }
            Ok(Err(_)) => Err(failed("connection lost before PUBACK")),
            Err(_) => Err(failed("timed out waiting for PUBACK")),
        }
    }
}

pub struct MqttLink {
    client: AsyncClient,
    eventloop: EventLoop,
    acks: Arc<AckTracker>,
    status_topic: String,
    inbound: mpsc::Sender<InboundMessage>,
}

fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    if let Some(user) = &config.username {
        options.set_credentials(user, config.password.as_deref().unwrap_or_default());
    }

    if config.tls {
        options.set_transport(rumqttc::Transport::tls_with_default_config());
    }

    options
}

/// Build the client halves. Nothing touches the network until
/// `MqttLink::run` is polled.
pub fn connect(
    config: &MqttConfig,
    status_topic: &str,
) -> (MqttTransport, MqttLink, mpsc::Receiver<InboundMessage>) {
    let (client, eventloop) = AsyncClient::new(mqtt_options(config), 16);
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let acks = Arc::new(AckTracker::default());

    info!(
        "MQTT client {} targeting {}:{} (tls: {})",
        config.client_id, config.host, config.port, config.tls
    );

    (
        MqttTransport {
            client: client.clone(),
            acks: acks.clone(),
            ack_timeout: Duration::from_secs(config.ack_timeout_secs),
        },
        MqttLink {
            client,
            eventloop,
            acks,
            status_topic: status_topic.to_string(),
            inbound: tx,
        },
        rx,
    )
}

/// Hand a status message to the relay without ever blocking the event loop.
/// Returns false once the relay is gone.
fn forward(inbound: &mpsc::Sender<InboundMessage>, message: InboundMessage) -> bool {
    match inbound.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(message)) => {
            warn!(
                "Status channel full, dropping message on \"{}\"",
                message.topic
            );
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

impl MqttLink {
    /// Drive the event loop until the receiving side of the status channel
    /// is dropped.
    pub async fn run(mut self) {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    self.acks.set_connected();
                    // try_subscribe: the request queue is drained by this very loop
                    match self
                        .client
                        .try_subscribe(self.status_topic.as_str(), QoS::AtLeastOnce)
                    {
                        Ok(()) => info!("Subscribed to topic \"{}\"", self.status_topic),
                        Err(e) => error!(
                            "Failed to subscribe to topic \"{}\": {}",
                            self.status_topic, e
                        ),
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    };
                    if !forward(&self.inbound, message) {
                        warn!("Status channel closed, stopping MQTT link");
                        return;
                    }
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => {
                    self.acks.on_puback(ack.pkid).await;
                }
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                    self.acks.on_outgoing(pkid).await;
                }
                Ok(event) => {
                    debug!(?event, "MQTT event");
                }
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    self.acks.fail_all().await;
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BridgeConfig, DeviceConfig};
    use crate::dispatcher::{CommandDispatcher, DispatchOutcome};
    use crate::registry::RecipientRegistry;
    use crate::test_support::MockNotifier;

    fn local_config(port: u16) -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".to_string(),
            port,
            tls: false,
            ack_timeout_secs: 1,
            ..MqttConfig::default()
        }
    }

    #[test]
    fn test_options_from_config() {
        let config = MqttConfig {
            host: "broker.example.com".to_string(),
            port: 8883,
            username: Some("feeder".to_string()),
            password: Some("secret".to_string()),
            tls: false,
            client_id: "bridge-test".to_string(),
            keep_alive_secs: 30,
            channel_capacity: 8,
            ack_timeout_secs: 10,
        };
        let options = mqtt_options(&config);
        assert_eq!(options.client_id(), "bridge-test");
        assert_eq!(
            options.broker_address(),
            ("broker.example.com".to_string(), 8883)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_publish_fails_before_connack() {
        let (transport, _link, _rx) = connect(&local_config(1883), "/petfeeder/esp32-001/status");
        let err = transport
            .publish("/petfeeder/esp32-001/command", b"{}".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Publish { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_broker_means_no_confirmation() {
        // Nothing listens on port 1
        let (transport, link, _rx) = connect(&local_config(1), "/petfeeder/esp32-001/status");
        let link_task = tokio::spawn(link.run());
        tokio::time::sleep(Duration::from_millis(300)).await;

        let registry = RecipientRegistry::new();
        let notifier = Arc::new(MockNotifier::ready());
        let dispatcher = CommandDispatcher::new(
            registry.clone(),
            Arc::new(transport),
            notifier.clone(),
            &DeviceConfig::default(),
            &BridgeConfig::default(),
        );

        let outcome = dispatcher.dispatch(Some("42")).await;

        assert_eq!(outcome, DispatchOutcome::PublishFailed);
        assert!(registry.contains("42").await);
        assert_eq!(notifier.texts_for("42").await, vec!["Dispensando..."]);
        link_task.abort();
    }

    #[tokio::test]
    async fn test_puback_resolves_matching_publish() {
        let acks = AckTracker::default();
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, mut second_rx) = oneshot::channel();
        acks.queued.lock().await.push_back(first_tx);
        acks.queued.lock().await.push_back(second_tx);

        acks.on_outgoing(7).await;
        acks.on_outgoing(8).await;
        acks.on_puback(7).await;

        assert!(first_rx.await.is_ok());
        assert!(second_rx.try_recv().is_err());
        assert!(acks.inflight.lock().await.contains_key(&8));
    }

    #[tokio::test]
    async fn test_disconnect_fails_waiting_publishes() {
        let acks = AckTracker::default();
        acks.set_connected();
        let (queued_tx, queued_rx) = oneshot::channel();
        let (inflight_tx, inflight_rx) = oneshot::channel();
        acks.queued.lock().await.push_back(inflight_tx);
        acks.on_outgoing(3).await;
        acks.queued.lock().await.push_back(queued_tx);

        acks.fail_all().await;

        assert!(!acks.is_connected());
        assert!(queued_rx.await.is_err());
        assert!(inflight_rx.await.is_err());
    }

    #[tokio::test]
    async fn test_forward_never_blocks_on_full_channel() {
        let (tx, mut rx) = mpsc::channel(1);
        let message = |status: &str| InboundMessage {
            topic: "/petfeeder/esp32-001/status".to_string(),
            payload: format!(r#"{{"status":"{}"}}"#, status).into_bytes(),
        };

        assert!(forward(&tx, message("idle")));
        // Full: dropped, but the link keeps running
        assert!(forward(&tx, message("dispensing")));

        let kept = rx.recv().await.unwrap();
        assert_eq!(kept.payload, br#"{"status":"idle"}"#.to_vec());
        assert!(rx.try_recv().is_err());

        drop(rx);
        assert!(!forward(&tx, message("error")));
    }
}
