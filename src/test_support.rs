//! In-memory stand-ins for the broker and the chat provider.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::BridgeError;
use crate::notifier::{ChatNotifier, Readiness};
use crate::transport::Transport;

#[derive(Default)]
pub struct MockTransport {
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
    fail: AtomicBool,
}

impl MockTransport {
    pub fn failing() -> Self {
        Self {
            published: Mutex::default(),
            fail: AtomicBool::new(true),
        }
    }

    pub async fn published_payloads(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .await
            .iter()
            .map(|(topic, payload)| (topic.clone(), String::from_utf8_lossy(payload).into_owned()))
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BridgeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BridgeError::Publish {
                topic: topic.to_string(),
                reason: "broker unreachable".to_string(),
            });
        }
        self.published.lock().await.push((topic.to_string(), payload));
        Ok(())
    }
}

pub struct MockNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    /// Every attempt, including failed ones
    pub attempts: Mutex<Vec<String>>,
    failing: HashSet<String>,
    /// Sends to these never complete
    stalled: HashSet<String>,
    ready: AtomicBool,
}

impl MockNotifier {
    pub fn ready() -> Self {
        Self {
            sent: Mutex::default(),
            attempts: Mutex::default(),
            failing: HashSet::new(),
            stalled: HashSet::new(),
            ready: AtomicBool::new(true),
        }
    }

    pub fn initializing() -> Self {
        let notifier = Self::ready();
        notifier.ready.store(false, Ordering::SeqCst);
        notifier
    }

    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::ready()
        }
    }

    pub fn pending_for(ids: &[&str]) -> Self {
        Self {
            stalled: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::ready()
        }
    }

    pub async fn texts_for(&self, recipient: &str) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(to, _)| to == recipient)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatNotifier for MockNotifier {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()> {
        self.attempts.lock().await.push(recipient.to_string());
        if self.stalled.contains(recipient) {
            return std::future::pending().await;
        }
        if self.failing.contains(recipient) {
            anyhow::bail!("chat session rejected message");
        }
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }

    fn readiness(&self) -> Readiness {
        if self.ready.load(Ordering::SeqCst) {
            Readiness::Ready
        } else {
            Readiness::Initializing
        }
    }
}
