//! Wire contract with the feeder firmware.
//!
//! Both directions are UTF-8 JSON objects: commands go out as
//! `{"action":"DISPENSE","token":"..."}`, status comes back as
//! `{"status":"..."}`.

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

pub const DEFAULT_COMMAND_TOPIC: &str = "/petfeeder/esp32-001/command";
pub const DEFAULT_STATUS_TOPIC: &str = "/petfeeder/esp32-001/status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Dispense,
}

/// Outbound control message. The token is checked by the firmware, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub action: Action,
    pub token: String,
}

impl CommandMessage {
    pub fn dispense(token: &str) -> Self {
        Self {
            action: Action::Dispense,
            token: token.to_string(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, BridgeError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Inbound telemetry. Extra fields sent by the firmware are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusEvent {
    pub status: String,
}

impl StatusEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, BridgeError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Render the notification text; `{status}` in the template is replaced
    /// with the raw status value.
    pub fn render(&self, template: &str) -> String {
        template.replace("{status}", &self.status)
    }
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}
