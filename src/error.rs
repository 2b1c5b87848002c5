use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Failed to publish to topic \"{topic}\": {reason}")]
    Publish { topic: String, reason: String },

    #[error("Invalid recipient id: {0}")]
    InvalidRecipient(String),
}
