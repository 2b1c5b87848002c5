pub mod mqtt;

use async_trait::async_trait;

use crate::error::BridgeError;

/// Outbound side of the pub/sub link.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BridgeError>;
}
