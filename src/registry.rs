use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

/// Set of chat participants that asked to hear about the feeder.
///
/// Cloning the registry clones the handle, not the contents. Entries live
/// for the lifetime of the process; nothing is persisted.
#[derive(Clone, Default)]
pub struct RecipientRegistry {
    recipients: Arc<RwLock<HashSet<String>>>,
    capacity: Option<usize>,
}

impl RecipientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that refuses new recipients once `capacity` is reached.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            recipients: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Add a recipient. Returns true if it was not registered before.
    pub async fn register(&self, id: &str) -> bool {
        let mut recipients = self.recipients.write().await;
        if recipients.contains(id) {
            return false;
        }
        if let Some(cap) = self.capacity {
            if recipients.len() >= cap {
                warn!(
                    "Recipient registry full ({} entries), refusing {}",
                    cap, id
                );
                return false;
            }
        }
        recipients.insert(id.to_string());
        info!("Recipient registered: {}", id);
        true
    }

    /// Copy of the current recipients. Later registrations are not visible
    /// in a snapshot already taken.
    pub async fn snapshot(&self) -> Vec<String> {
        self.recipients.read().await.iter().cloned().collect()
    }

    #[cfg(test)]
    pub async fn contains(&self, id: &str) -> bool {
        self.recipients.read().await.contains(id)
    }

    pub async fn len(&self) -> usize {
        self.recipients.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.recipients.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = RecipientRegistry::new();
        assert!(registry.register("+5551234").await);
        assert!(!registry.register("+5551234").await);
        assert!(registry.register("+5559876").await);

        let mut ids = registry.snapshot().await;
        ids.sort();
        assert_eq!(ids, vec!["+5551234", "+5559876"]);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let registry = RecipientRegistry::new();
        registry.register("a").await;
        let snapshot = registry.snapshot().await;
        registry.register("b").await;

        assert_eq!(snapshot, vec!["a"]);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_capacity_limit_refuses_new_ids_only() {
        let registry = RecipientRegistry::with_capacity_limit(1);
        assert!(registry.register("a").await);
        assert!(!registry.register("b").await);
        assert!(!registry.register("a").await);
        assert!(registry.contains("a").await);
        assert!(!registry.contains("b").await);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let registry = RecipientRegistry::new();
        let handle = registry.clone();
        handle.register("a").await;
        assert!(!registry.is_empty().await);
    }
}
