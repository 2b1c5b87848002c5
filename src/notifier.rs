use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

/// Session state of the chat provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Initializing,
    Ready,
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Readiness::Initializing => write!(f, "initializing"),
            Readiness::Ready => write!(f, "ready"),
        }
    }
}

/// Delivers text to a single chat participant.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()>;

    fn readiness(&self) -> Readiness;
}

/// Shared readiness flag, flipped once by the chat adapter when its session
/// is usable. There is no way back to `Initializing`.
#[derive(Clone, Default)]
pub struct ReadinessFlag {
    ready: Arc<AtomicBool>,
}

impl ReadinessFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Readiness {
        if self.ready.load(Ordering::Acquire) {
            Readiness::Ready
        } else {
            Readiness::Initializing
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_initializing() {
        let flag = ReadinessFlag::new();
        assert_eq!(flag.get(), Readiness::Initializing);

        let shared = flag.clone();
        shared.mark_ready();
        assert_eq!(flag.get(), Readiness::Ready);
        assert_eq!(flag.get().to_string(), "ready");
    }
}
