use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::notifier::ChatNotifier;
use crate::registry::RecipientRegistry;

/// Start a cron job that logs bridge liveness. The returned scheduler must be
/// kept alive for the job to keep firing.
pub async fn start(
    cron_expr: &str,
    registry: RecipientRegistry,
    notifier: Arc<dyn ChatNotifier>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .context("Failed to create job scheduler")?;

    let job = Job::new_async(cron_expr, move |_uuid, _lock| {
        let registry = registry.clone();
        let notifier = notifier.clone();
        Box::pin(async move {
            info!(
                "Heartbeat: bridge alive, {} recipient(s), notifier {}",
                registry.len().await,
                notifier.readiness()
            );
        })
    })
    .with_context(|| format!("Failed to create heartbeat job: {}", cron_expr))?;

    scheduler
        .add(job)
        .await
        .context("Failed to add heartbeat job")?;
    scheduler
        .start()
        .await
        .context("Failed to start scheduler")?;

    info!("Heartbeat scheduled with cron: {}", cron_expr);
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockNotifier;

    #[tokio::test]
    async fn test_invalid_cron_is_rejected() {
        let result = start(
            "every now and then",
            RecipientRegistry::new(),
            Arc::new(MockNotifier::ready()),
        )
        .await;
        assert!(result.is_err());
    }
}
