//! Single-consumer composition: storage, then delivery, then notification.

use std::sync::Arc;

use async_trait::async_trait;

use super::{PipelineError, StageOutcome, SubmissionHandler};
use crate::domain::MessageSubmissionEvent;
use crate::infrastructure::metrics;

pub struct SequentialPipeline {
    storage: Arc<dyn SubmissionHandler>,
    delivery: Arc<dyn SubmissionHandler>,
    notification: Arc<dyn SubmissionHandler>,
}

impl SequentialPipeline {
    pub fn new(
        storage: Arc<dyn SubmissionHandler>,
        delivery: Arc<dyn SubmissionHandler>,
        notification: Arc<dyn SubmissionHandler>,
    ) -> Self {
        Self {
            storage,
            delivery,
            notification,
        }
    }
}

#[async_trait]
impl SubmissionHandler for SequentialPipeline {
    fn name(&self) -> &'static str {
        "sequential"
    }

    /// A failure in any step fails the whole run, so a redelivery repeats
    /// every step. Storage is idempotent under the `prevent` policy.
    async fn handle(&self, event: &MessageSubmissionEvent) -> Result<StageOutcome, PipelineError> {
        let stored = self.storage.handle(event).await?;
        metrics::record_pipeline_event(self.storage.name(), stored.label());

        // Nothing was persisted, so there is nothing to deliver or notify.
        if matches!(stored, StageOutcome::Skipped(_)) {
            return Ok(StageOutcome::Sequence(vec![stored]));
        }

        let delivered = self.delivery.handle(event).await?;
        metrics::record_pipeline_event(self.delivery.name(), delivered.label());

        let notified = self.notification.handle(event).await?;
        metrics::record_pipeline_event(self.notification.name(), notified.label());

        Ok(StageOutcome::Sequence(vec![stored, delivered, notified]))
    }
}
