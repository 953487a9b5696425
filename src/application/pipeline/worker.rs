//! Queue consumer loop.
//!
//! One worker owns one consumer group and processes one delivery at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use super::{PipelineError, StageOutcome, SubmissionHandler};
use crate::domain::{MessageSubmissionEvent, QueueDelivery, SubmissionQueue};
use crate::infrastructure::metrics;

/// Pause after returning a delivery to the queue.
pub const DEFAULT_NACK_BACKOFF: Duration = Duration::from_millis(250);

/// What to tell the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Nack,
}

impl Disposition {
    /// Successes and terminal failures are acknowledged; transient failures
    /// go back to the queue.
    pub fn for_result(result: &Result<StageOutcome, PipelineError>) -> Self {
        match result {
            Ok(_) => Disposition::Ack,
            Err(e) if e.is_retryable() => Disposition::Nack,
            Err(_) => Disposition::Ack,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Nack => "nack",
        }
    }
}

pub struct PipelineWorker {
    queue: Arc<dyn SubmissionQueue>,
    handler: Arc<dyn SubmissionHandler>,
    group: String,
    consumer: String,
    reconnect_delay: Duration,
    nack_backoff: Duration,
}

impl PipelineWorker {
    pub fn new(
        queue: Arc<dyn SubmissionQueue>,
        handler: Arc<dyn SubmissionHandler>,
        group: impl Into<String>,
        consumer: impl Into<String>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            queue,
            handler,
            group: group.into(),
            consumer: consumer.into(),
            reconnect_delay,
            nack_backoff: DEFAULT_NACK_BACKOFF,
        }
    }

    pub fn with_nack_backoff(mut self, nack_backoff: Duration) -> Self {
        self.nack_backoff = nack_backoff;
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Consume until `shutdown` flips to true.
    ///
    /// A delivery that is being handled always runs to completion; shutdown
    /// is only observed while waiting on the broker.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            group = %self.group,
            consumer = %self.consumer,
            stage = self.handler.name(),
            "Pipeline worker started"
        );

        'outer: while !*shutdown.borrow() {
            let ready = tokio::select! {
                _ = shutdown.changed() => break 'outer,
                r = self.queue.ensure_group(&self.group) => r,
            };
            if let Err(e) = ready {
                tracing::error!(
                    group = %self.group,
                    error = %e,
                    retry_in_ms = self.reconnect_delay.as_millis() as u64,
                    "Failed to start consumer, retrying"
                );
                if self.pause(&mut shutdown).await {
                    break;
                }
                continue;
            }

            loop {
                let received = tokio::select! {
                    _ = shutdown.changed() => break 'outer,
                    r = self.queue.receive(&self.group, &self.consumer) => r,
                };

                match received {
                    Ok(Some(delivery)) => {
                        if self.process(&delivery).await == Disposition::Nack
                            && self.sleep(self.nack_backoff, &mut shutdown).await
                        {
                            break 'outer;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(
                            group = %self.group,
                            error = %e,
                            "Queue receive failed, reconnecting"
                        );
                        if self.pause(&mut shutdown).await {
                            break 'outer;
                        }
                        continue 'outer;
                    }
                }

                if *shutdown.borrow() {
                    break 'outer;
                }
            }
        }

        tracing::info!(group = %self.group, consumer = %self.consumer, "Pipeline worker stopped");
    }

    /// Handle one delivery and settle it with the broker.
    pub async fn process(&self, delivery: &QueueDelivery) -> Disposition {
        if delivery.is_redelivery() {
            metrics::record_redelivery(&self.group);
        }

        let started = Instant::now();
        let result = match MessageSubmissionEvent::decode(delivery.payload.as_bytes()) {
            Ok(event) => {
                tracing::debug!(
                    group = %self.group,
                    entry_id = %delivery.id,
                    conversation_id = %event.conversation_id,
                    submission_id = ?event.submission_id,
                    delivery_count = delivery.delivery_count,
                    "Processing submission"
                );
                self.handler.handle(&event).await
            }
            Err(e) => Err(PipelineError::from(e)),
        };

        metrics::record_stage_duration(self.handler.name(), started.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => metrics::record_pipeline_event(self.handler.name(), outcome.label()),
            Err(e) if e.is_retryable() => {
                metrics::record_pipeline_event(self.handler.name(), "retry");
                tracing::warn!(
                    group = %self.group,
                    entry_id = %delivery.id,
                    error = %e,
                    "Transient failure, returning submission to the queue"
                );
            }
            Err(e) => {
                metrics::record_pipeline_event(self.handler.name(), "dropped");
                tracing::error!(
                    group = %self.group,
                    entry_id = %delivery.id,
                    error = %e,
                    "Dropping submission"
                );
            }
        }

        let disposition = Disposition::for_result(&result);
        let settled = match disposition {
            Disposition::Ack => self.queue.ack(delivery).await,
            Disposition::Nack => self.queue.nack(delivery).await,
        };
        if let Err(e) = settled {
            // The entry stays pending and is reclaimed after the ack timeout.
            tracing::error!(
                group = %self.group,
                entry_id = %delivery.id,
                disposition = disposition.as_str(),
                error = %e,
                "Failed to settle delivery"
            );
        }
        metrics::record_queue_disposition(&self.group, disposition.as_str());
        disposition
    }

    /// Sleep for the reconnect delay. Returns true if shutdown was requested.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        self.sleep(self.reconnect_delay, shutdown).await
    }

    async fn sleep(&self, duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = shutdown.changed() => true,
            _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        }
    }
}
