//! Sequential task executor.
//!
//! Per message: Received → Processing → {Completed, Rejected}. The
//! processing logic returns a plain `Result`; [`TaskExecutor::settle`]
//! is the only place that translates an outcome into ack/reject, so the
//! pipeline stays testable without a live queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use vodforge_models::{CompletedUpload, VideoTask};
use vodforge_queue::{TaskDelivery, TaskQueue};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::processor::VideoProcessor;

/// How many stranded messages one claim pass may adopt.
const CLAIM_BATCH: usize = 10;

/// Consumes tasks one at a time and settles each delivery.
pub struct TaskExecutor {
    config: WorkerConfig,
    queue: Arc<TaskQueue>,
    processor: VideoProcessor,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl TaskExecutor {
    /// Create a new executor.
    pub fn new(config: WorkerConfig, queue: TaskQueue, processor: VideoProcessor) -> Self {
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            processor,
            shutdown,
            consumer_name,
        }
    }

    /// Run the consumption loop until shutdown.
    ///
    /// Strictly sequential: a message is fully processed, including its
    /// transcode, before the next one is fetched. Throughput scales by
    /// running more worker processes against the same stream.
    pub async fn run(&self) -> WorkerResult<()> {
        info!("Starting task executor '{}'", self.consumer_name);
        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut last_claim = Instant::now();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // Adopt messages stranded in the pending list by crashed
            // workers; at-least-once hinges on this pass.
            if last_claim.elapsed() >= self.config.claim_interval {
                last_claim = Instant::now();
                match self
                    .queue
                    .claim_pending(
                        &self.consumer_name,
                        self.config.claim_min_idle.as_millis() as u64,
                        CLAIM_BATCH,
                    )
                    .await
                {
                    Ok(deliveries) => {
                        for delivery in deliveries {
                            self.handle_delivery(delivery).await;
                        }
                    }
                    Err(e) => warn!("Failed to claim pending messages: {}", e),
                }
            }

            let deliveries = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                result = self
                    .queue
                    .consume(&self.consumer_name, self.config.consume_block_ms, 1) =>
                {
                    match result {
                        Ok(deliveries) => deliveries,
                        Err(e) => {
                            error!("Error consuming tasks: {}", e);
                            // Back off on broker trouble
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            continue;
                        }
                    }
                }
            };

            for delivery in deliveries {
                self.handle_delivery(delivery).await;
            }
        }

        info!("Task executor stopped");
        Ok(())
    }

    /// Signal shutdown; the in-flight message still runs to completion.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    async fn handle_delivery(&self, delivery: TaskDelivery) {
        let outcome = self.process(&delivery.payload).await;
        self.settle(&delivery, outcome).await;
    }

    /// Received → Processing: decode the payload, run the orchestrator,
    /// build the completion event.
    async fn process(&self, payload: &[u8]) -> WorkerResult<CompletedUpload> {
        let task = decode_task(payload)?;
        info!(video_id = %task.video_id, user_id = task.user_id, "processing task");

        let processed = self.processor.execute(&task).await?;
        info!(
            video_id = %task.video_id,
            process_id = %processed.process_id,
            master = %processed.master_playlist_url,
            "transcode complete"
        );

        Ok(CompletedUpload::from_task(&task, processed.master_playlist_url))
    }

    /// Translate the processing outcome into the delivery decision.
    async fn settle(&self, delivery: &TaskDelivery, outcome: WorkerResult<CompletedUpload>) {
        match outcome {
            Ok(event) => match self.queue.publish_completed(&event).await {
                Ok(_) => {
                    if let Err(e) = self.queue.ack(&delivery.message_id).await {
                        error!("Failed to ack message {}: {}", delivery.message_id, e);
                    } else {
                        info!(video_id = %event.video_id, "task completed");
                    }
                }
                Err(e) => {
                    // Renditions are uploaded but the event is lost; the
                    // task is rejected, not retried, and the output tree
                    // stays orphaned.
                    self.reject(delivery, &WorkerError::from(e)).await;
                }
            },
            Err(e) => self.reject(delivery, &e).await,
        }
    }

    async fn reject(&self, delivery: &TaskDelivery, err: &WorkerError) {
        error!(stage = err.stage(), "task failed: {}", err);

        let reason = format!("{}: {}", err.stage(), err);
        if let Err(reject_err) = self
            .queue
            .reject(&delivery.message_id, &delivery.payload, &reason)
            .await
        {
            error!(
                "Failed to reject message {}: {}",
                delivery.message_id, reject_err
            );
        }
    }
}

/// Decode an inbound payload.
///
/// A failure here rejects the message before the orchestrator or the
/// object store are ever involved.
fn decode_task(payload: &[u8]) -> WorkerResult<VideoTask> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_task() {
        let payload = br#"{
            "video_id": "9f7f1c6e-2a4b-4f58-8a2d-3d5b8e7c1a90",
            "user_id": 7,
            "video_title": "demo"
        }"#;

        let task = decode_task(payload).unwrap();
        assert_eq!(task.user_id, 7);
        assert_eq!(task.video_title, "demo");
    }

    #[test]
    fn test_decode_malformed_task_fails_before_processing() {
        for payload in [&b"not json"[..], br#"{"video_id": 5}"#, b""] {
            let err = decode_task(payload).unwrap_err();
            assert!(matches!(err, WorkerError::MalformedTask(_)));
            assert_eq!(err.stage(), "decode");
        }
    }
}
