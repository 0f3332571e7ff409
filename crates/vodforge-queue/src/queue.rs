//! Task queue using Redis Streams.
//!
//! Tasks travel as raw JSON payloads in the `task` field of stream
//! entries; deserialization is the consumer's job so a malformed body
//! can be rejected without touching the rest of the pipeline. Reading
//! through a consumer group keeps delivered-but-unacknowledged entries
//! in the pending list, which gives at-least-once delivery: a crashed
//! worker's messages can be claimed by the next one.

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use vodforge_models::{CompletedUpload, VideoTask};

use crate::error::{QueueError, QueueResult};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream carrying inbound transcoding tasks
    pub task_stream: String,
    /// Consumer group for workers
    pub consumer_group: String,
    /// Stream receiving completion events
    pub completed_stream: String,
    /// Stream receiving rejected tasks, for external replay
    pub rejected_stream: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            task_stream: "vodforge:tasks".to_string(),
            consumer_group: "vodforge:workers".to_string(),
            completed_stream: "vodforge:completed".to_string(),
            rejected_stream: "vodforge:rejected".to_string(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            task_stream: std::env::var("TASK_STREAM").unwrap_or(defaults.task_stream),
            consumer_group: std::env::var("TASK_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            completed_stream: std::env::var("COMPLETED_STREAM")
                .unwrap_or(defaults.completed_stream),
            rejected_stream: std::env::var("REJECTED_STREAM").unwrap_or(defaults.rejected_stream),
        }
    }
}

/// One delivered task message, not yet deserialized.
#[derive(Debug, Clone)]
pub struct TaskDelivery {
    /// Stream entry ID, used for ack/reject
    pub message_id: String,
    /// Raw JSON task body
    pub payload: Vec<u8>,
}

/// Task queue client.
pub struct TaskQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl TaskQueue {
    /// Create a new task queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Initialize the queue (create the consumer group if missing).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.task_stream)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a transcoding task.
    pub async fn enqueue_task(&self, task: &VideoTask) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(task)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.task_stream)
            .arg("*")
            .arg("task")
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        info!(
            "Enqueued task for video {} with message ID {}",
            task.video_id, message_id
        );
        Ok(message_id)
    }

    /// Consume task deliveries for this consumer.
    ///
    /// Payloads come back raw; the caller deserializes and decides the
    /// fate of each message.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<TaskDelivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.task_stream)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let mut deliveries = Vec::new();
        for stream_key in result.keys {
            for entry in stream_key.ids {
                if let Some(redis::Value::BulkString(payload)) = entry.map.get("task") {
                    deliveries.push(TaskDelivery {
                        message_id: entry.id.clone(),
                        payload: payload.clone(),
                    });
                } else {
                    warn!("Stream entry {} carries no task field, dropping", entry.id);
                    self.ack(&entry.id).await.ok();
                }
            }
        }

        Ok(deliveries)
    }

    /// Acknowledge a processed message and remove it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.task_stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.task_stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged message: {}", message_id);
        Ok(())
    }

    /// Reject a message: copy it to the rejected stream with the error
    /// reason, then acknowledge the original so it is never requeued.
    ///
    /// Nothing retries rejected tasks automatically; recovery is an
    /// external replay of the rejected stream.
    pub async fn reject(&self, message_id: &str, payload: &[u8], error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XADD")
            .arg(&self.config.rejected_stream)
            .arg("*")
            .arg("task")
            .arg(payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!("Rejected message {}: {}", message_id, error);
        Ok(())
    }

    /// Publish a completion event to the outbound stream.
    pub async fn publish_completed(&self, event: &CompletedUpload) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(event)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.completed_stream)
            .arg("*")
            .arg("event")
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::publish_failed(e.to_string()))?;

        debug!(
            "Published completion for video {} as {}",
            event.video_id, message_id
        );
        Ok(message_id)
    }

    /// Claim pending messages idle longer than `min_idle_ms`.
    ///
    /// This adopts deliveries owned by crashed workers so the
    /// at-least-once contract holds across restarts.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<TaskDelivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&self.config.task_stream)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;

        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let result: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.task_stream)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg("0-0") // Claim anything at or after the first entry
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut deliveries = Vec::new();
        for entry in result.ids {
            if let Some(redis::Value::BulkString(payload)) = entry.map.get("task") {
                info!("Claimed pending message {} from stream", entry.id);
                deliveries.push(TaskDelivery {
                    message_id: entry.id.clone(),
                    payload: payload.clone(),
                });
            } else {
                warn!("Claimed entry {} carries no task field, dropping", entry.id);
                self.ack(&entry.id).await.ok();
            }
        }

        Ok(deliveries)
    }

    /// Inbound stream length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.task_stream).await?;
        Ok(len)
    }

    /// Rejected stream length.
    pub async fn rejected_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.rejected_stream).await?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_streams_are_distinct() {
        let config = QueueConfig::default();
        assert_ne!(config.task_stream, config.completed_stream);
        assert_ne!(config.task_stream, config.rejected_stream);
        assert_ne!(config.completed_stream, config.rejected_stream);
    }
}
