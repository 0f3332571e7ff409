//! Redis Streams task queue.
//!
//! This crate provides:
//! - Task consumption through a consumer group (at-least-once)
//! - Acknowledge / reject with a rejected-task stream for external replay
//! - Stale pending-entry claiming for crash recovery
//! - Outbound completion-event publishing

pub mod error;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::{QueueConfig, TaskDelivery, TaskQueue};
