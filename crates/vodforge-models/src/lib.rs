//! Shared data models for the Vodforge transcoding worker.
//!
//! This crate provides Serde-serializable types for:
//! - Inbound transcoding tasks and outbound completion events
//! - Rendition descriptors and probed source metadata
//! - Fixed encoding and HLS packaging constants

pub mod encoding;
pub mod rendition;
pub mod task;

// Re-export common types
pub use rendition::{Rendition, VideoMetadata};
pub use task::{CompletedUpload, VideoTask};
