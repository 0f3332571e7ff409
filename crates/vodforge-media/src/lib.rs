//! FFmpeg CLI wrapper for HLS packaging.
//!
//! This crate provides:
//! - FFprobe source probing
//! - The pure bitrate ladder planner
//! - Single-pass multi-rendition HLS transcoding

pub mod error;
pub mod hls;
pub mod ladder;
pub mod probe;

pub use error::{MediaError, MediaResult};
pub use hls::transcode;
pub use ladder::plan;
pub use probe::probe_source;
