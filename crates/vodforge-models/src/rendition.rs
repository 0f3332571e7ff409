//! Rendition descriptors and probed source metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One resolution/bitrate variant of a source video.
///
/// A ladder is an ordered sequence of renditions, descending by
/// resolution, unique by name. No rendition is ever taller than its
/// source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Rendition {
    /// Rung name, e.g. "720p"; also the HLS variant name
    pub name: String,
    /// Target width in pixels
    pub width: u32,
    /// Target height in pixels
    pub height: u32,
    /// Target video bitrate in kbit/s
    pub bitrate_kbps: u32,
}

impl fmt::Display for Rendition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{} @ {}k)",
            self.name, self.width, self.height, self.bitrate_kbps
        )
    }
}

/// Source metadata derived by probing; recomputed per task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    /// Source width in pixels
    pub width: u32,
    /// Source height in pixels
    pub height: u32,
    /// Measured source bitrate in kbit/s; 0.0 when the container
    /// reports none
    pub source_bitrate_kbps: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendition_display() {
        let r = Rendition {
            name: "720p".to_string(),
            width: 1280,
            height: 720,
            bitrate_kbps: 2800,
        };
        assert_eq!(r.to_string(), "720p (1280x720 @ 2800k)");
    }

    #[test]
    fn test_metadata_round_trip() {
        let meta = VideoMetadata {
            width: 1920,
            height: 1080,
            source_bitrate_kbps: 8000.0,
        };
        let json = serde_json::to_string(&meta).unwrap();
        let back: VideoMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, back);
    }
}
