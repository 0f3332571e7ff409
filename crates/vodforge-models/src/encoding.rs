//! Fixed encoding and HLS packaging constants.
//!
//! Every output name below is deterministic so the orchestrator can
//! compute published object paths without re-listing the output
//! directory.

/// Video codec for every rendition (H.264)
pub const VIDEO_CODEC: &str = "libx264";
/// Audio codec for every rendition
pub const AUDIO_CODEC: &str = "aac";
/// Audio bitrate, fixed across renditions
pub const AUDIO_BITRATE: &str = "128k";

/// Hard ceiling on any rendition's video bitrate, kbit/s
pub const MAX_VIDEO_BITRATE_KBPS: u32 = 5000;

/// HLS segment duration in seconds
pub const SEGMENT_DURATION_SECS: u32 = 6;
/// Master playlist filename, fixed and well known
pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";
/// Variant playlist pattern; `%v` is the rung index
pub const VARIANT_PLAYLIST_PATTERN: &str = "stream_%v.m3u8";
/// Segment filename pattern; `%v` is the rung index, `%d` the segment number
pub const SEGMENT_FILENAME_PATTERN: &str = "segment_%v_%d.ts";
