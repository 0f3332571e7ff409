//! FFprobe source probing.

use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use vodforge_models::VideoMetadata;

use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    bit_rate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    bit_rate: Option<String>,
}

/// Probe a source locator (local path or presigned URL) for the
/// metadata the ladder planner needs.
pub async fn probe_source(source: &str) -> MediaResult<VideoMetadata> {
    // Check FFprobe exists
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(source)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            format!("FFprobe failed for {}", source),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    let meta = parse_probe_output(&output.stdout, source)?;
    debug!(
        width = meta.width,
        height = meta.height,
        bitrate_kbps = meta.source_bitrate_kbps,
        "probed source"
    );
    Ok(meta)
}

/// Parse FFprobe JSON into [`VideoMetadata`].
///
/// Dimensions come from the first `codec_type == "video"` stream; the
/// bitrate from the container, falling back to the stream itself. A
/// source without a video stream is an error, a missing bitrate is not.
fn parse_probe_output(raw: &[u8], source: &str) -> MediaResult<VideoMetadata> {
    let probe: FfprobeOutput = serde_json::from_slice(raw)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::NoVideoStream(source.to_string()))?;

    let raw_bitrate = probe
        .format
        .bit_rate
        .as_deref()
        .or(video_stream.bit_rate.as_deref());

    // bit/s on the wire, kbit/s internally
    let source_bitrate_kbps = raw_bitrate
        .and_then(|b| b.parse::<f64>().ok())
        .map(|b| b / 1000.0)
        .unwrap_or(0.0);

    Ok(VideoMetadata {
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        source_bitrate_kbps,
    })
}
