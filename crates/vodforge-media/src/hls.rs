//! Single-pass multi-rendition HLS packaging.
//!
//! One FFmpeg invocation splits the source video stream into one branch
//! per rung, scales and encodes each branch, splits the audio alongside
//! and muxes everything into segmented HLS with a variant playlist per
//! rung and one master playlist. All output names are deterministic.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use vodforge_models::encoding::{
    AUDIO_BITRATE, AUDIO_CODEC, MASTER_PLAYLIST_NAME, SEGMENT_DURATION_SECS,
    SEGMENT_FILENAME_PATTERN, VARIANT_PLAYLIST_PATTERN, VIDEO_CODEC,
};
use vodforge_models::Rendition;

use crate::error::{MediaError, MediaResult};

/// Transcode a source into the full rendition set under `output_dir`.
///
/// The ladder must be non-empty. A non-zero exit, an unreadable or
/// corrupt source, or a full disk all fail the call with FFmpeg's
/// diagnostic output attached; there is no partial retry. When a
/// timeout is set the process is killed on expiry.
pub async fn transcode(
    source_url: &str,
    output_dir: &Path,
    ladder: &[Rendition],
    timeout: Option<Duration>,
) -> MediaResult<()> {
    if ladder.is_empty() {
        return Err(MediaError::InvalidVideo(
            "refusing to transcode with an empty ladder".to_string(),
        ));
    }

    // Check FFmpeg exists
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let args = build_transcode_args(source_url, output_dir, ladder);
    debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drain stderr concurrently so a chatty encode cannot fill the pipe
    // and deadlock the child.
    let mut stderr = child.stderr.take().expect("stderr not captured");
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        stderr.read_to_string(&mut buf).await.ok();
        buf
    });

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    "FFmpeg timed out after {} seconds, killing process",
                    limit.as_secs()
                );
                child.kill().await.ok();
                return Err(MediaError::Timeout(limit.as_secs()));
            }
        },
        None => child.wait().await?,
    };

    let diagnostics = stderr_task.await.unwrap_or_default();

    if status.success() {
        Ok(())
    } else {
        Err(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some(diagnostics),
            status.code(),
        ))
    }
}

/// Build the full FFmpeg argument list for one multi-output HLS pass.
pub fn build_transcode_args(
    source_url: &str,
    output_dir: &Path,
    ladder: &[Rendition],
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        source_url.to_string(),
        "-filter_complex".to_string(),
        filter_graph(ladder),
    ];

    // One video and one audio map per rung, in rung order
    for i in 0..ladder.len() {
        args.push("-map".to_string());
        args.push(format!("[v{}out]", i));
        args.push("-map".to_string());
        args.push(format!("[a{}]", i));
    }

    // Per-branch codec and bitrate flags
    for (i, rung) in ladder.iter().enumerate() {
        args.push(format!("-c:v:{}", i));
        args.push(VIDEO_CODEC.to_string());
        args.push(format!("-b:v:{}", i));
        args.push(format!("{}k", rung.bitrate_kbps));
        args.push(format!("-c:a:{}", i));
        args.push(AUDIO_CODEC.to_string());
        args.push(format!("-b:a:{}", i));
        args.push(AUDIO_BITRATE.to_string());
    }

    args.extend([
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        SEGMENT_DURATION_SECS.to_string(),
        "-hls_playlist_type".to_string(),
        "vod".to_string(),
        "-hls_segment_filename".to_string(),
        output_dir
            .join(SEGMENT_FILENAME_PATTERN)
            .to_string_lossy()
            .to_string(),
        "-var_stream_map".to_string(),
        var_stream_map(ladder),
        "-master_pl_name".to_string(),
        MASTER_PLAYLIST_NAME.to_string(),
        output_dir
            .join(VARIANT_PLAYLIST_PATTERN)
            .to_string_lossy()
            .to_string(),
    ]);

    args
}

/// Build the split/scale filter graph:
/// `[0:v]split=N[v0]..;[v0]scale=W:H[v0out];..;[0:a]asplit=N[a0]..`.
fn filter_graph(ladder: &[Rendition]) -> String {
    let n = ladder.len();

    let split_labels: String = (0..n).map(|i| format!("[v{}]", i)).collect();
    let audio_labels: String = (0..n).map(|i| format!("[a{}]", i)).collect();
    let scale_chains: Vec<String> = ladder
        .iter()
        .enumerate()
        .map(|(i, rung)| format!("[v{}]scale={}:{}[v{}out]", i, rung.width, rung.height, i))
        .collect();

    format!(
        "[0:v]split={}{};{};[0:a]asplit={}{}",
        n,
        split_labels,
        scale_chains.join(";"),
        n,
        audio_labels
    )
}

/// Bind each encoded branch pair to its rung name for the master
/// playlist: `v:0,a:0,name:1080p v:1,a:1,name:720p ...`.
fn var_stream_map(ladder: &[Rendition]) -> String {
    ladder
        .iter()
        .enumerate()
        .map(|(i, rung)| format!("v:{},a:{},name:{}", i, i, rung.name))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn two_rung_ladder() -> Vec<Rendition> {
        vec![
            Rendition {
                name: "720p".to_string(),
                width: 1280,
                height: 720,
                bitrate_kbps: 2800,
            },
            Rendition {
                name: "360p".to_string(),
                width: 640,
                height: 360,
                bitrate_kbps: 900,
            },
        ]
    }

    #[test]
    fn test_filter_graph_two_rungs() {
        let graph = filter_graph(&two_rung_ladder());
        assert_eq!(
            graph,
            "[0:v]split=2[v0][v1];[v0]scale=1280:720[v0out];[v1]scale=640:360[v1out];[0:a]asplit=2[a0][a1]"
        );
    }

    #[test]
    fn test_var_stream_map_binds_names_by_index() {
        let map = var_stream_map(&two_rung_ladder());
        assert_eq!(map, "v:0,a:0,name:720p v:1,a:1,name:360p");
    }

    #[test]
    fn test_transcode_args_per_branch_flags() {
        let out = PathBuf::from("/tmp/out");
        let args = build_transcode_args("http://example/source", &out, &two_rung_ladder());

        for flag in [
            "-c:v:0", "-c:v:1", "-b:v:0", "-b:v:1", "-c:a:0", "-c:a:1", "-b:a:0", "-b:a:1",
        ] {
            assert!(args.contains(&flag.to_string()), "missing {}", flag);
        }
        assert!(args.contains(&"2800k".to_string()));
        assert!(args.contains(&"900k".to_string()));
        assert!(args.contains(&VIDEO_CODEC.to_string()));
        assert!(args.contains(&AUDIO_CODEC.to_string()));
    }

    #[test]
    fn test_transcode_args_hls_outputs() {
        let out = PathBuf::from("/tmp/out");
        let args = build_transcode_args("http://example/source", &out, &two_rung_ladder());

        assert!(args.contains(&"-master_pl_name".to_string()));
        assert!(args.contains(&MASTER_PLAYLIST_NAME.to_string()));
        assert!(args.contains(&"/tmp/out/segment_%v_%d.ts".to_string()));
        // The variant playlist pattern is the output target, last
        assert_eq!(args.last().unwrap(), "/tmp/out/stream_%v.m3u8");
        assert!(args.contains(&"-hls_playlist_type".to_string()));
        assert!(args.contains(&"vod".to_string()));
        assert!(args.contains(&SEGMENT_DURATION_SECS.to_string()));
    }

    #[test]
    fn test_transcode_args_map_order_matches_rungs() {
        let out = PathBuf::from("/tmp/out");
        let args = build_transcode_args("src", &out, &two_rung_ladder());

        let mut maps = Vec::new();
        for i in 0..args.len() - 1 {
            if args[i] == "-map" {
                maps.push(args[i + 1].as_str());
            }
        }
        assert_eq!(maps, ["[v0out]", "[a0]", "[v1out]", "[a1]"]);
    }
}
