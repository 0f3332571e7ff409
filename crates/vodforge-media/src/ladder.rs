//! Bitrate ladder planning.
//!
//! Pure and deterministic: the same metadata always yields the same
//! ladder, byte for byte. No I/O happens here.

use vodforge_models::encoding::MAX_VIDEO_BITRATE_KBPS;
use vodforge_models::{Rendition, VideoMetadata};

use crate::error::{MediaError, MediaResult};

/// Candidate rungs, descending. Rungs taller than the source are
/// discarded; the source is never upscaled.
const CANDIDATE_RUNGS: [(u32, u32, &str); 4] = [
    (1920, 1080, "1080p"),
    (1280, 720, "720p"),
    (854, 480, "480p"),
    (640, 360, "360p"),
];

/// Frame rate assumed by the bitrate baseline.
const REFERENCE_FRAME_RATE: f64 = 30.0;
/// Bits allocated per pixel per frame, expressed as a fraction.
const QUALITY_COEFFICIENT: f64 = 0.2;
/// Cap applied against the measured source bitrate.
const SOURCE_BITRATE_HEADROOM: f64 = 0.9;
/// Headroom versus the theoretical per-rung maximum.
const RUNG_DOWNSCALE: f64 = 0.8;

/// Plan the rendition ladder for a probed source.
///
/// The baseline bitrate derives from the source pixel count at the
/// reference frame rate, capped at 90% of the measured source bitrate
/// when one exists. Each surviving rung gets the baseline scaled by its
/// height relative to the source, downscaled for headroom and clamped
/// to [`MAX_VIDEO_BITRATE_KBPS`].
///
/// Fails when the source has no usable dimensions or when no rung
/// survives (source shorter than the smallest rung); the caller treats
/// both as fatal for the task.
pub fn plan(meta: &VideoMetadata) -> MediaResult<Vec<Rendition>> {
    if meta.width == 0 || meta.height == 0 {
        return Err(MediaError::InvalidVideo(format!(
            "unusable source dimensions {}x{}",
            meta.width, meta.height
        )));
    }

    let mut baseline_kbps =
        meta.width as f64 * meta.height as f64 * REFERENCE_FRAME_RATE * QUALITY_COEFFICIENT
            / 1000.0;

    // Never allocate more bits than the source actually carries. An
    // unmeasured bitrate (0.0) leaves the pixel-based baseline as is.
    if meta.source_bitrate_kbps > 0.0 && baseline_kbps > meta.source_bitrate_kbps {
        baseline_kbps = meta.source_bitrate_kbps * SOURCE_BITRATE_HEADROOM;
    }

    let mut ladder = Vec::new();
    for (width, height, name) in CANDIDATE_RUNGS {
        if height > meta.height {
            continue;
        }
        let mut rate = baseline_kbps * (height as f64 / meta.height as f64) * RUNG_DOWNSCALE;
        if rate > MAX_VIDEO_BITRATE_KBPS as f64 {
            rate = MAX_VIDEO_BITRATE_KBPS as f64;
        }
        ladder.push(Rendition {
            name: name.to_string(),
            width,
            height,
            bitrate_kbps: rate as u32,
        });
    }

    if ladder.is_empty() {
        return Err(MediaError::EmptyLadder {
            source_height: meta.height,
        });
    }

    Ok(ladder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(width: u32, height: u32, bitrate: f64) -> VideoMetadata {
        VideoMetadata {
            width,
            height,
            source_bitrate_kbps: bitrate,
        }
    }

    #[test]
    fn test_full_hd_source_yields_four_rungs() {
        let ladder = plan(&meta(1920, 1080, 8000.0)).unwrap();

        let names: Vec<&str> = ladder.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["1080p", "720p", "480p", "360p"]);

        for pair in ladder.windows(2) {
            assert!(pair[0].bitrate_kbps > pair[1].bitrate_kbps);
            assert!(pair[0].height > pair[1].height);
        }
    }

    #[test]
    fn test_short_source_keeps_only_smallest_rung() {
        let ladder = plan(&meta(712, 400, 2000.0)).unwrap();
        assert_eq!(ladder.len(), 1);
        assert_eq!(ladder[0].name, "360p");
    }

    #[test]
    fn test_never_upscales() {
        for source_height in [360, 480, 700, 720, 1080, 2160] {
            let ladder = plan(&meta(source_height * 16 / 9, source_height, 6000.0)).unwrap();
            for rung in ladder {
                assert!(rung.height <= source_height);
            }
        }
    }

    #[test]
    fn test_bitrates_respect_ceiling() {
        // 4K at a huge source bitrate pushes every rung against the cap
        let ladder = plan(&meta(3840, 2160, 80_000.0)).unwrap();
        for rung in &ladder {
            assert!(rung.bitrate_kbps <= MAX_VIDEO_BITRATE_KBPS);
        }
        assert_eq!(ladder[0].bitrate_kbps, MAX_VIDEO_BITRATE_KBPS);
    }

    #[test]
    fn test_source_bitrate_binds_baseline() {
        // Pixel baseline (~12442k) far exceeds the 1000k source, so the
        // top rung gets at most 90% of source, downscaled by 0.8.
        let ladder = plan(&meta(1920, 1080, 1000.0)).unwrap();
        assert_eq!(ladder[0].bitrate_kbps, 720);
        for rung in &ladder {
            assert!(f64::from(rung.bitrate_kbps) <= 1000.0 * 0.9);
        }
    }

    #[test]
    fn test_unknown_source_bitrate_skips_cap() {
        let ladder = plan(&meta(1280, 720, 0.0)).unwrap();
        assert!(ladder.iter().all(|r| r.bitrate_kbps > 0));
    }

    #[test]
    fn test_planning_is_deterministic() {
        let m = meta(1920, 1080, 8000.0);
        assert_eq!(plan(&m).unwrap(), plan(&m).unwrap());
    }

    #[test]
    fn test_tiny_source_is_an_error() {
        let err = plan(&meta(320, 200, 500.0)).unwrap_err();
        assert!(matches!(err, MediaError::EmptyLadder { source_height: 200 }));
    }

    #[test]
    fn test_degenerate_dimensions_are_an_error() {
        assert!(matches!(
            plan(&meta(0, 0, 500.0)),
            Err(MediaError::InvalidVideo(_))
        ));
    }
}
