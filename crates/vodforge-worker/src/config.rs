//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base directory for per-task scratch directories
    pub work_dir: String,
    /// Lifetime of presigned source URLs
    pub presign_expiry: Duration,
    /// Wall-clock bound on one transcode; `None` disables the bound
    pub transcode_timeout: Option<Duration>,
    /// How often to scan for pending messages from crashed workers
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message can be claimed
    pub claim_min_idle: Duration,
    /// How long one consume call blocks waiting for a message, ms
    pub consume_block_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: "/tmp/vodforge".to_string(),
            presign_expiry: Duration::from_secs(3600),
            transcode_timeout: Some(Duration::from_secs(3600)),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            consume_block_ms: 1000,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// `WORKER_TRANSCODE_TIMEOUT_SECS=0` disables the transcode bound.
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("WORKER_TRANSCODE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600u64);

        Self {
            work_dir: std::env::var("WORKER_WORK_DIR")
                .unwrap_or_else(|_| "/tmp/vodforge".to_string()),
            presign_expiry: Duration::from_secs(
                std::env::var("PRESIGN_EXPIRY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            transcode_timeout: match timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("WORKER_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            consume_block_ms: std::env::var("WORKER_CONSUME_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        }
    }
}
