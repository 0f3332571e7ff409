//! Worker error types.

use thiserror::Error;

use vodforge_media::MediaError;
use vodforge_queue::QueueError;
use vodforge_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Malformed task payload: {0}")]
    MalformedTask(#[from] serde_json::Error),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Pipeline stage the failure belongs to, recorded with every
    /// rejection so replays can tell why a task died.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::MalformedTask(_) => "decode",
            Self::Media(
                MediaError::FfprobeNotFound
                | MediaError::FfprobeFailed { .. }
                | MediaError::NoVideoStream(_)
                | MediaError::JsonParse(_),
            ) => "probe",
            Self::Media(MediaError::EmptyLadder { .. } | MediaError::InvalidVideo(_)) => "plan",
            Self::Media(_) => "transcode",
            Self::Storage(_) => "store",
            Self::Queue(_) => "publish",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_for_malformed_payload() {
        let err = serde_json::from_slice::<vodforge_models::VideoTask>(b"not json").unwrap_err();
        assert_eq!(WorkerError::from(err).stage(), "decode");
    }

    #[test]
    fn test_stage_for_ladder_and_transcode_failures() {
        let plan = WorkerError::from(MediaError::EmptyLadder { source_height: 120 });
        assert_eq!(plan.stage(), "plan");

        let transcode = WorkerError::from(MediaError::ffmpeg_failed("boom", None, Some(1)));
        assert_eq!(transcode.stage(), "transcode");

        let probe = WorkerError::from(MediaError::NoVideoStream("src".to_string()));
        assert_eq!(probe.stage(), "probe");
    }
}
