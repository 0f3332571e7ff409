//! Task orchestration.
//!
//! One task flows through: presigned source URL → probe → ladder plan →
//! single-pass HLS transcode into a scratch directory → recursive
//! publish under a fresh process prefix. The scratch directory is a
//! [`tempfile::TempDir`], so it is removed on every exit path,
//! including unwinds.

use tracing::info;
use uuid::Uuid;

use vodforge_media::{hls, ladder, probe};
use vodforge_models::encoding::MASTER_PLAYLIST_NAME;
use vodforge_models::VideoTask;
use vodforge_storage::StorageClient;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;

/// Result of one fully processed task.
#[derive(Debug, Clone)]
pub struct ProcessedVideo {
    /// Object path of the published master playlist
    pub master_playlist_url: String,
    /// Output prefix this attempt published under
    pub process_id: String,
}

/// Orchestrates the per-task pipeline against injected clients.
pub struct VideoProcessor {
    storage: StorageClient,
    config: WorkerConfig,
}

impl VideoProcessor {
    /// Create a new processor.
    pub fn new(storage: StorageClient, config: WorkerConfig) -> Self {
        Self { storage, config }
    }

    /// Process one task end to end.
    pub async fn execute(&self, task: &VideoTask) -> WorkerResult<ProcessedVideo> {
        // Fresh prefix per attempt: reprocessing the same video never
        // collides with an earlier output tree.
        let process_id = Uuid::new_v4().to_string();

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let work_dir = tempfile::Builder::new()
            .prefix("vodforge-")
            .tempdir_in(&self.config.work_dir)?;
        let output_dir = work_dir.path().join("renditions");
        tokio::fs::create_dir_all(&output_dir).await?;

        let bucket = self.storage.bucket();
        let source_path = format!("{}/{}", bucket, task.video_id);
        let source_url = self
            .storage
            .presign_get(&source_path, self.config.presign_expiry)
            .await?;

        info!(video_id = %task.video_id, process_id = %process_id, "probing source");
        let meta = probe::probe_source(&source_url).await?;
        let rungs = ladder::plan(&meta)?;
        info!(
            video_id = %task.video_id,
            rungs = rungs.len(),
            top = %rungs[0],
            "planned rendition ladder"
        );

        hls::transcode(
            &source_url,
            &output_dir,
            &rungs,
            self.config.transcode_timeout,
        )
        .await?;

        let remote_prefix = format!("{}/{}", bucket, process_id);
        self.storage.publish_tree(&output_dir, &remote_prefix).await?;

        Ok(ProcessedVideo {
            master_playlist_url: master_playlist_path(bucket, &process_id),
            process_id,
        })
    }
}

/// Deterministic object path of a published master playlist.
///
/// Computable without re-reading storage because the transcoder writes
/// the master under the same fixed name.
pub fn master_playlist_path(bucket: &str, process_id: &str) -> String {
    format!("{}/{}/{}", bucket, process_id, MASTER_PLAYLIST_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vodforge_storage::StorageConfig;

    #[test]
    fn test_master_playlist_path_shape() {
        let process_id = Uuid::new_v4().to_string();
        let path = master_playlist_path("videos", &process_id);
        assert_eq!(path, format!("videos/{}/master.m3u8", process_id));
    }

    /// A failing task must not leave its scratch directory behind.
    /// Probing an unreachable endpoint fails the pipeline early either
    /// way, whether ffprobe is installed or not.
    #[tokio::test]
    async fn test_failed_task_leaves_no_scratch_dirs() {
        let scratch = tempfile::tempdir().unwrap();
        let storage = StorageClient::new(StorageConfig {
            endpoint_url: "http://127.0.0.1:9".to_string(),
            access_key_id: "test".to_string(),
            secret_access_key: "test".to_string(),
            bucket_name: "videos".to_string(),
            region: "us-east-1".to_string(),
        });
        let config = WorkerConfig {
            work_dir: scratch.path().to_string_lossy().to_string(),
            ..Default::default()
        };
        let processor = VideoProcessor::new(storage, config);
        let task = VideoTask {
            video_id: Uuid::new_v4(),
            user_id: 1,
            video_title: "unreachable".to_string(),
        };

        assert!(processor.execute(&task).await.is_err());

        let leftovers: Vec<_> = std::fs::read_dir(scratch.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }
}
