//! Recursive directory publishing.
//!
//! Traversal is separated from I/O: [`plan_tree`] walks the local
//! directory and yields deterministic `(local, remote)` pairs, and
//! [`StorageClient::publish_tree`] consumes them through streaming
//! uploads, aborting on the first failure.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::client::StorageClient;
use crate::error::{StorageError, StorageResult};

/// One planned upload: a local regular file and its remote object path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    /// Local file to read
    pub local_path: PathBuf,
    /// Full `{bucket}/{key}` destination
    pub remote_path: String,
    /// Content type derived from the file extension
    pub content_type: &'static str,
}

/// Walk `local_dir` and plan one upload per regular file.
///
/// Relative sub-paths are preserved under `remote_prefix` with
/// forward-slash separators; directories only contribute structure.
/// The result is sorted by remote path so the publish order is
/// deterministic.
pub async fn plan_tree(local_dir: &Path, remote_prefix: &str) -> StorageResult<Vec<UploadEntry>> {
    let remote_prefix = remote_prefix.trim_end_matches('/');
    let mut entries = Vec::new();
    let mut stack: Vec<(PathBuf, String)> = vec![(local_dir.to_path_buf(), String::new())];

    while let Some((dir, rel_prefix)) = stack.pop() {
        let mut read_dir = fs::read_dir(&dir).await?;
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let file_type = dir_entry.file_type().await?;
            let name = dir_entry.file_name().to_string_lossy().to_string();
            let rel = if rel_prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", rel_prefix, name)
            };

            if file_type.is_dir() {
                stack.push((dir_entry.path(), rel));
            } else if file_type.is_file() {
                entries.push(UploadEntry {
                    local_path: dir_entry.path(),
                    remote_path: format!("{}/{}", remote_prefix, rel),
                    content_type: content_type_for(&name),
                });
            }
        }
    }

    entries.sort_by(|a, b| a.remote_path.cmp(&b.remote_path));
    Ok(entries)
}

fn content_type_for(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

impl StorageClient {
    /// Publish every regular file under `local_dir` to
    /// `{remote_prefix}/<relative-path>`.
    ///
    /// Each file lands whole or the call fails naming it; no further
    /// files are attempted after the first failure.
    pub async fn publish_tree(&self, local_dir: &Path, remote_prefix: &str) -> StorageResult<()> {
        let entries = plan_tree(local_dir, remote_prefix).await?;
        info!("Publishing {} files under {}", entries.len(), remote_prefix);

        for entry in &entries {
            self.upload_entry(entry).await.map_err(|e| {
                StorageError::upload_failed(format!("{}: {}", entry.local_path.display(), e))
            })?;
        }

        Ok(())
    }

    async fn upload_entry(&self, entry: &UploadEntry) -> StorageResult<()> {
        let mut file = fs::File::open(&entry.local_path).await?;
        let mut dest = self
            .open_upload(&entry.remote_path, entry.content_type)
            .await?;

        tokio::io::copy(&mut file, &mut dest).await?;
        dest.finish().await?;

        debug!(
            "Uploaded {} -> {}",
            entry.local_path.display(),
            entry.remote_path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"data").unwrap();
    }

    #[tokio::test]
    async fn test_plan_tree_preserves_structure() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("master.m3u8"));
        touch(&root.join("stream_0.m3u8"));
        std::fs::create_dir(root.join("segments")).unwrap();
        touch(&root.join("segments").join("segment_0_0.ts"));

        let entries = plan_tree(root, "videos/p-1").await.unwrap();

        let remotes: Vec<&str> = entries.iter().map(|e| e.remote_path.as_str()).collect();
        assert_eq!(
            remotes,
            [
                "videos/p-1/master.m3u8",
                "videos/p-1/segments/segment_0_0.ts",
                "videos/p-1/stream_0.m3u8",
            ]
        );
    }

    #[tokio::test]
    async fn test_plan_tree_one_entry_per_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("a").join("b")).unwrap();
        touch(&root.join("a").join("b").join("deep.ts"));
        touch(&root.join("top.ts"));

        let entries = plan_tree(root, "bucket/prefix/").await.unwrap();
        assert_eq!(entries.len(), 2);
        // Directories themselves never become objects
        assert!(entries.iter().all(|e| e.remote_path.ends_with(".ts")));
        assert!(entries
            .iter()
            .any(|e| e.remote_path == "bucket/prefix/a/b/deep.ts"));
    }

    #[tokio::test]
    async fn test_plan_tree_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let entries = plan_tree(dir.path(), "bucket/p").await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_plan_tree_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for name in ["zeta.ts", "alpha.ts", "mid.m3u8"] {
            touch(&root.join(name));
        }

        let first = plan_tree(root, "b/p").await.unwrap();
        let second = plan_tree(root, "b/p").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].remote_path, "b/p/alpha.ts");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("master.m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for("segment_0_1.ts"), "video/mp2t");
        assert_eq!(content_type_for("source.mp4"), "video/mp4");
        assert_eq!(content_type_for("notes.txt"), "application/octet-stream");
    }
}
