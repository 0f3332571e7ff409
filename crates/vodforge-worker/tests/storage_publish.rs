//! Storage integration tests.

use std::time::Duration;

use vodforge_storage::StorageClient;

/// Publish a small rendition tree and presign the master playlist.
#[tokio::test]
#[ignore = "requires an S3-compatible endpoint"]
async fn test_publish_tree_and_presign() {
    dotenvy::dotenv().ok();

    let storage = StorageClient::from_env().expect("Failed to create storage client");

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("master.m3u8"), b"#EXTM3U\n").unwrap();
    std::fs::write(dir.path().join("stream_0.m3u8"), b"#EXTM3U\n").unwrap();
    std::fs::write(dir.path().join("segment_0_0.ts"), vec![0u8; 1024]).unwrap();

    let prefix = format!("{}/{}", storage.bucket(), uuid::Uuid::new_v4());
    storage
        .publish_tree(dir.path(), &prefix)
        .await
        .expect("publish failed");

    let url = storage
        .presign_get(&format!("{}/master.m3u8", prefix), Duration::from_secs(60))
        .await
        .expect("presign failed");
    assert!(url.contains("master.m3u8"));
}
