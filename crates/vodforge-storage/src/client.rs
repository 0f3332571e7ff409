//! S3 client implementation.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// S3 minimum part size is 5 MiB; 6 MiB leaves margin.
const MIN_PART_SIZE: usize = 6 * 1024 * 1024;

/// In-memory pipe capacity between the producer and the uploading task.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket holding source videos and published renditions
    pub bucket_name: String,
    /// Region ("us-east-1" satisfies MinIO)
    pub region: String,
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("S3_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("VIDEOS_BUCKET").unwrap_or_else(|_| "videos".to_string()),
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }
}

/// Split an object path into its `{bucket}/{key}` pair.
///
/// The key may itself contain slashes; the bucket may not be empty.
pub fn parse_object_path(path: &str) -> StorageResult<(&str, &str)> {
    match path.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => Err(StorageError::invalid_path(path)),
    }
}

/// S3-compatible object store client.
#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    bucket: String,
}

impl StorageClient {
    /// Create a new client from configuration.
    pub fn new(config: StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "static",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(StorageConfig::from_env()?))
    }

    /// The bucket configured for source videos and published outputs.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Generate a time-limited presigned GET URL for `{bucket}/{key}`.
    pub async fn presign_get(&self, object_path: &str, expires_in: Duration) -> StorageResult<String> {
        let (bucket, key) = parse_object_path(object_path)?;

        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    /// Create the bucket when it does not exist yet.
    pub async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()> {
        if self.client.head_bucket().bucket(bucket).send().await.is_ok() {
            return Ok(());
        }

        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!("Created bucket {}", bucket);
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                // Lost the race against another worker
                if msg.contains("BucketAlreadyOwnedByYou") || msg.contains("BucketAlreadyExists") {
                    Ok(())
                } else {
                    Err(StorageError::bucket_failed(msg))
                }
            }
        }
    }

    /// Open a streaming upload to `{bucket}/{key}`.
    ///
    /// Bytes written to the returned [`ObjectWriter`] flow through an
    /// in-memory pipe into a background multipart upload; nothing
    /// larger than one part is ever buffered. The upload is complete
    /// only once [`ObjectWriter::finish`] returns.
    pub async fn open_upload(
        &self,
        object_path: &str,
        content_type: &str,
    ) -> StorageResult<ObjectWriter> {
        let (bucket, key) = parse_object_path(object_path)?;
        self.ensure_bucket(bucket).await?;

        debug!("Opening streaming upload to {}/{}", bucket, key);

        let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
        let client = self.client.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();
        let content_type = content_type.to_string();

        let task = tokio::spawn(async move {
            drain_to_multipart(client, bucket, key, content_type, reader).await
        });

        Ok(ObjectWriter { writer, task })
    }
}

/// Write half of a streaming upload.
///
/// Implements [`AsyncWrite`]; call [`ObjectWriter::finish`] to close the
/// pipe and surface any error from the background store-side write.
pub struct ObjectWriter {
    writer: DuplexStream,
    task: JoinHandle<StorageResult<()>>,
}

impl ObjectWriter {
    /// Close the stream and wait for the store-side write to land.
    pub async fn finish(self) -> StorageResult<()> {
        let ObjectWriter { mut writer, task } = self;
        writer.shutdown().await?;
        drop(writer);

        match task.await {
            Ok(result) => result,
            Err(e) => Err(StorageError::upload_failed(format!(
                "background upload task failed: {e}"
            ))),
        }
    }
}

impl AsyncWrite for ObjectWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}

/// Drain the pipe's read end into a multipart upload, aborting the
/// upload on any failure so no partial object is left behind.
async fn drain_to_multipart(
    client: Client,
    bucket: String,
    key: String,
    content_type: String,
    mut reader: impl AsyncRead + Unpin,
) -> StorageResult<()> {
    let create = client
        .create_multipart_upload()
        .bucket(&bucket)
        .key(&key)
        .content_type(&content_type)
        .send()
        .await
        .map_err(|e| StorageError::upload_failed(e.to_string()))?;

    let upload_id = create
        .upload_id()
        .ok_or_else(|| StorageError::upload_failed("multipart upload id missing"))?
        .to_string();

    match stream_parts(&client, &bucket, &key, &upload_id, &mut reader).await {
        Ok(parts) => {
            let completed = CompletedMultipartUpload::builder()
                .set_parts(Some(parts))
                .build();

            client
                .complete_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .upload_id(&upload_id)
                .multipart_upload(completed)
                .send()
                .await
                .map_err(|e| StorageError::upload_failed(e.to_string()))?;

            debug!("Completed streaming upload to {}/{}", bucket, key);
            Ok(())
        }
        Err(e) => {
            client
                .abort_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .upload_id(&upload_id)
                .send()
                .await
                .ok();
            Err(e)
        }
    }
}

async fn stream_parts(
    client: &Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
    reader: &mut (impl AsyncRead + Unpin),
) -> StorageResult<Vec<CompletedPart>> {
    let mut parts = Vec::new();
    let mut part_number: i32 = 1;
    let mut buffer: Vec<u8> = Vec::with_capacity(MIN_PART_SIZE);
    let mut chunk = vec![0u8; PIPE_CAPACITY];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);

        if buffer.len() >= MIN_PART_SIZE {
            let body = Bytes::from(std::mem::take(&mut buffer));
            parts.push(upload_part(client, bucket, key, upload_id, part_number, body).await?);
            part_number += 1;
        }
    }

    // The last part may be any size; an upload needs at least one part.
    if !buffer.is_empty() || parts.is_empty() {
        let body = Bytes::from(buffer);
        parts.push(upload_part(client, bucket, key, upload_id, part_number, body).await?);
    }

    Ok(parts)
}

async fn upload_part(
    client: &Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part_number: i32,
    body: Bytes,
) -> StorageResult<CompletedPart> {
    let result = client
        .upload_part()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .part_number(part_number)
        .body(ByteStream::from(body))
        .send()
        .await
        .map_err(|e| StorageError::upload_failed(e.to_string()))?;

    Ok(CompletedPart::builder()
        .set_e_tag(result.e_tag().map(str::to_string))
        .part_number(part_number)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_path() {
        assert_eq!(parse_object_path("videos/abc").unwrap(), ("videos", "abc"));
    }

    #[test]
    fn test_parse_object_path_nested_key() {
        let (bucket, key) = parse_object_path("videos/p-1/master.m3u8").unwrap();
        assert_eq!(bucket, "videos");
        assert_eq!(key, "p-1/master.m3u8");
    }

    #[test]
    fn test_parse_object_path_rejects_bare_bucket() {
        assert!(parse_object_path("videos").is_err());
        assert!(parse_object_path("videos/").is_err());
        assert!(parse_object_path("/key").is_err());
        assert!(parse_object_path("").is_err());
    }
}
