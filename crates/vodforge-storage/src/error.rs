//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Invalid object path (expected bucket/key): {0}")]
    InvalidPath(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("Bucket operation failed: {0}")]
    BucketFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn bucket_failed(msg: impl Into<String>) -> Self {
        Self::BucketFailed(msg.into())
    }
}
