//! S3-compatible object store adapter.
//!
//! This crate provides:
//! - Presigned GET URL generation
//! - Streaming uploads through an in-memory pipe (no whole-file buffering)
//! - Bucket auto-creation on first use
//! - Recursive directory publishing split into a pure walk and an
//!   uploading consumer

pub mod client;
pub mod error;
pub mod publish;

pub use client::{parse_object_path, ObjectWriter, StorageClient, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use publish::{plan_tree, UploadEntry};
