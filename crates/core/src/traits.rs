//! ObjectStore trait definition
//!
//! The transfer engine only needs a handful of object store calls: a
//! size query, ranged reads, a one-shot put and the four multipart
//! calls. Keeping them behind this trait keeps the engine independent of
//! the AWS SDK and lets tests substitute an in-memory or mock store.

use async_trait::async_trait;

use crate::error::Result;
use crate::path::RemotePath;

/// Content type used for every uploaded artifact
pub const ARTIFACT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata for an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,

    /// Size in bytes
    pub size_bytes: u64,

    /// Human-readable size
    pub size_human: String,

    /// ETag, without quotes
    pub etag: Option<String>,
}

impl ObjectInfo {
    /// Create a new ObjectInfo for an object
    pub fn file(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size_bytes: size,
            size_human: humansize::format_size(size, humansize::BINARY),
            etag: None,
        }
    }
}

/// Record of one uploaded part, as required by the completion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Trait for the object store operations used by transfers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get object metadata (one round trip)
    async fn head_object(&self, path: &RemotePath) -> Result<ObjectInfo>;

    /// Read the inclusive byte range `start..=end`
    async fn get_range(&self, path: &RemotePath, start: u64, end: u64) -> Result<Vec<u8>>;

    /// Store a whole object in one request
    async fn put_object(&self, path: &RemotePath, data: &[u8]) -> Result<ObjectInfo>;

    /// Start a multipart upload, returning its upload ID
    async fn create_multipart_upload(&self, path: &RemotePath) -> Result<String>;

    /// Upload one part, returning the ETag the store assigned to it
    async fn upload_part(
        &self,
        path: &RemotePath,
        upload_id: &str,
        part_number: i32,
        data: &[u8],
    ) -> Result<String>;

    /// Assemble the object from the parts listed in ascending order
    async fn complete_multipart_upload(
        &self,
        path: &RemotePath,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<ObjectInfo>;

    /// Discard a multipart upload and its uploaded parts
    async fn abort_multipart_upload(&self, path: &RemotePath, upload_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_info_file() {
        let info = ObjectInfo::file("test.bin", 2048);
        assert_eq!(info.key, "test.bin");
        assert_eq!(info.size_bytes, 2048);
        assert_eq!(info.size_human, "2 KiB");
        assert!(info.etag.is_none());
    }
}
