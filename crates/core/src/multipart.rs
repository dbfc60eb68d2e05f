//! Multipart upload session state
//!
//! Tracks one multipart upload from initiation to its terminal state and
//! keeps the completed-part records in the order the store needs them.

use crate::error::{Error, Result};
use crate::iv::artifact_len;
use crate::path::RemotePath;
use crate::traits::CompletedPart;

/// Minimum part size accepted by S3 for every part but the last: 5 MiB
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum number of parts: 10,000 (S3 limit)
pub const MAX_PARTS: u64 = 10_000;

/// How an artifact is written to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPath {
    /// One put request carrying `IV || ciphertext`
    SingleShot,
    /// Initiate, numbered parts, complete
    Multipart,
}

impl UploadPath {
    /// Pick the upload path for a plaintext of `plaintext_len` bytes
    ///
    /// The artifact (plaintext plus IV) must fit in one chunk for a
    /// single put.
    pub fn choose(plaintext_len: u64, chunk_size: usize) -> Result<Self> {
        if artifact_len(plaintext_len)? <= chunk_size as u64 {
            Ok(UploadPath::SingleShot)
        } else {
            Ok(UploadPath::Multipart)
        }
    }
}

/// Lifecycle of a multipart upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    NotStarted,
    InProgress,
    Completed,
    Aborted,
}

/// A multipart upload and the parts uploaded so far
#[derive(Debug, Clone)]
pub struct MultipartSession {
    upload_id: Option<String>,
    target: RemotePath,
    completed_parts: Vec<CompletedPart>,
    state: UploadState,
}

impl MultipartSession {
    /// Session for `target` before the store has been asked for an upload
    pub fn new(target: RemotePath) -> Self {
        Self {
            upload_id: None,
            target,
            completed_parts: Vec::new(),
            state: UploadState::NotStarted,
        }
    }

    /// Record the upload ID issued by the store
    pub fn start(&mut self, upload_id: impl Into<String>) -> Result<()> {
        if self.state != UploadState::NotStarted {
            return Err(Error::Internal(format!(
                "multipart upload to {} already in state {:?}",
                self.target, self.state
            )));
        }
        self.upload_id = Some(upload_id.into());
        self.state = UploadState::InProgress;
        Ok(())
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub fn target(&self) -> &RemotePath {
        &self.target
    }

    /// Completed parts in ascending part-number order
    pub fn completed_parts(&self) -> &[CompletedPart] {
        &self.completed_parts
    }

    /// Part number the next chunk is uploaded as
    pub fn next_part_number(&self) -> i32 {
        self.completed_parts
            .last()
            .map(|p| p.part_number + 1)
            .unwrap_or(1)
    }

    /// Append the record for a successfully uploaded part
    ///
    /// Only the next part number is accepted, so a recorded part is never
    /// re-appended and the list stays sorted.
    pub fn add_completed_part(&mut self, part_number: i32, etag: String) -> Result<()> {
        if self.state != UploadState::InProgress {
            return Err(Error::Internal(format!(
                "cannot record part #{part_number} for {} in state {:?}",
                self.target, self.state
            )));
        }

        let expected = self.next_part_number();
        if part_number != expected {
            return Err(Error::Internal(format!(
                "part #{part_number} recorded out of order, expected #{expected}"
            )));
        }

        self.completed_parts.push(CompletedPart { part_number, etag });
        Ok(())
    }

    pub fn mark_completed(&mut self) {
        self.state = UploadState::Completed;
    }

    pub fn mark_aborted(&mut self) {
        self.state = UploadState::Aborted;
    }
}

/// Calculate number of parts for an artifact
pub fn calculate_parts(artifact_size: u64, part_size: u64) -> u64 {
    artifact_size.div_ceil(part_size)
}

/// Reject multipart uploads the store would refuse before initiating one
pub fn check_part_count(plaintext_len: u64, chunk_size: usize) -> Result<u64> {
    let parts = calculate_parts(artifact_len(plaintext_len)?, chunk_size as u64);
    if parts > MAX_PARTS {
        return Err(Error::Config(format!(
            "Upload needs {parts} parts of {chunk_size} bytes, more than the {MAX_PARTS} allowed. Increase the chunk size."
        )));
    }
    Ok(parts)
}
