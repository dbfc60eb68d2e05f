//! Path parsing
//!
//! Remote paths have the form `s3://bucket/key`. Anything else is a
//! local filesystem path and is passed through as-is.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// URL scheme prefix selecting the remote store
pub const REMOTE_SCHEME: &str = "s3://";

/// A parsed remote path pointing to an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePath {
    /// Bucket name
    pub bucket: String,
    /// Object key, exactly as written after the bucket
    pub key: String,
}

impl RemotePath {
    /// Create a new RemotePath
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for RemotePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{REMOTE_SCHEME}{}/{}", self.bucket, self.key)
    }
}

/// Parsed path that can be either local or remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPath {
    /// Local filesystem path
    Local(PathBuf),
    /// Remote object
    Remote(RemotePath),
}

/// Parse a path string into a ParsedPath
pub fn parse_path(path: &str) -> Result<ParsedPath> {
    if path.is_empty() {
        return Err(Error::InvalidPath("Path cannot be empty".into()));
    }

    let Some(rest) = path.strip_prefix(REMOTE_SCHEME) else {
        return Ok(ParsedPath::Local(PathBuf::from(path)));
    };

    let (bucket, key) = rest.split_once('/').ok_or_else(|| {
        Error::InvalidPath(format!(
            "'{path}' is incomplete. Use format: {REMOTE_SCHEME}bucket/key"
        ))
    })?;

    if bucket.is_empty() {
        return Err(Error::InvalidPath("Bucket name cannot be empty".into()));
    }

    if key.is_empty() || key.ends_with('/') {
        return Err(Error::InvalidPath(format!(
            "'{path}' does not name an object"
        )));
    }

    Ok(ParsedPath::Remote(RemotePath::new(bucket, key)))
}
