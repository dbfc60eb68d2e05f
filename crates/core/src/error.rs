//! Error types for sc-core
//!
//! Provides a unified error type for configuration, local I/O, remote
//! store access and the transfer engine. Every error is fatal for the
//! current transfer; the CLI turns it into a non-zero exit status.

use thiserror::Error;

/// Result type alias for sc-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for sc-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error: bad key, missing credentials, bad chunk size
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid path format
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A source returned fewer bytes than requested
    #[error("Incomplete read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// A sink accepted fewer bytes than requested
    #[error("Incomplete write: expected {expected} bytes, wrote {actual}")]
    ShortWrite { expected: usize, actual: usize },

    /// Keystream position would leave the 64-bit byte counter space
    #[error("Keystream alignment error: {0}")]
    Alignment(String),

    /// Remote object or bucket does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store refused access to the object
    #[error("Access denied: {0}")]
    Access(String),

    /// Metadata, range-read, put or multipart control call failed
    #[error("Remote query failed: {0}")]
    RemoteQuery(String),

    /// Object is shorter than the embedded IV
    #[error("Object is too small for an encrypted file: {size} bytes (minimum {minimum})")]
    TooSmallObject { size: u64, minimum: u64 },

    /// A multipart part kept failing after every allowed attempt
    #[error("Upload of part #{part_number} failed after {attempts} attempts: {message}")]
    PartUpload {
        part_number: i32,
        attempts: u32,
        message: String,
    },

    /// Aborting a failed multipart upload failed as well
    #[error("Abort of multipart upload {upload_id} failed: {message} (after: {original})")]
    Abort {
        upload_id: String,
        message: String,
        original: Box<Error>,
    },

    /// Programming invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the exit code for this error
    ///
    /// Every failure exits with 1; 0 is reserved for success.
    pub const fn exit_code(&self) -> i32 {
        1
    }

    /// The upload failure that caused an abort, or `self` otherwise
    pub fn root(&self) -> &Error {
        match self {
            Error::Abort { original, .. } => original.root(),
            other => other,
        }
    }
}
