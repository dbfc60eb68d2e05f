//! sc-core: Core library for the s3crypt transfer tool
//!
//! This crate provides the streaming encryption engine, including:
//! - Configuration loading and key validation
//! - Path parsing and direction dispatch
//! - The AES-128-CTR keystream adapter and IV embedding protocol
//! - The chunked transfer pipeline
//! - Remote range reads and the multipart upload coordinator
//! - ObjectStore trait for S3 operations
//!
//! This crate is independent of any specific S3 SDK; `sc-s3` provides
//! the AWS implementation of [`ObjectStore`].

pub mod cipher;
pub mod config;
pub mod download;
pub mod error;
pub mod iv;
pub mod local;
pub mod multipart;
pub mod path;
pub mod pipeline;
pub mod session;
pub mod traits;
pub mod upload;

#[cfg(test)]
mod testing;

pub use cipher::{CipherKey, KeystreamCipher};
pub use config::{Config, ConfigManager, RetryConfig};
pub use error::{Error, Result};
pub use iv::{IV_LEN, Iv};
pub use path::{ParsedPath, RemotePath, parse_path};
pub use pipeline::{ChunkBuffers, NoProgress, Progress};
pub use session::{CryptoMode, Operation, TransferReport, TransferSession};
pub use traits::{CompletedPart, ObjectInfo, ObjectStore};
