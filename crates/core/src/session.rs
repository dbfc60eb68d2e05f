//! Transfer session and direction dispatch
//!
//! The direction of a transfer is decided by which side carries the
//! `s3://` prefix: remote source means download and decrypt, remote
//! destination means encrypt and upload. Local to local needs an explicit
//! mode.

use std::fmt;
use std::path::PathBuf;

use tokio::io::BufWriter;

use crate::cipher::CipherKey;
use crate::config::{Config, RetryConfig};
use crate::download::Downloader;
use crate::error::{Error, Result};
use crate::iv::{IV_LEN, Iv, artifact_len};
use crate::local::{create_dest, decrypt_file, encrypt_file, open_source};
use crate::multipart::UploadPath;
use crate::path::{ParsedPath, RemotePath, parse_path};
use crate::pipeline::{ChunkBuffers, Progress};
use crate::traits::ObjectStore;
use crate::upload::Uploader;

/// Direction for a local to local transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoMode {
    Encrypt,
    Decrypt,
}

/// What one invocation does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    EncryptLocal { source: PathBuf, dest: PathBuf },
    DecryptLocal { source: PathBuf, dest: PathBuf },
    Upload { source: PathBuf, dest: RemotePath },
    Download { source: RemotePath, dest: PathBuf },
}

impl Operation {
    /// Decide the operation from the two path arguments
    pub fn plan(source: &str, dest: &str, mode: Option<CryptoMode>) -> Result<Self> {
        let source = parse_path(source)?;
        let dest = parse_path(dest)?;

        match (source, dest) {
            (ParsedPath::Remote(_), ParsedPath::Remote(_)) => Err(Error::InvalidPath(
                "Source and destination cannot both be remote".into(),
            )),
            (ParsedPath::Remote(source), ParsedPath::Local(dest)) => {
                reject_mode(mode)?;
                Ok(Operation::Download { source, dest })
            }
            (ParsedPath::Local(source), ParsedPath::Remote(dest)) => {
                reject_mode(mode)?;
                Ok(Operation::Upload { source, dest })
            }
            (ParsedPath::Local(source), ParsedPath::Local(dest)) => match mode {
                Some(CryptoMode::Encrypt) => Ok(Operation::EncryptLocal { source, dest }),
                Some(CryptoMode::Decrypt) => Ok(Operation::DecryptLocal { source, dest }),
                None => Err(Error::InvalidPath(
                    "Local to local transfers need --encrypt or --decrypt".into(),
                )),
            },
        }
    }

    /// Whether an object store client has to be built
    pub fn needs_store(&self) -> bool {
        matches!(self, Operation::Upload { .. } | Operation::Download { .. })
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Operation::EncryptLocal { .. } => "Encrypted",
            Operation::DecryptLocal { .. } => "Decrypted",
            Operation::Upload { .. } => "Uploaded",
            Operation::Download { .. } => "Downloaded",
        }
    }
}

fn reject_mode(mode: Option<CryptoMode>) -> Result<()> {
    match mode {
        Some(_) => Err(Error::InvalidPath(
            "--encrypt/--decrypt only apply when both paths are local".into(),
        )),
        None => Ok(()),
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::EncryptLocal { source, dest } | Operation::DecryptLocal { source, dest } => {
                write!(f, "{} -> {}", source.display(), dest.display())
            }
            Operation::Upload { source, dest } => write!(f, "{} -> {dest}", source.display()),
            Operation::Download { source, dest } => write!(f, "{source} -> {}", dest.display()),
        }
    }
}

/// Summary of a finished transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub chunks: u64,
    /// Set for uploads
    pub upload_path: Option<UploadPath>,
    /// Parts written by an upload
    pub parts: Option<u64>,
}

/// One validated transfer, immutable once built
#[derive(Debug)]
pub struct TransferSession {
    operation: Operation,
    key: CipherKey,
    chunk_size: usize,
    retry: RetryConfig,
}

impl TransferSession {
    /// Validate `config` and `chunk_size` for `operation`
    pub fn new(operation: Operation, config: &Config, chunk_size: usize) -> Result<Self> {
        let key = config.cipher_key()?;
        if chunk_size == 0 {
            return Err(Error::Config("Chunk size must be greater than zero".into()));
        }
        if operation.needs_store() {
            config.validate_remote()?;
        }
        if matches!(operation, Operation::Upload { .. }) && chunk_size < IV_LEN {
            return Err(Error::Config(format!(
                "Uploads need a chunk size of at least {IV_LEN} bytes"
            )));
        }

        Ok(Self {
            operation,
            key,
            chunk_size,
            retry: config.retry.clone(),
        })
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Run the transfer
    ///
    /// `store` must be set for uploads and downloads.
    pub async fn run(
        &self,
        store: Option<&dyn ObjectStore>,
        progress: &dyn Progress,
    ) -> Result<TransferReport> {
        match &self.operation {
            Operation::EncryptLocal { source, dest } => {
                let (_, len) = open_source(source).await?;
                let mut buffers = ChunkBuffers::for_artifact(self.chunk_size, artifact_len(len)?)?;
                let stats = encrypt_file(source, dest, &self.key, &mut buffers, progress).await?;
                Ok(TransferReport {
                    bytes_read: stats.bytes_read,
                    bytes_written: stats.bytes_written,
                    chunks: stats.chunks,
                    upload_path: None,
                    parts: None,
                })
            }
            Operation::DecryptLocal { source, dest } => {
                let (_, len) = open_source(source).await?;
                let mut buffers = ChunkBuffers::for_artifact(self.chunk_size, len)?;
                let stats = decrypt_file(source, dest, &self.key, &mut buffers, progress).await?;
                Ok(TransferReport {
                    bytes_read: stats.bytes_read,
                    bytes_written: stats.bytes_written,
                    chunks: stats.chunks,
                    upload_path: None,
                    parts: None,
                })
            }
            Operation::Upload { source, dest } => {
                let store = require_store(store)?;
                let (file, len) = open_source(source).await?;

                let mut buffers = ChunkBuffers::for_artifact(self.chunk_size, artifact_len(len)?)?;
                let iv = Iv::random();
                let outcome = Uploader::new(store, self.retry.clone())
                    .with_progress(progress)
                    .upload(file, len, dest, &self.key, &iv, &mut buffers)
                    .await?;

                Ok(TransferReport {
                    bytes_read: len,
                    bytes_written: artifact_len(len)?,
                    chunks: outcome.parts,
                    upload_path: Some(outcome.path),
                    parts: Some(outcome.parts),
                })
            }
            Operation::Download { source, dest } => {
                let store = require_store(store)?;
                let downloader = Downloader::new(store).with_progress(progress);

                let artifact = downloader.open(source).await?;
                let mut buffers = ChunkBuffers::for_artifact(self.chunk_size, artifact.object.size)?;
                let file = create_dest(dest).await?;
                let outcome = downloader
                    .decrypt_into(&artifact, BufWriter::new(file), &self.key, &mut buffers)
                    .await?;

                Ok(TransferReport {
                    bytes_read: outcome.artifact_bytes,
                    bytes_written: outcome.plaintext_bytes,
                    chunks: outcome.chunks,
                    upload_path: None,
                    parts: None,
                })
            }
        }
    }
}

fn require_store(store: Option<&dyn ObjectStore>) -> Result<&dyn ObjectStore> {
    store.ok_or_else(|| Error::Internal("remote transfer started without a store".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::NoProgress;
    use crate::testing::{Call, MemoryStore};
    use tempfile::TempDir;

    const KEY: &str = "00112233445566778899aabbccddeeff";

    fn remote_config() -> Config {
        let mut config = Config::with_key(KEY);
        config.access_key = "AKIDEXAMPLE".into();
        config.secret_key = "secret".into();
        config.retry = RetryConfig::immediate(3);
        config
    }

    #[test]
    fn test_plan_directions() {
        assert_eq!(
            Operation::plan("s3://bucket/a.enc", "a.txt", None).unwrap(),
            Operation::Download {
                source: RemotePath::new("bucket", "a.enc"),
                dest: PathBuf::from("a.txt"),
            }
        );
        assert_eq!(
            Operation::plan("a.txt", "s3://bucket/dir/a.enc", None).unwrap(),
            Operation::Upload {
                source: PathBuf::from("a.txt"),
                dest: RemotePath::new("bucket", "dir/a.enc"),
            }
        );
        assert!(matches!(
            Operation::plan("a.txt", "a.enc", Some(CryptoMode::Encrypt)).unwrap(),
            Operation::EncryptLocal { .. }
        ));
        assert!(matches!(
            Operation::plan("a.enc", "a.txt", Some(CryptoMode::Decrypt)).unwrap(),
            Operation::DecryptLocal { .. }
        ));
    }

    #[test]
    fn test_plan_rejections() {
        assert!(Operation::plan("s3://a/x", "s3://b/y", None).is_err());
        assert!(Operation::plan("a.txt", "b.txt", None).is_err());
        assert!(Operation::plan("a.txt", "s3://b/y", Some(CryptoMode::Encrypt)).is_err());
        assert!(Operation::plan("s3://b/y", "a.txt", Some(CryptoMode::Decrypt)).is_err());
        assert!(Operation::plan("a.txt", "s3://bucket", None).is_err());
    }

    #[test]
    fn test_session_validation() {
        let local = Operation::plan("a", "b", Some(CryptoMode::Encrypt)).unwrap();
        let upload = Operation::plan("a", "s3://bucket/b", None).unwrap();

        assert!(TransferSession::new(local.clone(), &Config::with_key(KEY), 1).is_ok());
        assert!(TransferSession::new(local.clone(), &Config::with_key(KEY), 0).is_err());
        assert!(TransferSession::new(local, &Config::with_key("00"), 16).is_err());

        // Remote transfers need credentials and room for the IV
        assert!(TransferSession::new(upload.clone(), &Config::with_key(KEY), 64).is_err());
        assert!(TransferSession::new(upload.clone(), &remote_config(), 15).is_err());
        assert!(TransferSession::new(upload, &remote_config(), 16).is_ok());
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("report.csv");
        let restored = dir.path().join("restored.csv");
        let data: Vec<u8> = (0..500u32).map(|i| (i % 97) as u8).collect();
        tokio::fs::write(&plain, &data).await.unwrap();

        let store = MemoryStore::new();
        let remote = "s3://bucket/reports/report.csv.enc";

        let upload = Operation::plan(plain.to_str().unwrap(), remote, None).unwrap();
        let report = TransferSession::new(upload, &remote_config(), 128)
            .unwrap()
            .run(Some(&store), &NoProgress)
            .await
            .unwrap();
        assert_eq!(report.upload_path, Some(UploadPath::Multipart));
        assert_eq!(report.parts, Some(5));
        assert_eq!(report.bytes_written, 516);

        let download = Operation::plan(remote, restored.to_str().unwrap(), None).unwrap();
        let report = TransferSession::new(download, &remote_config(), 100)
            .unwrap()
            .run(Some(&store), &NoProgress)
            .await
            .unwrap();
        assert_eq!(report.bytes_written, 500);
        assert_eq!(tokio::fs::read(&restored).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_huge_chunk_with_small_file() {
        // Buffers follow the file length, not the requested chunk size
        let huge = usize::MAX;
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("abc.txt");
        let enc = dir.path().join("abc.enc");
        let back = dir.path().join("abc.out");
        tokio::fs::write(&plain, b"abc").await.unwrap();

        let config = Config::with_key(KEY);
        let encrypt = Operation::plan(
            plain.to_str().unwrap(),
            enc.to_str().unwrap(),
            Some(CryptoMode::Encrypt),
        )
        .unwrap();
        let report = TransferSession::new(encrypt, &config, huge)
            .unwrap()
            .run(None, &NoProgress)
            .await
            .unwrap();
        assert_eq!(report.bytes_written, 19);

        let decrypt = Operation::plan(
            enc.to_str().unwrap(),
            back.to_str().unwrap(),
            Some(CryptoMode::Decrypt),
        )
        .unwrap();
        TransferSession::new(decrypt, &config, huge)
            .unwrap()
            .run(None, &NoProgress)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&back).await.unwrap(), b"abc");

        let store = MemoryStore::new();
        let upload = Operation::plan(plain.to_str().unwrap(), "s3://bucket/abc.enc", None).unwrap();
        let report = TransferSession::new(upload, &remote_config(), huge)
            .unwrap()
            .run(Some(&store), &NoProgress)
            .await
            .unwrap();
        assert_eq!(report.upload_path, Some(UploadPath::SingleShot));
        assert_eq!(store.calls(), vec![Call::Put(19)]);
    }

    #[tokio::test]
    async fn test_download_too_small_does_not_create_dest() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        let store = MemoryStore::new();
        store.insert(&RemotePath::new("bucket", "tiny"), vec![0u8; 15]);

        let op = Operation::plan("s3://bucket/tiny", dest.to_str().unwrap(), None).unwrap();
        let err = TransferSession::new(op, &remote_config(), 64)
            .unwrap()
            .run(Some(&store), &NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TooSmallObject { size: 15, .. }));
        assert_eq!(store.calls(), vec![Call::Head]);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_remote_run_without_store() {
        let op = Operation::plan("s3://bucket/key", "out", None).unwrap();
        let err = TransferSession::new(op, &remote_config(), 64)
            .unwrap()
            .run(None, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
