//! Transfer command - encrypt, decrypt, upload or download one file

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use serde::Serialize;

use sc_core::config::DEFAULT_CONFIG_FILE;
use sc_core::multipart::UploadPath;
use sc_core::{ConfigManager, CryptoMode, ObjectStore, Operation, TransferReport, TransferSession};
use sc_s3::S3Client;

use crate::output::{OutputConfig, ProgressBar};

/// Default chunk size in KiB: 5 MiB, the smallest part S3 accepts
pub const DEFAULT_CHUNK_KIB: u64 = 5 * 1024;

/// Largest chunk size in KiB: 5 GiB, the largest part S3 accepts
pub const MAX_CHUNK_KIB: u64 = 5 * 1024 * 1024;

/// Transfer arguments
#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Source path (local path or s3://bucket/key)
    pub source: String,

    /// Destination path (local path or s3://bucket/key)
    pub dest: String,

    /// Configuration file (JSON, or TOML with a .toml extension)
    #[arg(short, long, env = "S3CRYPT_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Encrypt a local file into a local artifact
    #[arg(short, long, conflicts_with = "decrypt")]
    pub encrypt: bool,

    /// Decrypt a local artifact into a local file
    #[arg(short, long)]
    pub decrypt: bool,

    /// Chunk size in KiB; also the multipart part size
    #[arg(
        long,
        default_value_t = DEFAULT_CHUNK_KIB,
        value_parser = clap::value_parser!(u64).range(1..=MAX_CHUNK_KIB)
    )]
    pub chunk: u64,
}

impl TransferArgs {
    fn mode(&self) -> Option<CryptoMode> {
        match (self.encrypt, self.decrypt) {
            (true, _) => Some(CryptoMode::Encrypt),
            (_, true) => Some(CryptoMode::Decrypt),
            _ => None,
        }
    }

    fn chunk_bytes(&self) -> anyhow::Result<usize> {
        self.chunk
            .checked_mul(1024)
            .and_then(|bytes| usize::try_from(bytes).ok())
            .with_context(|| format!("Chunk size of {} KiB is too large", self.chunk))
    }
}

/// Summary printed after a successful transfer
#[derive(Debug, Serialize)]
pub struct TransferSummary {
    status: &'static str,
    operation: &'static str,
    source: String,
    dest: String,
    bytes_read: u64,
    bytes_written: u64,
    size_human: String,
    chunks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    parts: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    multipart: Option<bool>,
}

impl TransferSummary {
    fn new(operation: &Operation, report: &TransferReport) -> Self {
        let (source, dest) = match operation {
            Operation::EncryptLocal { source, dest } | Operation::DecryptLocal { source, dest } => {
                (source.display().to_string(), dest.display().to_string())
            }
            Operation::Upload { source, dest } => (source.display().to_string(), dest.to_string()),
            Operation::Download { source, dest } => {
                (source.to_string(), dest.display().to_string())
            }
        };

        Self {
            status: "success",
            operation: operation.verb(),
            source,
            dest,
            bytes_read: report.bytes_read,
            bytes_written: report.bytes_written,
            size_human: humansize::format_size(report.bytes_written, humansize::BINARY),
            chunks: report.chunks,
            parts: report.parts,
            multipart: report.upload_path.map(|p| p == UploadPath::Multipart),
        }
    }
}

impl std::fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {} ({})",
            self.operation, self.source, self.dest, self.size_human
        )?;
        match (self.multipart, self.parts) {
            (Some(true), Some(parts)) => write!(f, " in {parts} parts"),
            _ => Ok(()),
        }
    }
}

/// Run one transfer
pub async fn execute(
    args: &TransferArgs,
    output_config: OutputConfig,
) -> anyhow::Result<TransferSummary> {
    let operation =
        Operation::plan(&args.source, &args.dest, args.mode()).context("Invalid arguments")?;
    let chunk_size = args.chunk_bytes()?;

    let manager = ConfigManager::with_path(&args.config);
    let config = manager.load().with_context(|| {
        format!(
            "Failed to load configuration {}",
            manager.config_path().display()
        )
    })?;

    let session = TransferSession::new(operation, &config, chunk_size)
        .context("Invalid transfer settings")?;

    let client = if session.operation().needs_store() {
        Some(
            S3Client::new(&config)
                .await
                .context("Failed to create S3 client")?,
        )
    } else {
        None
    };
    let store = client.as_ref().map(|c| c as &dyn ObjectStore);

    tracing::debug!(
        operation = %session.operation(),
        chunk_size = session.chunk_size(),
        "Starting transfer"
    );

    let progress = ProgressBar::new(output_config, 0);
    let result = session.run(store, &progress).await;
    progress.finish_and_clear();

    let report = result.with_context(|| format!("Transfer {} failed", session.operation()))?;
    tracing::info!(
        operation = %session.operation(),
        bytes_read = report.bytes_read,
        bytes_written = report.bytes_written,
        chunks = report.chunks,
        "Transfer finished"
    );

    Ok(TransferSummary::new(session.operation(), &report))
}
