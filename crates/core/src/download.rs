//! Remote range reader and download path
//!
//! A download never materializes the object: the size comes from one
//! metadata query, the IV from a dedicated `bytes=0-15` read, and the
//! ciphertext from one ranged read per chunk starting at offset 16.

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::cipher::{CipherKey, KeystreamCipher};
use crate::error::{Error, Result};
use crate::iv::{IV_LEN, Iv, payload_len};
use crate::path::RemotePath;
use crate::pipeline::{ChunkBuffers, ChunkSource, NoProgress, Pipeline, Progress, WriterSink};
use crate::traits::ObjectStore;

/// A remote object whose size has been fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub path: RemotePath,
    pub size: u64,
}

/// Query the object size (one metadata round trip)
pub async fn head_size<S>(store: &S, path: &RemotePath) -> Result<RemoteObject>
where
    S: ObjectStore + ?Sized,
{
    let info = store.head_object(path).await?;
    Ok(RemoteObject {
        path: path.clone(),
        size: info.size_bytes,
    })
}

/// Fill `buf` from the object starting at `offset`, or fail
///
/// The range request covers exactly `buf.len()` bytes; a shorter
/// response is a [`Error::ShortRead`].
pub async fn read_range_exact<S>(
    store: &S,
    path: &RemotePath,
    offset: u64,
    buf: &mut [u8],
) -> Result<()>
where
    S: ObjectStore + ?Sized,
{
    if buf.is_empty() {
        return Ok(());
    }

    let end = offset
        .checked_add(buf.len() as u64 - 1)
        .ok_or_else(|| Error::Internal(format!("range at offset {offset} overflows")))?;

    let data = store.get_range(path, offset, end).await?;

    if data.len() < buf.len() {
        return Err(Error::ShortRead {
            expected: buf.len(),
            actual: data.len(),
        });
    }
    if data.len() > buf.len() {
        return Err(Error::RemoteQuery(format!(
            "range bytes={offset}-{end} of {path} returned {} bytes, expected {}",
            data.len(),
            buf.len()
        )));
    }

    buf.copy_from_slice(&data);
    Ok(())
}

/// [`ChunkSource`] issuing one range read per chunk
pub struct RangeSource<'a, S: ?Sized> {
    store: &'a S,
    path: &'a RemotePath,
    offset: u64,
}

impl<'a, S: ?Sized> RangeSource<'a, S> {
    /// Read sequentially from `offset`
    pub fn new(store: &'a S, path: &'a RemotePath, offset: u64) -> Self {
        Self {
            store,
            path,
            offset,
        }
    }

    /// Offset of the next byte to read
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[async_trait]
impl<S> ChunkSource for RangeSource<'_, S>
where
    S: ObjectStore + ?Sized,
{
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<()> {
        read_range_exact(self.store, self.path, self.offset, buf).await?;
        self.offset += buf.len() as u64;
        Ok(())
    }
}

/// Remote artifact with its IV already read
#[derive(Debug, Clone)]
pub struct RemoteArtifact {
    pub object: RemoteObject,
    pub iv: Iv,
}

/// Result of a finished download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Size of the remote artifact
    pub artifact_bytes: u64,
    /// Plaintext bytes written locally
    pub plaintext_bytes: u64,
    /// Ranged reads issued for the ciphertext
    pub chunks: u64,
}

/// Downloads and decrypts artifacts from an object store
pub struct Downloader<'a, S: ?Sized> {
    store: &'a S,
    progress: &'a dyn Progress,
}

impl<'a, S> Downloader<'a, S>
where
    S: ObjectStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Fetch the size and the IV of the artifact at `source`
    ///
    /// Objects shorter than the IV are rejected after the metadata query,
    /// before any range is read.
    pub async fn open(&self, source: &RemotePath) -> Result<RemoteArtifact> {
        let object = head_size(self.store, source).await?;
        payload_len(object.size)?;

        let mut iv_bytes = [0u8; IV_LEN];
        read_range_exact(self.store, source, 0, &mut iv_bytes).await?;

        Ok(RemoteArtifact {
            object,
            iv: Iv::from_bytes(iv_bytes),
        })
    }

    /// Decrypt an opened artifact into `writer`
    pub async fn decrypt_into<W>(
        &self,
        artifact: &RemoteArtifact,
        writer: W,
        key: &CipherKey,
        buffers: &mut ChunkBuffers,
    ) -> Result<DownloadOutcome>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let object = &artifact.object;
        let remaining = payload_len(object.size)?;
        tracing::info!(
            source = %object.path,
            size = object.size,
            "Downloading encrypted object"
        );

        let mut cipher = KeystreamCipher::new(key, &artifact.iv);
        let mut range_source = RangeSource::new(self.store, &object.path, IV_LEN as u64);
        let mut sink = WriterSink::new(writer);

        let stats = Pipeline::new(buffers)
            .with_progress(self.progress)
            .run(&mut range_source, &mut sink, &mut cipher, remaining, None)
            .await?;

        if range_source.offset() != object.size {
            return Err(Error::Internal(format!(
                "download stopped at offset {} of {}",
                range_source.offset(),
                object.size
            )));
        }

        Ok(DownloadOutcome {
            artifact_bytes: object.size,
            plaintext_bytes: stats.bytes_written,
            chunks: stats.chunks,
        })
    }

    /// Decrypt the artifact at `source` into `writer`
    pub async fn download<W>(
        &self,
        source: &RemotePath,
        writer: W,
        key: &CipherKey,
        buffers: &mut ChunkBuffers,
    ) -> Result<DownloadOutcome>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let artifact = self.open(source).await?;
        self.decrypt_into(&artifact, writer, key, buffers).await
    }
}
