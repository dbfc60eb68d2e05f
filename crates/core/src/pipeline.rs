//! Chunked transfer pipeline
//!
//! Pulls at most one chunk from a source, runs it through the keystream
//! and pushes it to a sink, until the declared number of bytes has been
//! moved. Memory use is the two scratch buffers, whatever the file size.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::cipher::KeystreamCipher;
use crate::error::{Error, Result};
use crate::iv::{IV_LEN, Iv};

/// Source of exactly-sized chunks
#[async_trait]
pub trait ChunkSource: Send {
    /// Fill `buf` completely with the next bytes of the stream
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// Sink receiving transformed chunks in order
#[async_trait]
pub trait ChunkSink: Send {
    /// Write all of `data`
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()>;

    /// Called once after the last chunk
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Receives the number of plaintext bytes processed per chunk
pub trait Progress: Send + Sync {
    /// Total number of bytes the run will process
    fn start(&self, _total: u64) {}

    fn advance(&self, bytes: u64);
}

/// Progress sink that ignores updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn advance(&self, _bytes: u64) {}
}

/// Read until `buf` is full or fail with [`Error::ShortRead`]
pub async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(Error::ShortRead {
                expected: buf.len(),
                actual: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

/// [`ChunkSource`] over any async reader, such as a local file
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
}

impl<R> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R> ChunkSource for ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<()> {
        read_full(&mut self.inner, buf).await
    }
}

/// [`ChunkSink`] over any async writer
#[derive(Debug)]
pub struct WriterSink<W> {
    inner: W,
}

impl<W> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<W> ChunkSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let n = self.inner.write(&data[written..]).await?;
            if n == 0 {
                return Err(Error::ShortWrite {
                    expected: data.len(),
                    actual: written,
                });
            }
            written += n;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }
}

/// Plaintext and ciphertext scratch buffers, reused for every chunk
#[derive(Debug)]
pub struct ChunkBuffers {
    input: Vec<u8>,
    output: Vec<u8>,
}

impl ChunkBuffers {
    /// Allocate both buffers at `chunk_size` bytes
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("Chunk size must be greater than zero".into()));
        }
        Ok(Self {
            input: zeroed(chunk_size)?,
            output: zeroed(chunk_size)?,
        })
    }

    /// Allocate buffers for an artifact of `artifact_len` bytes
    ///
    /// No chunk is larger than the artifact, so the buffers are capped at
    /// its length (but never below the IV size).
    pub fn for_artifact(chunk_size: usize, artifact_len: u64) -> Result<Self> {
        let cap = usize::try_from(artifact_len.max(IV_LEN as u64)).unwrap_or(usize::MAX);
        Self::new(chunk_size.min(cap))
    }

    pub fn chunk_size(&self) -> usize {
        self.input.len()
    }
}

fn zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        Error::Config(format!("Cannot allocate a {len}-byte chunk buffer: {e}"))
    })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Counters reported by a finished pipeline run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Chunks written to the sink
    pub chunks: u64,
    /// Bytes pulled from the source
    pub bytes_read: u64,
    /// Bytes pushed to the sink, including an embedded IV
    pub bytes_written: u64,
}

/// Drives source → keystream → sink over borrowed scratch buffers
pub struct Pipeline<'a> {
    buffers: &'a mut ChunkBuffers,
    progress: &'a dyn Progress,
}

impl<'a> Pipeline<'a> {
    pub fn new(buffers: &'a mut ChunkBuffers) -> Self {
        Self {
            buffers,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Move `remaining` bytes from `source` to `sink` through `cipher`
    ///
    /// With `prefix` set, the IV is written verbatim at the start of the
    /// first output chunk and that chunk carries 16 fewer source bytes,
    /// so chunk boundaries on the sink side stay at `chunk_size`.
    /// Without it the caller has already dealt with the IV.
    pub async fn run<S, K>(
        &mut self,
        source: &mut S,
        sink: &mut K,
        cipher: &mut KeystreamCipher,
        remaining: u64,
        prefix: Option<&Iv>,
    ) -> Result<PipelineStats>
    where
        S: ChunkSource + ?Sized,
        K: ChunkSink + ?Sized,
    {
        let chunk_size = self.buffers.chunk_size();
        if prefix.is_some() && chunk_size < IV_LEN {
            return Err(Error::Config(format!(
                "Chunk size of {chunk_size} bytes cannot hold the {IV_LEN}-byte IV"
            )));
        }

        self.progress.start(remaining);

        let ChunkBuffers { input, output } = &mut *self.buffers;
        let mut stats = PipelineStats::default();
        let mut remaining = remaining;
        let mut pending_prefix = prefix;

        while remaining > 0 || pending_prefix.is_some() {
            let head = if pending_prefix.is_some() { IV_LEN } else { 0 };
            let take = remaining.min((chunk_size - head) as u64) as usize;
            let out_len = head + take;

            tracing::debug!(
                chunk = stats.chunks,
                remaining,
                bytes = out_len,
                "Processing chunk"
            );

            source.read_chunk(&mut input[..take]).await?;

            if let Some(iv) = pending_prefix.take() {
                output[..IV_LEN].copy_from_slice(iv.as_bytes());
            }
            cipher.apply(&input[..take], &mut output[head..out_len])?;

            sink.write_chunk(&output[..out_len]).await?;

            remaining = remaining.checked_sub(take as u64).ok_or_else(|| {
                Error::Internal(format!(
                    "chunk of {take} bytes exceeds the {remaining} bytes remaining"
                ))
            })?;

            self.progress.advance(take as u64);
            stats.chunks += 1;
            stats.bytes_read += take as u64;
            stats.bytes_written += out_len as u64;
        }

        sink.flush().await?;
        Ok(stats)
    }
}
