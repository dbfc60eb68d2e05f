//! Upload coordinator
//!
//! Encrypts a local stream into `IV || ciphertext` and writes it to the
//! store, either with a single put or as a multipart upload whose parts
//! are exactly the pipeline's output chunks. Every failure after a
//! multipart upload was initiated aborts it exactly once.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::cipher::{CipherKey, KeystreamCipher};
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::iv::{IV_LEN, Iv, artifact_len};
use crate::multipart::{MIN_PART_SIZE, MultipartSession, UploadPath, check_part_count};
use crate::path::RemotePath;
use crate::pipeline::{
    ChunkBuffers, ChunkSink, NoProgress, Pipeline, PipelineStats, Progress, ReaderSource,
};
use crate::traits::{ObjectInfo, ObjectStore};

/// Result of a finished upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub path: UploadPath,
    /// Parts sent, 1 for a single put
    pub parts: u64,
    pub upload_id: Option<String>,
    pub info: ObjectInfo,
}

/// Sink for an artifact that fits in one chunk
struct SinglePutSink<'a, S: ?Sized> {
    store: &'a S,
    target: &'a RemotePath,
    info: Option<ObjectInfo>,
}

#[async_trait]
impl<S> ChunkSink for SinglePutSink<'_, S>
where
    S: ObjectStore + ?Sized,
{
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        if self.info.is_some() {
            return Err(Error::Internal(format!(
                "second chunk for single put to {}",
                self.target
            )));
        }
        let info = self.store.put_object(self.target, data).await?;
        self.info = Some(info);
        Ok(())
    }
}

/// Sink turning every chunk into the next numbered part
struct PartSink<'a, S: ?Sized> {
    store: &'a S,
    retry: &'a RetryConfig,
    session: &'a mut MultipartSession,
}

impl<S> PartSink<'_, S>
where
    S: ObjectStore + ?Sized,
{
    async fn upload_with_retry(
        &self,
        upload_id: &str,
        part_number: i32,
        data: &[u8],
    ) -> Result<String> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self
                .store
                .upload_part(self.session.target(), upload_id, part_number, data)
                .await
            {
                Ok(etag) => return Ok(etag),
                Err(e) if attempt >= max_attempts => {
                    return Err(Error::PartUpload {
                        part_number,
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        part_number,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Part upload failed, retrying: {e}"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl<S> ChunkSink for PartSink<'_, S>
where
    S: ObjectStore + ?Sized,
{
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        let upload_id = self
            .session
            .upload_id()
            .ok_or_else(|| Error::Internal("part written before upload was initiated".into()))?
            .to_string();
        let part_number = self.session.next_part_number();

        let etag = self.upload_with_retry(&upload_id, part_number, data).await?;
        tracing::debug!(part_number, bytes = data.len(), "Uploaded part");

        self.session.add_completed_part(part_number, etag)
    }
}

/// Encrypts and uploads local streams to an object store
pub struct Uploader<'a, S: ?Sized> {
    store: &'a S,
    retry: RetryConfig,
    progress: &'a dyn Progress,
}

impl<'a, S> Uploader<'a, S>
where
    S: ObjectStore + ?Sized,
{
    pub fn new(store: &'a S, retry: RetryConfig) -> Self {
        Self {
            store,
            retry,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Upload `plaintext_len` bytes read from `reader` to `target`
    ///
    /// `iv` seeds the keystream and becomes the first 16 bytes of the
    /// object. Chunks must be at least 16 bytes so the first part can
    /// carry the IV.
    pub async fn upload<R>(
        &self,
        reader: R,
        plaintext_len: u64,
        target: &RemotePath,
        key: &CipherKey,
        iv: &Iv,
        buffers: &mut ChunkBuffers,
    ) -> Result<UploadOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        let chunk_size = buffers.chunk_size();
        if chunk_size < IV_LEN {
            return Err(Error::Config(format!(
                "Chunk size of {chunk_size} bytes cannot hold the {IV_LEN}-byte IV"
            )));
        }
        let path = UploadPath::choose(plaintext_len, chunk_size)?;
        tracing::info!(
            dest = %target,
            plaintext_len,
            artifact_len = artifact_len(plaintext_len)?,
            chunk_size,
            ?path,
            "Uploading encrypted object"
        );

        let mut source = ReaderSource::new(reader);
        let mut cipher = KeystreamCipher::new(key, iv);

        match path {
            UploadPath::SingleShot => {
                let mut sink = SinglePutSink {
                    store: self.store,
                    target,
                    info: None,
                };
                Pipeline::new(buffers)
                    .with_progress(self.progress)
                    .run(&mut source, &mut sink, &mut cipher, plaintext_len, Some(iv))
                    .await?;
                let info = sink
                    .info
                    .ok_or_else(|| Error::Internal("single put produced no object".into()))?;
                Ok(UploadOutcome {
                    path,
                    parts: 1,
                    upload_id: None,
                    info,
                })
            }
            UploadPath::Multipart => {
                self.upload_multipart(&mut source, plaintext_len, target, &mut cipher, iv, buffers)
                    .await
            }
        }
    }

    async fn upload_multipart<R>(
        &self,
        source: &mut ReaderSource<R>,
        plaintext_len: u64,
        target: &RemotePath,
        cipher: &mut KeystreamCipher,
        iv: &Iv,
        buffers: &mut ChunkBuffers,
    ) -> Result<UploadOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        let chunk_size = buffers.chunk_size();
        let parts = check_part_count(plaintext_len, chunk_size)?;
        if (chunk_size as u64) < MIN_PART_SIZE {
            tracing::warn!(
                chunk_size,
                minimum = MIN_PART_SIZE,
                "Chunk size is below the store's minimum part size; completion may be rejected"
            );
        }

        let mut session = MultipartSession::new(target.clone());
        let upload_id = self.store.create_multipart_upload(target).await?;
        session.start(upload_id.clone())?;
        tracing::debug!(upload_id = %upload_id, parts, "Initiated multipart upload");

        let result = self
            .send_parts(source, plaintext_len, cipher, iv, buffers, &mut session)
            .await;

        match result {
            Ok(info) => {
                session.mark_completed();
                Ok(UploadOutcome {
                    path: UploadPath::Multipart,
                    parts: session.completed_parts().len() as u64,
                    upload_id: Some(upload_id),
                    info,
                })
            }
            Err(original) => {
                tracing::error!(
                    upload_id = %upload_id,
                    dest = %target,
                    "Multipart upload failed, aborting: {original}"
                );
                let aborted = self.store.abort_multipart_upload(target, &upload_id).await;
                session.mark_aborted();
                match aborted {
                    Ok(()) => Err(original),
                    Err(e) => Err(Error::Abort {
                        upload_id,
                        message: e.to_string(),
                        original: Box::new(original),
                    }),
                }
            }
        }
    }

    /// Upload every part and complete; the caller aborts on error
    async fn send_parts<R>(
        &self,
        source: &mut ReaderSource<R>,
        plaintext_len: u64,
        cipher: &mut KeystreamCipher,
        iv: &Iv,
        buffers: &mut ChunkBuffers,
        session: &mut MultipartSession,
    ) -> Result<ObjectInfo>
    where
        R: AsyncRead + Unpin + Send,
    {
        let stats: PipelineStats = {
            let mut sink = PartSink {
                store: self.store,
                retry: &self.retry,
                session: &mut *session,
            };
            Pipeline::new(buffers)
                .with_progress(self.progress)
                .run(source, &mut sink, cipher, plaintext_len, Some(iv))
                .await?
        };

        let upload_id = session
            .upload_id()
            .ok_or_else(|| Error::Internal("multipart upload has no ID".into()))?;
        tracing::debug!(
            upload_id,
            parts = session.completed_parts().len(),
            bytes = stats.bytes_written,
            "Completing multipart upload"
        );

        self.store
            .complete_multipart_upload(session.target(), upload_id, session.completed_parts())
            .await
    }
}
