//! Local file encryption and decryption
//!
//! Both directions stream through the chunk pipeline. Encryption writes
//! the IV to the destination before the first ciphertext chunk, so any
//! positive chunk size works locally.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, BufWriter};

use crate::cipher::{CipherKey, KeystreamCipher};
use crate::error::{Error, Result};
use crate::iv::{IV_LEN, Iv, payload_len};
use crate::pipeline::{
    ChunkBuffers, ChunkSink, Pipeline, PipelineStats, Progress, ReaderSource, WriterSink, read_full,
};

/// Encrypt `plaintext_len` bytes from `reader` into `writer` as `IV || ciphertext`
pub async fn encrypt_stream<R, W>(
    reader: R,
    plaintext_len: u64,
    writer: W,
    key: &CipherKey,
    iv: &Iv,
    buffers: &mut ChunkBuffers,
    progress: &dyn Progress,
) -> Result<PipelineStats>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut source = ReaderSource::new(reader);
    let mut sink = WriterSink::new(writer);
    sink.write_chunk(iv.as_bytes()).await?;

    let mut cipher = KeystreamCipher::new(key, iv);
    let mut stats = Pipeline::new(buffers)
        .with_progress(progress)
        .run(&mut source, &mut sink, &mut cipher, plaintext_len, None)
        .await?;
    stats.bytes_written += IV_LEN as u64;
    Ok(stats)
}

/// Decrypt an artifact of `artifact_len` bytes from `reader` into `writer`
pub async fn decrypt_stream<R, W>(
    mut reader: R,
    artifact_len: u64,
    writer: W,
    key: &CipherKey,
    buffers: &mut ChunkBuffers,
    progress: &dyn Progress,
) -> Result<PipelineStats>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let remaining = payload_len(artifact_len)?;

    let mut iv_bytes = [0u8; IV_LEN];
    read_full(&mut reader, &mut iv_bytes).await?;
    let iv = Iv::from_bytes(iv_bytes);

    let mut source = ReaderSource::new(reader);
    let mut sink = WriterSink::new(writer);
    let mut cipher = KeystreamCipher::new(key, &iv);

    let mut stats = Pipeline::new(buffers)
        .with_progress(progress)
        .run(&mut source, &mut sink, &mut cipher, remaining, None)
        .await?;
    stats.bytes_read += IV_LEN as u64;
    Ok(stats)
}

/// Open a regular file for reading, returning it with its length
pub(crate) async fn open_source(path: &Path) -> Result<(File, u64)> {
    let file = File::open(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("cannot open {}: {e}", path.display()),
        ))
    })?;
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(Error::InvalidPath(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    Ok((file, metadata.len()))
}

/// Create or truncate the destination file
pub(crate) async fn create_dest(path: &Path) -> Result<File> {
    File::create(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("cannot create {}: {e}", path.display()),
        ))
    })
}

/// Encrypt the file at `source` into `dest` with a fresh random IV
pub async fn encrypt_file(
    source: &Path,
    dest: &Path,
    key: &CipherKey,
    buffers: &mut ChunkBuffers,
    progress: &dyn Progress,
) -> Result<PipelineStats> {
    let (input, len) = open_source(source).await?;
    let output = create_dest(dest).await?;
    tracing::info!(
        source = %source.display(),
        dest = %dest.display(),
        bytes = len,
        "Encrypting local file"
    );

    let iv = Iv::random();
    encrypt_stream(input, len, BufWriter::new(output), key, &iv, buffers, progress).await
}

/// Decrypt the artifact at `source` into `dest`
pub async fn decrypt_file(
    source: &Path,
    dest: &Path,
    key: &CipherKey,
    buffers: &mut ChunkBuffers,
    progress: &dyn Progress,
) -> Result<PipelineStats> {
    let (input, len) = open_source(source).await?;
    // Checked before the destination is touched
    payload_len(len)?;
    let output = create_dest(dest).await?;
    tracing::info!(
        source = %source.display(),
        dest = %dest.display(),
        bytes = len,
        "Decrypting local file"
    );

    decrypt_stream(input, len, BufWriter::new(output), key, buffers, progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::NoProgress;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn key() -> CipherKey {
        CipherKey::from_hex("000102030405060708090a0b0c0d0e0f").unwrap()
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8 ^ 0x5c).collect()
    }

    async fn encrypt_bytes(data: &[u8], iv: &Iv, chunk_size: usize) -> Vec<u8> {
        let mut buffers = ChunkBuffers::new(chunk_size).unwrap();
        let mut out = Vec::new();
        encrypt_stream(
            Cursor::new(data.to_vec()),
            data.len() as u64,
            &mut out,
            &key(),
            iv,
            &mut buffers,
            &NoProgress,
        )
        .await
        .unwrap();
        out
    }

    async fn decrypt_bytes(artifact: &[u8], chunk_size: usize) -> Result<Vec<u8>> {
        let mut buffers = ChunkBuffers::new(chunk_size).unwrap();
        let mut out = Vec::new();
        decrypt_stream(
            Cursor::new(artifact.to_vec()),
            artifact.len() as u64,
            &mut out,
            &key(),
            &mut buffers,
            &NoProgress,
        )
        .await?;
        Ok(out)
    }

    #[tokio::test]
    async fn test_round_trip_across_chunk_sizes() {
        let data = sample(1000);
        let iv = Iv::random();
        for chunk in [1, 8, 15, 16, 17, 999, 1000, 1016, 4096] {
            let artifact = encrypt_bytes(&data, &iv, chunk).await;
            assert_eq!(artifact.len(), data.len() + IV_LEN);
            assert_eq!(&artifact[..IV_LEN], iv.as_bytes());
            assert_eq!(decrypt_bytes(&artifact, chunk).await.unwrap(), data, "chunk {chunk}");
        }
    }

    #[tokio::test]
    async fn test_artifact_independent_of_chunk_size() {
        let data = sample(300);
        let iv = Iv::from_bytes([0x42; IV_LEN]);
        let reference = encrypt_bytes(&data, &iv, 16).await;
        for chunk in [17, 64, 4096, data.len() + IV_LEN] {
            assert_eq!(encrypt_bytes(&data, &iv, chunk).await, reference);
        }
    }

    #[tokio::test]
    async fn test_fresh_iv_per_encryption() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("plain.txt");
        tokio::fs::write(&plain, sample(64)).await.unwrap();

        let mut buffers = ChunkBuffers::new(32).unwrap();
        let a = dir.path().join("a.enc");
        let b = dir.path().join("b.enc");
        encrypt_file(&plain, &a, &key(), &mut buffers, &NoProgress)
            .await
            .unwrap();
        encrypt_file(&plain, &b, &key(), &mut buffers, &NoProgress)
            .await
            .unwrap();

        let a = tokio::fs::read(&a).await.unwrap();
        let b = tokio::fs::read(&b).await.unwrap();
        assert_ne!(&a[..IV_LEN], &b[..IV_LEN]);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_small_text_file_scenario() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("a.txt");
        let enc = dir.path().join("a.enc");
        let back = dir.path().join("a.out");
        tokio::fs::write(&plain, b"The quick brown fox\n")
            .await
            .unwrap();

        let mut buffers = ChunkBuffers::new(8).unwrap();
        let stats = encrypt_file(&plain, &enc, &key(), &mut buffers, &NoProgress)
            .await
            .unwrap();
        assert_eq!(stats.bytes_written, 36);
        assert_eq!(tokio::fs::metadata(&enc).await.unwrap().len(), 36);

        decrypt_file(&enc, &back, &key(), &mut buffers, &NoProgress)
            .await
            .unwrap();
        assert_eq!(
            tokio::fs::read(&back).await.unwrap(),
            b"The quick brown fox\n"
        );
    }

    #[tokio::test]
    async fn test_empty_file_round_trip() {
        let iv = Iv::random();
        let artifact = encrypt_bytes(&[], &iv, 4).await;
        assert_eq!(artifact, iv.as_bytes().to_vec());
        assert!(decrypt_bytes(&artifact, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decrypt_rejects_short_artifact() {
        let err = decrypt_bytes(&[0u8; 15], 16).await.unwrap_err();
        assert!(matches!(err, Error::TooSmallObject { size: 15, .. }));
    }

    #[tokio::test]
    async fn test_decrypt_file_short_artifact_leaves_dest_alone() {
        let dir = TempDir::new().unwrap();
        let enc = dir.path().join("tiny.enc");
        let out = dir.path().join("tiny.out");
        tokio::fs::write(&enc, [1u8; 10]).await.unwrap();

        let mut buffers = ChunkBuffers::new(16).unwrap();
        let err = decrypt_file(&enc, &out, &key(), &mut buffers, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TooSmallObject { .. }));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_destination_is_truncated() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("plain");
        let enc = dir.path().join("plain.enc");
        tokio::fs::write(&plain, b"short").await.unwrap();
        tokio::fs::write(&enc, vec![0xffu8; 4096]).await.unwrap();

        let mut buffers = ChunkBuffers::new(1024).unwrap();
        encrypt_file(&plain, &enc, &key(), &mut buffers, &NoProgress)
            .await
            .unwrap();
        assert_eq!(tokio::fs::metadata(&enc).await.unwrap().len(), 5 + 16);
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let mut buffers = ChunkBuffers::new(16).unwrap();
        let err = encrypt_file(
            &dir.path().join("nope"),
            &dir.path().join("out"),
            &key(),
            &mut buffers,
            &NoProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
