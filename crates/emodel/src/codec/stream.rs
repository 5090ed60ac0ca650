//! Incremental primitive reads from an async byte stream.

use std::io;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::DecodeError;
use crate::limits::{MAX_RECORD_SIZE, MAX_VARINT_BYTES};

/// Async counterpart of [`Reader`](super::Reader) that optionally hashes
/// everything it reads.
pub(crate) struct StreamReader<'s> {
    inner: &'s mut (dyn AsyncRead + Unpin + Send),
    hasher: Option<Sha256>,
    consumed: usize,
}

impl<'s> StreamReader<'s> {
    pub fn new(inner: &'s mut (dyn AsyncRead + Unpin + Send)) -> Self {
        Self {
            inner,
            hasher: None,
            consumed: 0,
        }
    }

    /// Starts hashing. `prefix` (bytes already read) is hashed first.
    pub fn start_hashing(&mut self, prefix: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(prefix);
        self.hasher = Some(hasher);
    }

    /// Stops hashing and returns the digest of everything hashed so far.
    pub fn finish_hashing(&mut self) -> Option<[u8; 32]> {
        self.hasher.take().map(|h| {
            let mut digest = [0u8; 32];
            digest.copy_from_slice(&h.finalize());
            digest
        })
    }

    /// Total bytes read from the stream.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn inner(&mut self) -> &mut (dyn AsyncRead + Unpin + Send) {
        &mut *self.inner
    }

    pub async fn read_exact(&mut self, n: usize, context: &'static str) -> Result<Vec<u8>, DecodeError> {
        let mut buf = vec![0u8; n];
        self.inner
            .read_exact(&mut buf)
            .await
            .map_err(|e| map_io(e, context))?;
        self.consumed += n;
        if let Some(hasher) = &mut self.hasher {
            hasher.update(&buf);
        }
        Ok(buf)
    }

    pub async fn read_byte(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        let bytes = self.read_exact(1, context).await?;
        Ok(bytes[0])
    }

    /// Reads an unsigned LEB128 varint, one byte at a time.
    pub async fn read_varint(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        let mut result: u64 = 0;
        let mut shift = 0;
        for _ in 0..MAX_VARINT_BYTES {
            let byte = self.read_byte(context).await?;
            let value = (byte & 0x7F) as u64;
            if shift >= 64 || (shift == 63 && value > 1) {
                return Err(DecodeError::VarintOverflow);
            }
            result |= value << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(DecodeError::VarintTooLong)
    }

    /// Reads a length-prefixed frame.
    pub async fn read_frame(&mut self, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_varint(field).await? as usize;
        if len > MAX_RECORD_SIZE {
            return Err(DecodeError::LengthExceedsLimit {
                field,
                len,
                max: MAX_RECORD_SIZE,
            });
        }
        self.read_exact(len, field).await
    }
}

fn map_io(err: io::Error, context: &'static str) -> DecodeError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => DecodeError::UnexpectedEof { context },
        _ => DecodeError::Io(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Writer;

    #[tokio::test]
    async fn test_reads_frames_and_hashes() {
        let mut writer = Writer::new();
        writer.write_varint(300);
        writer.write_frame(b"hello");
        let bytes = writer.into_bytes();

        let mut source: &[u8] = &bytes;
        let mut reader = StreamReader::new(&mut source);
        reader.start_hashing(b"");
        assert_eq!(reader.read_varint("n").await.unwrap(), 300);
        assert_eq!(reader.read_frame("frame").await.unwrap(), b"hello");
        assert_eq!(reader.consumed(), bytes.len());

        let digest = reader.finish_hashing().unwrap();
        assert_eq!(&digest[..], &Sha256::digest(&bytes)[..]);
    }

    #[tokio::test]
    async fn test_eof_is_reported_with_context() {
        let mut source: &[u8] = &[0x05, b'a'];
        let mut reader = StreamReader::new(&mut source);
        assert_eq!(
            reader.read_frame("record").await,
            Err(DecodeError::UnexpectedEof { context: "record" })
        );
    }
}
