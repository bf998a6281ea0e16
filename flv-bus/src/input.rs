use std::io;

use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream::Map};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;

/// Buffers an async reader and hands out exactly the number of bytes the
/// parser asks for.
pub struct ByteSource<R> {
    reader: R,
    buf: BytesMut,
    chunk_size: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> ByteSource<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            reader,
            buf: BytesMut::with_capacity(chunk_size),
            chunk_size,
            eof: false,
        }
    }

    /// Waits until `n` bytes are available and returns them.
    ///
    /// Returns `Ok(None)` when the input ended with nothing left over. Input
    /// that ends part way through a request is an `UnexpectedEof` error.
    pub async fn read_exact(&mut self, n: usize) -> io::Result<Option<Bytes>> {
        while self.buf.len() < n && !self.eof {
            self.buf.reserve(self.chunk_size.max(n - self.buf.len()));
            if self.reader.read_buf(&mut self.buf).await? == 0 {
                log::debug!("end of input, {} bytes left over", self.buf.len());
                self.eof = true;
            }
        }

        if self.buf.len() >= n {
            return Ok(Some(self.buf.split_to(n).freeze()));
        }
        if self.buf.is_empty() {
            return Ok(None);
        }
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "input truncated: needed {} bytes, {} available",
                n,
                self.buf.len()
            ),
        ))
    }
}

type ChunkStream = Map<ReceiverStream<Bytes>, fn(Bytes) -> io::Result<Bytes>>;

/// Reader over chunks pushed through a [`RawInput`].
pub type RawInputReader = StreamReader<ChunkStream, Bytes>;

/// Channel-fed input for callers that receive the container in pieces, e.g.
/// from a network session. Dropping every writer signals end of input.
pub struct RawInput {
    writer: mpsc::Sender<Bytes>,
    inner: mpsc::Receiver<Bytes>,
}

impl RawInput {
    pub fn new() -> Self {
        Self::with_capacity(32)
    }

    pub fn with_capacity(buffer_size: usize) -> Self {
        let (writer, inner) = mpsc::channel(buffer_size.max(1));
        Self { writer, inner }
    }

    pub fn writer(&self) -> mpsc::Sender<Bytes> {
        self.writer.clone()
    }

    /// Consumes the input, keeping only the reading side. Writers handed out
    /// before stay valid.
    pub fn into_reader(self) -> RawInputReader {
        let stream: ChunkStream = ReceiverStream::new(self.inner).map(Ok as fn(Bytes) -> io::Result<Bytes>);
        StreamReader::new(stream)
    }
}

impl Default for RawInput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_exact_across_chunks() -> anyhow::Result<()> {
        let input = RawInput::with_capacity(4);
        let writer = input.writer();
        let mut source = ByteSource::new(input.into_reader(), 2);

        tokio::spawn(async move {
            for chunk in [&b"FL"[..], b"V", b"\x01\x05", b"\x00\x00"] {
                let _ = writer.send(Bytes::copy_from_slice(chunk)).await;
            }
        });

        assert_eq!(source.read_exact(3).await?.as_deref(), Some(&b"FLV"[..]));
        assert_eq!(source.read_exact(1).await?.as_deref(), Some(&[1u8][..]));
        assert_eq!(source.read_exact(1).await?.as_deref(), Some(&[5u8][..]));
        assert_eq!(source.read_exact(2).await?.as_deref(), Some(&[0u8, 0][..]));
        assert_eq!(source.read_exact(4).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_truncated_input() -> anyhow::Result<()> {
        let data: &[u8] = b"FLV\x01";
        let mut source = ByteSource::new(data, 64);

        assert!(source.read_exact(3).await?.is_some());
        let err = source.read_exact(4).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        Ok(())
    }
}
