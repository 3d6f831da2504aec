//! TCP connection: exact-count reads and flush-guaranteed writes.
//!
//! One connection owns one duplex stream. The read half moves into the
//! dispatch loop as a [`FrameReader`]; the write half sits behind a clonable
//! [`WriteHandle`] shared by the dispatch loop (auth answers) and ad-hoc
//! `send_packet` callers. A `tokio::sync::Mutex` serializes writers so
//! concurrent sends cannot interleave frame bytes on the wire.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use sidelink_core::error::{Result, SidelinkError};
use sidelink_core::protocol::{decode_length, encode_frame, LEN_PREFIX_SIZE};

/// One live duplex stream to the peer.
pub struct Connection {
    reader: FrameReader,
    write_half: OwnedWriteHalf,
}

impl Connection {
    /// Establish the stream. Fails with an I/O error if the peer is
    /// unreachable.
    pub async fn open(host: &str, port: u16, max_frame_bytes: usize) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(read_half, max_frame_bytes),
            write_half,
        })
    }

    /// Split into the dispatch loop's reader and the raw write half (to be
    /// attached to a [`WriteHandle`]).
    pub fn into_parts(self) -> (FrameReader, OwnedWriteHalf) {
        (self.reader, self.write_half)
    }
}

/// Read side: pulls whole frames off the stream.
pub struct FrameReader {
    inner: OwnedReadHalf,
    max_frame_bytes: usize,
}

impl FrameReader {
    fn new(inner: OwnedReadHalf, max_frame_bytes: usize) -> Self {
        Self {
            inner,
            max_frame_bytes,
        }
    }

    /// Read exactly one frame and return its payload bytes.
    ///
    /// Suspends until the length prefix and the declared payload have both
    /// arrived. Peer close before a full frame is `ConnectionClosed`; a
    /// declared length beyond the configured bound is `FrameTooLarge`.
    /// Both are fatal to the dispatch loop.
    pub async fn read_frame(&mut self) -> Result<Bytes> {
        let mut prefix = [0u8; LEN_PREFIX_SIZE];
        self.read_exact(&mut prefix).await?;
        let len = decode_length(&prefix)?;

        if len > self.max_frame_bytes {
            return Err(SidelinkError::FrameTooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }

        let mut payload = vec![0u8; len];
        self.read_exact(&mut payload).await?;
        Ok(Bytes::from(payload))
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SidelinkError::ConnectionClosed
            } else {
                SidelinkError::Io(e)
            }
        })?;
        Ok(())
    }
}

/// Clonable, mutex-serialized write side.
#[derive(Clone)]
pub struct WriteHandle {
    inner: Arc<Mutex<Option<OwnedWriteHalf>>>,
}

impl WriteHandle {
    /// Handle wrapping an already-open write half.
    pub fn new(write_half: OwnedWriteHalf) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(write_half))),
        }
    }

    /// Detached handle with no stream behind it. Writes fail with
    /// `StreamNotSet` until a connection is opened.
    pub fn detached() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Swap in the write half of a freshly opened stream.
    pub async fn attach(&self, write_half: OwnedWriteHalf) {
        *self.inner.lock().await = Some(write_half);
    }

    /// Frame `payload` and write it, holding the lock across write + flush
    /// so concurrent callers never interleave.
    pub async fn write_frame(&self, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(payload);
        let mut guard = self.inner.lock().await;
        let stream = guard.as_mut().ok_or(SidelinkError::StreamNotSet)?;
        stream.write_all(&frame).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Graceful shutdown. Takes the stream out so later writes fail with
    /// `StreamNotSet`; idempotent. A shutdown error on a stream the peer
    /// already dropped is not worth surfacing.
    pub async fn close(&self) -> Result<()> {
        let taken = self.inner.lock().await.take();
        if let Some(mut stream) = taken {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(%e, "shutdown on already-dead stream");
            }
        }
        Ok(())
    }
}
