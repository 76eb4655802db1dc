//! Bounded-wait framed I/O over byte-stream links.
//!
//! Each ring participant owns exactly one [`FrameReceiver`] on its
//! predecessor link and one [`FrameSender`] on its successor link (the bridge
//! owns a second pair for its remote peer). Receives are bounded by a
//! deadline rather than a sleep-poll loop: the receiver issues real async
//! reads capped by the remaining time, so a timed-out receive consumes
//! nothing and partial bytes stay buffered for the next attempt.
//!
//! # Example
//!
//! ```no_run
//! use ringnet::config::TimingConfig;
//! use ringnet::transport::{FrameReceiver, FrameSender, Recv};
//! use std::time::Duration;
//!
//! # async fn demo() -> ringnet::error::Result<()> {
//! let (tx_half, rx_half) = tokio::io::duplex(4096);
//! let mut tx = FrameSender::new(tx_half);
//! let mut rx = FrameReceiver::new(rx_half);
//!
//! tx.send_kill().await?;
//! match rx.recv_frame(Duration::from_millis(50), &TimingConfig::default()).await? {
//!     Recv::Frame(frame) => assert!(frame.is_kill()),
//!     _ => unreachable!(),
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::config::TimingConfig;
use crate::error::{Result, RingError};
use crate::protocol::{Frame, Header, Token, HEADER_SIZE};

/// Read-buffer growth step.
const READ_CHUNK: usize = 1024;

/// Outcome of one bounded framed receive.
#[derive(Debug)]
pub enum Recv {
    /// A complete frame arrived.
    Frame(Frame),
    /// No header arrived within the wait bound. Normal idle outcome.
    Empty,
    /// A header arrived but the declared body never completed in time.
    /// The ring is carrying a short or lost frame.
    Truncated(Header),
}

/// Receiving half of a link, with an internal accumulation buffer.
pub struct FrameReceiver<R> {
    reader: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    /// Wrap the read half of a link.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Receive exactly `n` bytes, waiting at most `wait`.
    ///
    /// On timeout returns `Ok(None)` and consumes nothing; bytes that did
    /// arrive stay buffered for the next call. EOF on the link is a
    /// [`RingError::ConnectionClosed`].
    pub async fn recv_exact(&mut self, n: usize, wait: Duration) -> Result<Option<Bytes>> {
        let deadline = Instant::now() + wait;
        while self.buf.len() < n {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.buf.reserve(READ_CHUNK);
            match tokio::time::timeout_at(deadline, self.reader.read_buf(&mut self.buf)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => return Err(RingError::ConnectionClosed),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        Ok(Some(self.buf.split_to(n).freeze()))
    }

    /// Receive a single byte with a wait bound. Used by the monitor's ring
    /// drain.
    pub async fn recv_byte(&mut self, wait: Duration) -> Result<Option<u8>> {
        Ok(self.recv_exact(1, wait).await?.map(|b| b[0]))
    }

    /// Receive one complete frame: a 5-byte header bounded by `header_wait`,
    /// then `size + 1` body bytes bounded by the size-scaled body wait.
    pub async fn recv_frame(
        &mut self,
        header_wait: Duration,
        timing: &TimingConfig,
    ) -> Result<Recv> {
        let header_bytes = match self.recv_exact(HEADER_SIZE, header_wait).await? {
            Some(bytes) => bytes,
            None => return Ok(Recv::Empty),
        };
        let header = Header::decode(&header_bytes)
            .ok_or_else(|| RingError::Protocol("short header read".to_string()))?;

        let size = header.size();
        let body = match self.recv_exact(size + 1, timing.body_wait(size)).await? {
            Some(bytes) => bytes,
            None => return Ok(Recv::Truncated(header)),
        };

        let frame = Frame::from_parts(header, body)
            .ok_or_else(|| RingError::Protocol("short body read".to_string()))?;
        Ok(Recv::Frame(frame))
    }

    /// Number of buffered, not-yet-consumed bytes.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Sending half of a link.
pub struct FrameSender<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameSender<W> {
    /// Wrap the write half of a link.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one frame and flush it.
    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        self.writer.write_all(&frame.encode()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Pass the token onward, preserving its used flag.
    pub async fn send_token(&mut self, token: &Token) -> Result<()> {
        self.send(&token.to_frame()).await
    }

    /// Emit the fixed KILL control frame.
    pub async fn send_kill(&mut self) -> Result<()> {
        self.send(&Frame::kill()).await
    }

    /// Emit the fixed FINISH control frame.
    pub async fn send_finish(&mut self) -> Result<()> {
        self.send(&Frame::finish()).await
    }

    /// Raw access to the underlying writer, for emitting deliberately
    /// malformed bytes in tests.
    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Orderly link teardown.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
