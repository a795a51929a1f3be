//! Framed duplex sockets.
//!
//! [`FrameSource`] and [`FrameSink`] are the two directions of a
//! message-oriented socket: binary frames carrying an end-of-message marker,
//! plus a distinguishable close frame. The receiver and sender only depend on
//! these traits.
//!
//! [`split`] implements both over any byte stream (TCP, in-memory duplex)
//! using the header in [`lcg_core::wire`]. The two halves can be driven from
//! different tasks; each half is sequential on its own.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use zerocopy::{AsBytes, FromBytes};

use lcg_core::wire::{FrameHeader, Opcode, FRAME_HEADER_SIZE, MAX_CLOSE_PAYLOAD};

// ── Traits ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Binary,
    Close,
}

/// Result of one physical read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRead {
    pub kind: FrameKind,
    /// Bytes written to the front of the caller's buffer.
    pub len: usize,
    /// Set on the read that completes the final fragment of a logical message.
    pub end_of_message: bool,
}

impl FrameRead {
    pub fn binary(len: usize, end_of_message: bool) -> Self {
        Self {
            kind: FrameKind::Binary,
            len,
            end_of_message,
        }
    }

    pub fn close() -> Self {
        Self {
            kind: FrameKind::Close,
            len: 0,
            end_of_message: true,
        }
    }
}

/// Inbound direction of a framed socket.
#[async_trait]
pub trait FrameSource: Send {
    /// Read the next physical frame, or the next part of a frame larger than
    /// `buf`, into the front of `buf`.
    async fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<FrameRead>;

    /// Answer a close frame read from the peer. Idempotent.
    async fn close(&mut self, reason: &str) -> io::Result<()>;
}

/// Outbound direction of a framed socket.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, data: &[u8], end_of_message: bool) -> io::Result<()>;

    /// Start the closing handshake from this side. Idempotent.
    async fn send_close(&mut self, reason: &str) -> io::Result<()>;
}

// ── Stream implementation ─────────────────────────────────────────────────────

struct WriterState<W> {
    io: W,
    closed: bool,
}

type SharedWriter<W> = Arc<Mutex<WriterState<W>>>;

/// Inbound half produced by [`split`].
pub struct FrameReader<T> {
    io: ReadHalf<T>,
    // The close reply goes out on the write half.
    writer: SharedWriter<WriteHalf<T>>,
    remaining: usize,
    fin: bool,
}

/// Outbound half produced by [`split`].
pub struct FrameWriter<T> {
    writer: SharedWriter<WriteHalf<T>>,
}

/// Split a byte stream into framed reader and writer halves.
pub fn split<T>(io: T) -> (FrameReader<T>, FrameWriter<T>)
where
    T: AsyncRead + AsyncWrite + Send,
{
    let (read, write) = tokio::io::split(io);
    let writer = Arc::new(Mutex::new(WriterState {
        io: write,
        closed: false,
    }));
    (
        FrameReader {
            io: read,
            writer: writer.clone(),
            remaining: 0,
            fin: false,
        },
        FrameWriter { writer },
    )
}

async fn write_frame<W>(io: &mut W, opcode: Opcode, fin: bool, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(data.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame longer than u32::MAX"))?;
    let header = FrameHeader::new(opcode, fin, len);
    io.write_all(header.as_bytes()).await?;
    io.write_all(data).await?;
    io.flush().await
}

async fn write_close<W>(state: &mut WriterState<W>, reason: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if state.closed {
        return Ok(());
    }
    state.closed = true;
    let reason = truncate_reason(reason);
    write_frame(&mut state.io, Opcode::Close, true, reason).await?;
    state.io.shutdown().await
}

/// Cut a close reason to the wire limit on a UTF-8 boundary.
fn truncate_reason(reason: &str) -> &[u8] {
    let mut end = reason.len().min(MAX_CLOSE_PAYLOAD);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason.as_bytes()[..end]
}

#[async_trait]
impl<T> FrameSource for FrameReader<T>
where
    T: AsyncRead + AsyncWrite + Send,
{
    async fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<FrameRead> {
        if self.remaining == 0 {
            let mut raw = [0u8; FRAME_HEADER_SIZE];
            self.io.read_exact(&mut raw).await?;
            let header = FrameHeader::read_from(&raw[..])
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "short frame header"))?;
            let opcode = header
                .validate()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let len = header.payload_len() as usize;

            match opcode {
                Opcode::Close => {
                    let mut reason = [0u8; MAX_CLOSE_PAYLOAD];
                    self.io.read_exact(&mut reason[..len]).await?;
                    tracing::trace!(
                        reason = %String::from_utf8_lossy(&reason[..len]),
                        "close frame received"
                    );
                    return Ok(FrameRead::close());
                }
                Opcode::Binary => {
                    self.remaining = len;
                    self.fin = header.is_final();
                    if len == 0 {
                        return Ok(FrameRead::binary(0, self.fin));
                    }
                }
            }
        }

        let n = self.remaining.min(buf.len());
        self.io.read_exact(&mut buf[..n]).await?;
        self.remaining -= n;
        Ok(FrameRead::binary(n, self.remaining == 0 && self.fin))
    }

    async fn close(&mut self, reason: &str) -> io::Result<()> {
        let mut state = self.writer.lock().await;
        write_close(&mut state, reason).await
    }
}

#[async_trait]
impl<T> FrameSink for FrameWriter<T>
where
    T: AsyncRead + AsyncWrite + Send,
{
    async fn send_frame(&mut self, data: &[u8], end_of_message: bool) -> io::Result<()> {
        let mut state = self.writer.lock().await;
        if state.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "send after close frame",
            ));
        }
        write_frame(&mut state.io, Opcode::Binary, end_of_message, data).await
    }

    async fn send_close(&mut self, reason: &str) -> io::Result<()> {
        let mut state = self.writer.lock().await;
        write_close(&mut state, reason).await
    }
}
