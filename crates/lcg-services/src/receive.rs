//! Inbound message reassembly.

use tokio_util::sync::CancellationToken;

use lcg_core::wire::{MAX_MESSAGE_SIZE, RECEIVE_BUFFER_SIZE};
use lcg_core::MessageDecoder;

use crate::error::TransportError;
use crate::pool::BufferPool;
use crate::socket::{FrameKind, FrameSource};

const CLOSE_REASON: &str = "Closure during message read";

/// Outcome of a successful receive.
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    Message(T),
    /// The peer sent a close frame. The closing handshake has been answered.
    Closed,
}

/// Read one logical message from `source`.
///
/// Physical frames are appended until one carries the end-of-message marker,
/// then the accumulated bytes are decoded. A close frame at any point ends the
/// receive with [`Received::Closed`] and nothing is decoded. Once more than
/// [`MAX_MESSAGE_SIZE`] bytes have accumulated the receive fails with
/// [`TransportError::MessageTooLarge`] without reading further.
///
/// Both buffers go back to `pool` on every path, including cancellation.
/// A cancelled receive may leave the socket mid-frame; drop the connection.
pub async fn receive_message<S, D>(
    source: &mut S,
    decoder: &D,
    pool: &BufferPool,
    cancel: &CancellationToken,
) -> Result<Received<D::Message>, TransportError>
where
    S: FrameSource + ?Sized,
    D: MessageDecoder,
{
    let mut scratch = pool.acquire(RECEIVE_BUFFER_SIZE);
    let mut message = pool.acquire(0);

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            frame = source.recv_frame(scratch.as_mut_slice()) => frame?,
        };

        if frame.kind == FrameKind::Close {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                closed = source.close(CLOSE_REASON) => closed?,
            }
            return Ok(Received::Closed);
        }

        let total = message.len() + frame.len;
        if total > MAX_MESSAGE_SIZE {
            return Err(TransportError::MessageTooLarge {
                size: total,
                max: MAX_MESSAGE_SIZE,
            });
        }
        message.extend_from_slice(&scratch[..frame.len]);

        if frame.end_of_message {
            break;
        }
    }

    let decoded = decoder.decode(&message)?;
    Ok(Received::Message(decoded))
}
