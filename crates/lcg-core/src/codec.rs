//! Codec traits: the boundary between the transport and the message types.
//!
//! The transport never inspects message contents. It only needs to turn bytes
//! into a typed message, and a typed message into bytes within a known bound.

/// Parses one complete logical message.
pub trait MessageDecoder: Send + Sync {
    type Message: Send;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Message, DecodeError>;
}

/// Writes one logical message into a caller-supplied buffer.
pub trait MessageEncoder: Send + Sync {
    type Message: Sync;

    /// Upper bound on the encoded length of `message`.
    /// Must be cheap: the sender checks it before allocating.
    fn max_encoded_size(&self, message: &Self::Message) -> usize;

    /// Encode into `buf` (at least `max_encoded_size` long) and return the
    /// number of bytes written.
    fn encode(&self, message: &Self::Message, buf: &mut [u8]) -> Result<usize, EncodeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,

    #[error("unknown message tag: 0x{0:02x}")]
    UnknownTag(u8),

    #[error("truncated message: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("buffer too small: needed {needed} bytes, {available} available")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("payload length {0} does not fit the length prefix")]
    PayloadTooLong(usize),
}
