//! Gateway message schema and its binary codec.
//!
//! Layout, all integers big endian:
//!
//! ```text
//! Ping  : 0x01 | nonce u64
//! Pong  : 0x02 | nonce u64
//! Data  : 0x03 | channel u16 | length u32 | payload[length]
//! ```

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{DecodeError, EncodeError, MessageDecoder, MessageEncoder};

const TAG_PING: u8 = 0x01;
const TAG_PONG: u8 = 0x02;
const TAG_DATA: u8 = 0x03;

const NONCE_LEN: usize = 8;
const DATA_PREFIX_LEN: usize = 2 + 4;

/// A logical message exchanged with a control node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayMessage {
    /// Liveness probe. The gateway answers with a `Pong` carrying the same nonce.
    Ping { nonce: u64 },

    Pong { nonce: u64 },

    /// Opaque application payload on a numbered channel.
    /// The gateway does not interpret the payload.
    Data { channel: u16, payload: Bytes },
}

impl GatewayMessage {
    fn tag(&self) -> u8 {
        match self {
            GatewayMessage::Ping { .. } => TAG_PING,
            GatewayMessage::Pong { .. } => TAG_PONG,
            GatewayMessage::Data { .. } => TAG_DATA,
        }
    }

    /// Exact encoded length.
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            GatewayMessage::Ping { .. } | GatewayMessage::Pong { .. } => NONCE_LEN,
            GatewayMessage::Data { payload, .. } => DATA_PREFIX_LEN + payload.len(),
        }
    }
}

/// Binary codec for [`GatewayMessage`]. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayCodec;

impl MessageEncoder for GatewayCodec {
    type Message = GatewayMessage;

    fn max_encoded_size(&self, message: &GatewayMessage) -> usize {
        message.encoded_len()
    }

    fn encode(&self, message: &GatewayMessage, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let needed = message.encoded_len();
        if buf.len() < needed {
            return Err(EncodeError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }

        let mut out = &mut buf[..needed];
        out.put_u8(message.tag());
        match message {
            GatewayMessage::Ping { nonce } | GatewayMessage::Pong { nonce } => {
                out.put_u64(*nonce);
            }
            GatewayMessage::Data { channel, payload } => {
                let len = u32::try_from(payload.len())
                    .map_err(|_| EncodeError::PayloadTooLong(payload.len()))?;
                out.put_u16(*channel);
                out.put_u32(len);
                out.put_slice(payload);
            }
        }
        Ok(needed)
    }
}

impl MessageDecoder for GatewayCodec {
    type Message = GatewayMessage;

    fn decode(&self, bytes: &[u8]) -> Result<GatewayMessage, DecodeError> {
        let mut cur = bytes;
        if cur.is_empty() {
            return Err(DecodeError::Empty);
        }

        let message = match cur.get_u8() {
            TAG_PING => {
                require(cur, NONCE_LEN)?;
                GatewayMessage::Ping {
                    nonce: cur.get_u64(),
                }
            }
            TAG_PONG => {
                require(cur, NONCE_LEN)?;
                GatewayMessage::Pong {
                    nonce: cur.get_u64(),
                }
            }
            TAG_DATA => {
                require(cur, DATA_PREFIX_LEN)?;
                let channel = cur.get_u16();
                let len = cur.get_u32() as usize;
                require(cur, len)?;
                let payload = Bytes::copy_from_slice(&cur[..len]);
                cur.advance(len);
                GatewayMessage::Data { channel, payload }
            }
            other => return Err(DecodeError::UnknownTag(other)),
        };

        if !cur.is_empty() {
            return Err(DecodeError::TrailingBytes(cur.len()));
        }
        Ok(message)
    }
}

fn require(cur: &[u8], needed: usize) -> Result<(), DecodeError> {
    if cur.len() < needed {
        return Err(DecodeError::Truncated {
            needed,
            available: cur.len(),
        });
    }
    Ok(())
}
