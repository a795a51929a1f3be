//! lcg-core: protocol constants, wire format, message codec and configuration.
//! All other gateway crates depend on this one.

pub mod codec;
pub mod config;
pub mod message;
pub mod wire;

pub use codec::{DecodeError, EncodeError, MessageDecoder, MessageEncoder};
pub use message::{GatewayCodec, GatewayMessage};
