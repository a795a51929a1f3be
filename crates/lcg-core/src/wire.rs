//! Gateway wire format: limits and the physical frame header.
//!
//! The size limits are shared with every client in the field. Changing any of
//! them is a breaking change for deployed control nodes.
//!
//! On byte-stream transports every physical frame is preceded by a
//! [`FrameHeader`]. A logical message is one or more binary frames, the last
//! of which carries [`FLAG_FIN`]. A close frame may appear at any point,
//! including between two fragments of a logical message.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Limits ───────────────────────────────────────────────────────────────────

/// Upper bound on one logical message, inbound and outbound.
pub const MAX_MESSAGE_SIZE: usize = 512_000;

/// Scratch buffer size for a single physical read.
pub const RECEIVE_BUFFER_SIZE: usize = 4096;

/// Largest physical frame written by the sender.
pub const SEND_CHUNK_SIZE: usize = 1024;

/// Largest reason payload carried by a close frame.
pub const MAX_CLOSE_PAYLOAD: usize = 125;

// ── Presence ─────────────────────────────────────────────────────────────────

/// Registry TTL of a node presence record, in seconds.
pub const PRESENCE_TTL_SECS: u64 = 35;

/// Delay between two presence ticks, in seconds.
/// Well under half the TTL so two consecutive failed ticks are tolerated.
pub const PRESENCE_REFRESH_SECS: u64 = 15;

// ── Frame Header ─────────────────────────────────────────────────────────────

/// End-of-message marker. Set on the last physical frame of a logical message.
pub const FLAG_FIN: u8 = 0x01;

/// Header preceding every physical frame on a byte stream.
///
/// Wire size: 6 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// Bit 0: FIN. Bits 1-7 reserved, must be zero.
    pub flags: u8,

    /// See [`Opcode`].
    pub opcode: u8,

    /// Payload length in bytes, big endian.
    pub length: [u8; 4],
}

assert_eq_size!(FrameHeader, [u8; 6]);

/// Size of [`FrameHeader`] on the wire.
pub const FRAME_HEADER_SIZE: usize = std::mem::size_of::<FrameHeader>();

impl FrameHeader {
    pub fn new(opcode: Opcode, end_of_message: bool, length: u32) -> Self {
        Self {
            flags: if end_of_message { FLAG_FIN } else { 0 },
            opcode: opcode.into(),
            length: length.to_be_bytes(),
        }
    }

    pub fn payload_len(&self) -> u32 {
        u32::from_be_bytes(self.length)
    }

    pub fn is_final(&self) -> bool {
        self.flags & FLAG_FIN != 0
    }

    /// Check reserved bits, opcode and close payload bound.
    pub fn validate(&self) -> Result<Opcode, WireError> {
        if self.flags & !FLAG_FIN != 0 {
            return Err(WireError::ReservedFlagsSet(self.flags));
        }
        let opcode = Opcode::try_from(self.opcode)?;
        let len = self.payload_len() as usize;
        if opcode == Opcode::Close {
            if len > MAX_CLOSE_PAYLOAD {
                return Err(WireError::CloseTooLong(len));
            }
            if !self.is_final() {
                return Err(WireError::FragmentedClose);
            }
        }
        Ok(opcode)
    }
}

// ── Opcode ───────────────────────────────────────────────────────────────────

/// Physical frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// A fragment of a binary logical message.
    Binary = 0x02,

    /// Close control frame. Terminates the connection in the sending direction.
    Close = 0x08,
}

impl TryFrom<u8> for Opcode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x02 => Ok(Opcode::Binary),
            0x08 => Ok(Opcode::Close),
            other => Err(WireError::UnknownOpcode(other)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting a frame header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown opcode: 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("reserved flags are non-zero: 0x{0:02x}")]
    ReservedFlagsSet(u8),

    #[error("close payload length {0} exceeds maximum {}", MAX_CLOSE_PAYLOAD)]
    CloseTooLong(usize),

    #[error("close frame must not be fragmented")]
    FragmentedClose,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
