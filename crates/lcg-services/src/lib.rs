//! lcg-services: connection transport and node presence for the gateway.
//!
//! The transport half turns a framed duplex socket into a stream of typed
//! logical messages and back. The presence half keeps this node's record alive
//! in the shared registry.

pub mod connection;
pub mod error;
pub mod pool;
pub mod presence;
pub mod receive;
pub mod send;
pub mod socket;

pub use connection::{new_connection_table, ConnectionMeta, ConnectionTable};
pub use error::TransportError;
pub use pool::{BufferPool, PoolStats, PooledBuffer};
pub use presence::{
    MemoryRegistry, NodePresence, PresencePatch, PresencePublisher, PresenceRegistry,
    PresenceSettings, RegistryError, TickOutcome,
};
pub use receive::{receive_message, Received};
pub use send::{send_bytes, send_message};
pub use socket::{split, FrameKind, FrameRead, FrameReader, FrameSink, FrameSource, FrameWriter};
