//! Gateway integration test harness.
//!
//! Tests run the transport over real loopback TCP connections and drive the
//! presence publisher against the in-process registry. No external services
//! are needed:
//!
//!   cargo test --test integration

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};

use lcg_core::DecodeError;
use lcg_services::{split, FrameReader, FrameWriter};

mod presence;
mod transport;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Both ends of one framed loopback connection.
pub struct Link {
    pub client_rx: FrameReader<TcpStream>,
    pub client_tx: FrameWriter<TcpStream>,
    pub server_rx: FrameReader<TcpStream>,
    pub server_tx: FrameWriter<TcpStream>,
}

/// Open a TCP connection to ourselves and frame both sides.
pub async fn loopback() -> Result<Link> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind loopback listener")?;
    let addr = listener.local_addr()?;

    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let client = client.context("failed to connect to loopback listener")?;
    let (server, _) = accepted.context("failed to accept loopback connection")?;

    let (client_rx, client_tx) = split(client);
    let (server_rx, server_tx) = split(server);
    Ok(Link {
        client_rx,
        client_tx,
        server_rx,
        server_tx,
    })
}

/// Hands back the reassembled bytes untouched.
pub struct RawDecoder;

impl lcg_core::MessageDecoder for RawDecoder {
    type Message = Vec<u8>;

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
        Ok(bytes.to_vec())
    }
}
