//! Control node connections: accept loop and per-connection tasks.
//!
//! Every accepted socket gets a reader (this task) and a writer task joined by
//! a bounded queue. Receives are sequential on the reader, sends sequential on
//! the writer, and the two directions run concurrently.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use lcg_core::{GatewayCodec, GatewayMessage};
use lcg_services::{
    receive_message, send_message, split, BufferPool, ConnectionMeta, ConnectionTable, FrameSink,
    FrameWriter, Received, TransportError,
};

/// Replies queued per connection before the reader waits on the writer.
const OUTBOUND_QUEUE: usize = 64;

/// How long to wait for our close frame to be written.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct GatewayListener {
    listener: TcpListener,
    pool: BufferPool,
    connections: ConnectionTable,
    cancel: CancellationToken,
    shutdown: broadcast::Receiver<()>,
    next_id: u64,
}

impl GatewayListener {
    pub async fn bind(
        addr: &str,
        port: u16,
        pool: BufferPool,
        connections: ConnectionTable,
        cancel: CancellationToken,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((addr, port))
            .await
            .with_context(|| format!("failed to bind gateway listener on {addr}:{port}"))?;
        Ok(Self {
            listener,
            pool,
            connections,
            cancel,
            shutdown,
            next_id: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("gateway listener has no local address")
    }

    pub async fn run(mut self) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "gateway listening");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("gateway listener shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };

                    self.next_id += 1;
                    tokio::spawn(handle_connection(
                        self.next_id,
                        stream,
                        peer_addr,
                        self.pool.clone(),
                        self.connections.clone(),
                        self.cancel.child_token(),
                    ));
                }
            }
        }
    }
}

async fn handle_connection(
    id: u64,
    stream: TcpStream,
    peer_addr: SocketAddr,
    pool: BufferPool,
    connections: ConnectionTable,
    cancel: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "failed to set TCP_NODELAY");
    }

    let meta = Arc::new(ConnectionMeta::new(peer_addr));
    connections.insert(id, meta.clone());
    tracing::info!(id, peer = %peer_addr, "connection opened");

    let (mut reader, writer) = split(stream);
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let writer_task = tokio::spawn(write_loop(
        writer,
        out_rx,
        pool.clone(),
        cancel.clone(),
        meta.clone(),
    ));

    let codec = GatewayCodec;
    let close_reason = loop {
        match receive_message(&mut reader, &codec, &pool, &cancel).await {
            Ok(Received::Message(message)) => {
                meta.record_received();
                if let Some(reply) = respond(id, message) {
                    if out_tx.send(reply).await.is_err() {
                        break "writer stopped";
                    }
                }
            }
            Ok(Received::Closed) => {
                tracing::info!(id, peer = %peer_addr, "peer closed connection");
                break "closed by peer";
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(id, error = %e, "discarding malformed message");
            }
            Err(TransportError::Cancelled) => break "server shutting down",
            Err(e @ TransportError::MessageTooLarge { .. }) => {
                tracing::warn!(id, peer = %peer_addr, error = %e, "dropping misbehaving connection");
                break "message too large";
            }
            Err(e) => {
                tracing::warn!(id, peer = %peer_addr, error = %e, "receive failed, dropping connection");
                break "receive failed";
            }
        }
    };

    drop(out_tx);
    match writer_task.await {
        Ok(mut writer) => {
            match tokio::time::timeout(CLOSE_TIMEOUT, writer.send_close(close_reason)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(id, error = %e, "close frame not delivered"),
                Err(_) => tracing::debug!(id, "close frame timed out"),
            }
        }
        Err(e) => tracing::error!(id, error = %e, "writer task failed"),
    }

    connections.remove(&id);
    tracing::info!(
        id,
        peer = %peer_addr,
        reason = close_reason,
        uptime_secs = meta.established_at.elapsed().as_secs(),
        "connection closed"
    );
}

/// Drain the outbound queue. Returns the sink so the caller can close it.
async fn write_loop(
    mut writer: FrameWriter<TcpStream>,
    mut rx: mpsc::Receiver<GatewayMessage>,
    pool: BufferPool,
    cancel: CancellationToken,
    meta: Arc<ConnectionMeta>,
) -> FrameWriter<TcpStream> {
    let codec = GatewayCodec;
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(m) => m,
                None => break,
            },
        };

        match send_message(&message, &codec, &mut writer, &pool, &cancel).await {
            Ok(()) => meta.record_sent(),
            Err(e) => {
                tracing::warn!(error = %e, "send failed, dropping connection");
                // Stops the reader too.
                cancel.cancel();
                break;
            }
        }
    }
    writer
}

/// Reply policy for inbound messages. Command handling lives elsewhere.
fn respond(id: u64, message: GatewayMessage) -> Option<GatewayMessage> {
    match message {
        GatewayMessage::Ping { nonce } => Some(GatewayMessage::Pong { nonce }),
        GatewayMessage::Pong { nonce } => {
            tracing::trace!(id, nonce, "pong received");
            None
        }
        GatewayMessage::Data { channel, payload } => {
            tracing::debug!(id, channel, len = payload.len(), "data message received");
            None
        }
    }
}
