//! Probe a gateway over the framed transport.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use lcg_core::{GatewayCodec, GatewayMessage};
use lcg_services::{BufferPool, FrameReader, FrameSink, Received, receive_message, send_message, split};

const PING_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn cmd_ping(addr: &str) -> Result<()> {
    let rtt = ping(addr).await?;
    println!("pong from {} in {:.2} ms", addr, rtt.as_secs_f64() * 1000.0);
    Ok(())
}

/// Send one `Ping`, wait for the matching `Pong`, then close. Returns the
/// round-trip time.
pub async fn ping(addr: &str) -> Result<Duration> {
    let stream = tokio::time::timeout(PING_TIMEOUT, TcpStream::connect(addr))
        .await
        .with_context(|| format!("timed out connecting to {}", addr))?
        .with_context(|| format!("failed to connect to gateway at {}", addr))?;
    stream.set_nodelay(true).ok();

    let (mut reader, mut writer) = split(stream);
    let pool = BufferPool::new();
    let cancel = CancellationToken::new();
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();

    let started = Instant::now();
    send_message(&GatewayMessage::Ping { nonce }, &GatewayCodec, &mut writer, &pool, &cancel)
        .await
        .context("failed to send ping")?;

    let rtt = tokio::time::timeout(PING_TIMEOUT, wait_for_pong(&mut reader, nonce, &pool, &cancel))
        .await
        .context("timed out waiting for pong")??;
    let rtt = rtt.duration_since(started);

    writer
        .send_close("ping complete")
        .await
        .context("failed to close connection")?;
    // Drain until the gateway answers the close.
    let _ = tokio::time::timeout(
        PING_TIMEOUT,
        receive_message(&mut reader, &GatewayCodec, &pool, &cancel),
    )
    .await;

    Ok(rtt)
}

async fn wait_for_pong(
    reader: &mut FrameReader<TcpStream>,
    nonce: u64,
    pool: &BufferPool,
    cancel: &CancellationToken,
) -> Result<Instant> {
    loop {
        match receive_message(reader, &GatewayCodec, pool, cancel)
            .await
            .context("failed to receive pong")?
        {
            Received::Message(GatewayMessage::Pong { nonce: n }) if n == nonce => {
                return Ok(Instant::now());
            }
            Received::Message(_) => continue,
            Received::Closed => bail!("gateway closed the connection before answering"),
        }
    }
}
