//! lcgd: live control gateway daemon.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use lcg_core::config::LcgConfig;
use lcg_services::presence::expiry_loop;
use lcg_services::{
    new_connection_table, BufferPool, MemoryRegistry, PresencePublisher, PresenceSettings,
};

mod gateway;
mod status;

use gateway::GatewayListener;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = LcgConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    // Defaults apply only when no file exists.
    let config = LcgConfig::load().context("invalid configuration")?;

    tracing::info!(
        fqdn = %config.node.fqdn,
        country = %config.node.country_code,
        "lcgd starting"
    );

    // Shared state
    let pool = BufferPool::new();
    let connections = new_connection_table();
    let registry = MemoryRegistry::new();
    let cancel = CancellationToken::new();

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let presence_task = PresencePublisher::new(
        registry.clone(),
        PresenceSettings::new(&config.node.fqdn, &config.node.country_code),
    )
    .spawn();

    let expiry_task = tokio::spawn(expiry_loop(registry.clone()));

    let gateway_task = {
        let listener = GatewayListener::bind(
            &config.network.listen_addr,
            config.network.gateway_port,
            pool.clone(),
            connections.clone(),
            cancel.clone(),
            shutdown_tx.subscribe(),
        )
        .await?;
        tokio::spawn(listener.run())
    };

    let connection_printer = {
        let connections = connections.clone();
        let pool = pool.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let stats = pool.stats();
                tracing::info!(
                    count = connections.len(),
                    buffers_out = stats.outstanding(),
                    buffers_idle = stats.idle,
                    "connection table snapshot"
                );
            }
        })
    };

    // Status HTTP endpoint
    let status_port = config.network.status_port;
    let _status_server = {
        let state = status::StatusState {
            node:        config.node.clone(),
            connections: connections.clone(),
            pool:        pool.clone(),
            registry:    registry.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = status::serve(state, status_port).await {
                tracing::error!(error = %e, "status server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = gateway_task        => tracing::error!("gateway listener exited: {:?}", r),
        r = presence_task       => tracing::error!("presence publisher exited: {:?}", r),
        r = expiry_task         => tracing::error!("registry expiry exited: {:?}", r),
        r = connection_printer  => tracing::error!("connection printer exited: {:?}", r),
    }

    // Abort in-flight receives and sends; connections answer with a close.
    cancel.cancel();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !connections.is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tracing::info!(remaining = connections.len(), "lcgd stopped");

    Ok(())
}
