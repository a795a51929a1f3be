//! HTTP status endpoint: exposes gateway state as JSON.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use lcg_core::config::NodeConfig;
use lcg_services::{BufferPool, ConnectionTable, MemoryRegistry};

#[derive(Clone)]
pub struct StatusState {
    pub node:        NodeConfig,
    pub connections: ConnectionTable,
    pub pool:        BufferPool,
    pub registry:    MemoryRegistry,
}

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub fqdn:        String,
    pub country:     String,
    pub connections: usize,
    pub pool:        PoolInfo,
}

#[derive(Debug, Serialize)]
pub struct PoolInfo {
    pub acquired:    u64,
    pub released:    u64,
    pub outstanding: u64,
    pub idle:        usize,
}

async fn handle_status(State(state): State<StatusState>) -> Json<StatusResponse> {
    let stats = state.pool.stats();
    Json(StatusResponse {
        fqdn:        state.node.fqdn.clone(),
        country:     state.node.country_code.clone(),
        connections: state.connections.len(),
        pool: PoolInfo {
            acquired:    stats.acquired,
            released:    stats.released,
            outstanding: stats.outstanding(),
            idle:        stats.idle,
        },
    })
}

// ── /connections ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub connections: Vec<ConnectionInfo>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionInfo {
    pub id:                u64,
    pub peer:              String,
    pub established_secs:  u64,
    pub messages_received: u64,
    pub messages_sent:     u64,
}

async fn handle_connections(State(state): State<StatusState>) -> Json<ConnectionsResponse> {
    let mut connections: Vec<ConnectionInfo> = state
        .connections
        .iter()
        .map(|e| {
            let meta = e.value();
            ConnectionInfo {
                id:                *e.key(),
                peer:              meta.peer_addr.to_string(),
                established_secs:  meta.established_at.elapsed().as_secs(),
                messages_received: meta.messages_received.load(Ordering::Relaxed),
                messages_sent:     meta.messages_sent.load(Ordering::Relaxed),
            }
        })
        .collect();
    connections.sort_by_key(|c| c.id);

    Json(ConnectionsResponse { connections })
}

// ── /nodes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct NodesResponse {
    pub nodes: Vec<NodeInfo>,
}

#[derive(Debug, Serialize)]
pub struct NodeInfo {
    pub fqdn:     String,
    pub country:  String,
    pub load:     u32,
    pub ttl_secs: u64,
}

async fn handle_nodes(State(state): State<StatusState>) -> Json<NodesResponse> {
    let nodes = state
        .registry
        .live_nodes()
        .into_iter()
        .map(|(record, ttl)| NodeInfo {
            fqdn:     record.fqdn,
            country:  record.country,
            load:     record.load,
            ttl_secs: ttl.as_secs(),
        })
        .collect();

    Json(NodesResponse { nodes })
}

pub fn router(state: StatusState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(handle_status))
        .route("/connections", get(handle_connections))
        .route("/nodes", get(handle_nodes))
        .with_state(state)
        .layer(cors)
}

pub async fn serve(state: StatusState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "status endpoint listening on 127.0.0.1");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
