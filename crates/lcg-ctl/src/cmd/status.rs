//! Gateway status, connections, and presence node commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, print_raw};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    fqdn: String,
    country: String,
    connections: usize,
    pool: PoolInfo,
}

#[derive(Deserialize)]
struct PoolInfo {
    acquired: u64,
    released: u64,
    outstanding: u64,
    idle: usize,
}

#[derive(Deserialize)]
struct ConnectionsResponse {
    connections: Vec<ConnectionInfo>,
}

#[derive(Deserialize)]
struct ConnectionInfo {
    id: u64,
    peer: String,
    established_secs: u64,
    messages_received: u64,
    messages_sent: u64,
}

#[derive(Deserialize)]
struct NodesResponse {
    nodes: Vec<NodeInfo>,
}

#[derive(Deserialize)]
struct NodeInfo {
    fqdn: String,
    country: String,
    load: u32,
    ttl_secs: u64,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16, raw: bool) -> Result<()> {
    let url = format!("{}/status", base_url(port));
    if raw {
        return print_raw(&url).await;
    }
    let resp: StatusResponse = get_json(&url).await?;

    println!("═══════════════════════════════════════");
    println!("  Gateway Status");
    println!("═══════════════════════════════════════");
    println!("  Node             : {}", resp.fqdn);
    println!("  Country          : {}", resp.country);
    println!("  Connections      : {}", resp.connections);
    println!();
    println!("  Buffer pool:");
    println!("  ┌─ acquired    : {}", resp.pool.acquired);
    println!("  │  released    : {}", resp.pool.released);
    println!("  │  outstanding : {}", resp.pool.outstanding);
    println!("  └─ idle        : {}", resp.pool.idle);

    Ok(())
}

pub async fn cmd_connections(port: u16, raw: bool) -> Result<()> {
    let url = format!("{}/connections", base_url(port));
    if raw {
        return print_raw(&url).await;
    }
    let resp: ConnectionsResponse = get_json(&url).await?;

    if resp.connections.is_empty() {
        println!("No live connections.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Live Connections ({})", resp.connections.len());
    println!("═══════════════════════════════════════");

    for c in &resp.connections {
        println!("  ┌─ #{}", c.id);
        println!("  │  peer     : {}", c.peer);
        println!("  │  received : {}", c.messages_received);
        println!("  │  sent     : {}", c.messages_sent);
        println!("  └─ uptime   : {}s", c.established_secs);
    }

    Ok(())
}

pub async fn cmd_nodes(port: u16, raw: bool) -> Result<()> {
    let url = format!("{}/nodes", base_url(port));
    if raw {
        return print_raw(&url).await;
    }
    let resp: NodesResponse = get_json(&url).await?;

    if resp.nodes.is_empty() {
        println!("No gateway nodes registered.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Gateway Nodes ({})", resp.nodes.len());
    println!("═══════════════════════════════════════");

    for n in &resp.nodes {
        println!("  ┌─ {}", n.fqdn);
        println!("  │  country : {}", n.country);
        println!("  │  load    : {}", n.load);
        println!("  └─ expires : {}s", n.ttl_secs);
    }

    Ok(())
}
