//! lcg-ctl: command-line interface for the gateway daemon.

mod cmd;

use anyhow::{Context, Result};

use cmd::ping::cmd_ping;
use cmd::status::{cmd_connections, cmd_nodes, cmd_status};

const DEFAULT_PORT: u16 = 8581;

fn print_usage() {
    println!("Usage: lcg-ctl [--port <port>] [--json] <command>");
    println!();
    println!("Commands:");
    println!("  status             Show node identity, connection count, and buffer pool");
    println!("  connections        List live control node connections");
    println!("  nodes              List gateway nodes visible in the presence registry");
    println!("  ping <host:port>   Send a ping over the gateway transport and time the pong");
    println!();
    println!("Options:");
    println!("  --port <port>   Status endpoint port (default: {})", DEFAULT_PORT);
    println!("  --json          Print raw JSON responses");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse options
    let mut port = DEFAULT_PORT;
    let mut raw = false;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--json" => raw = true,
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | []                => cmd_status(port, raw).await,
        ["connections"]                => cmd_connections(port, raw).await,
        ["nodes"]                      => cmd_nodes(port, raw).await,
        ["ping", addr]                 => cmd_ping(addr).await,
        ["help"] | ["--help"] | ["-h"] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
