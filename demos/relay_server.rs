//! Simple frame relay server example
//!
//! Run with: cargo run --example relay_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example relay_server                    # binds to 0.0.0.0:8090
//!   cargo run --example relay_server localhost          # binds to 127.0.0.1:8090
//!   cargo run --example relay_server 127.0.0.1:9001     # binds to 127.0.0.1:9001
//!
//! ## Broadcasting
//!
//! Connect a WebSocket to ws://localhost:8090 and send:
//!   {"type":"start_stream"}
//! then push frames:
//!   {"type":"frame","streamId":"<id>","frame":"data:image/jpeg;base64,..."}
//!
//! ## Viewing
//!
//! Connect another WebSocket and send:
//!   {"type":"join_stream","streamId":"<id>"}
//!
//! Path addressing also works: ws://localhost:8090/broadcaster/my-stream and
//! ws://localhost:8090/viewer/my-stream.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use relay_rs::protocol::FramePayload;
use relay_rs::server::{ConnectionContext, RelayHandler};
use relay_rs::{RelayServer, ServerConfig, StreamId};

/// Handler that logs lifecycle events and counts frames
struct LoggingHandler {
    frames: AtomicU64,
    streams: AtomicU64,
}

impl LoggingHandler {
    fn new() -> Self {
        Self {
            frames: AtomicU64::new(0),
            streams: AtomicU64::new(0),
        }
    }
}

impl RelayHandler for LoggingHandler {
    async fn on_connection(&self, ctx: &ConnectionContext) -> bool {
        println!("[{}] New connection from {}", ctx.session_id, ctx.peer_addr);
        true
    }

    async fn on_stream_created(&self, ctx: &ConnectionContext, stream_id: &StreamId) {
        let total = self.streams.fetch_add(1, Ordering::Relaxed) + 1;
        println!(
            "[{}] Stream created: {} ({} total)",
            ctx.session_id, stream_id, total
        );
    }

    async fn on_viewer_joined(&self, ctx: &ConnectionContext, stream_id: &StreamId) {
        println!("[{}] Viewer joined stream {}", ctx.session_id, stream_id);
    }

    async fn on_frame(&self, _ctx: &ConnectionContext, stream_id: &StreamId, frame: &FramePayload) -> bool {
        let total = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if total % 100 == 0 {
            tracing::debug!(
                stream = %stream_id,
                frames = total,
                processed = frame.processed,
                "Frame count"
            );
        }
        true
    }

    async fn on_stream_ended(&self, stream_id: &StreamId, viewers_notified: usize) {
        println!(
            "Stream {} ended, {} viewers notified",
            stream_id, viewers_notified
        );
    }

    async fn on_disconnect(&self, ctx: &ConnectionContext) {
        println!("[{}] Disconnected", ctx.session_id);
    }
}

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8090
/// - "localhost:9001" -> 127.0.0.1:9001
/// - "127.0.0.1" -> 127.0.0.1:8090
/// - "0.0.0.0:9001" -> 0.0.0.0:9001
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8090;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: relay_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:8090)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => "0.0.0.0:8090".parse().unwrap(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_rs=debug".parse()?)
                .add_directive("relay_server=debug".parse()?),
        )
        .init();

    let config = ServerConfig {
        bind_addr,
        ..ServerConfig::default()
    };

    println!("Starting relay server on {}", config.bind_addr);
    println!();
    println!("=== Broadcast a stream ===");
    println!("ws://{}  →  {{\"type\":\"start_stream\"}}", config.bind_addr);
    println!();
    println!("=== Watch a stream ===");
    println!(
        "ws://{}  →  {{\"type\":\"join_stream\",\"streamId\":\"<id>\"}}",
        config.bind_addr
    );
    println!();

    let server = Arc::new(RelayServer::new(config, LoggingHandler::new()));

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    Ok(())
}
