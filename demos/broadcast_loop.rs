//! Broadcaster + viewer clients against a local relay
//!
//! Run with: cargo run --example broadcast_loop
//!
//! Starts a relay on an ephemeral port, announces a stream, pushes synthetic
//! frames through the adaptive pacer, and prints what the viewer receives.
//! Ctrl+C to stop.

use std::time::Duration;

use tokio::net::TcpListener;

use relay_rs::client::{BroadcastEvent, BroadcasterClient, ClientConfig, ViewerClient, ViewerEvent};
use relay_rs::protocol::FramePayload;
use relay_rs::{DefaultRelayHandler, RelayServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_rs=info".parse()?),
        )
        .init();

    // Relay on an ephemeral port
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = RelayServer::new(ServerConfig::default(), DefaultRelayHandler);
    tokio::spawn(async move {
        let _ = server.run_on(listener).await;
    });
    let url = format!("ws://{addr}");
    println!("Relay listening on {url}");

    // Broadcaster: fast pacing so the demo is lively
    let (broadcaster, mut broadcast_events) = BroadcasterClient::connect(
        ClientConfig::new(url.as_str()).pacing(5, Duration::from_millis(50), Duration::from_millis(50)),
    );

    let stream_id = loop {
        match broadcast_events.recv().await {
            Some(BroadcastEvent::StreamCreated(id)) => break id,
            Some(BroadcastEvent::Connected) => println!("Broadcaster connected"),
            Some(other) => println!("Broadcaster event: {other:?}"),
            None => return Ok(()),
        }
    };
    println!("Broadcasting on stream {stream_id}");

    // Viewer on the same stream
    let (viewer, mut viewer_events) =
        ViewerClient::connect(ClientConfig::new(url.as_str()), stream_id);
    tokio::spawn(async move {
        while let Some(event) = viewer_events.recv().await {
            match event {
                ViewerEvent::Joined(id) => println!("Viewer joined {id}"),
                ViewerEvent::Frame(frame) => {
                    println!(
                        "Viewer got frame: {} bytes, ts={:?}",
                        frame.frame.len(),
                        frame.timestamp
                    );
                }
                ViewerEvent::StyleUpdated(prompt) => println!("Style prompt now: {prompt}"),
                ViewerEvent::StreamEnded(id) => {
                    println!("Stream {id} ended");
                    break;
                }
                other => println!("Viewer event: {other:?}"),
            }
        }
    });

    broadcaster.update_prompt("a painting in the style of Starry Night")?;

    let mut counter = 0u64;
    loop {
        tokio::select! {
            result = broadcaster.send_frame(FramePayload::new(format!(
                "data:image/jpeg;base64,SYNTHETIC{counter:08}"
            ))) => {
                result?;
                counter += 1;
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                broadcaster.close();
                viewer.close();
                return Ok(());
            }
        }
    }
}
