//! Arena WebSocket endpoint - Entry Point
//!
//! Starts the TCP listener and upgrades each accepted stream into a
//! `Connection` with the game's event handlers registered.

use std::env;

use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use arena_socket::{AppError, Connection, ConnectionConfig, Event, Food, UpgradeConfig};

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=arena_socket=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("arena_socket=info")),
        )
        .init();

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let upgrade_config = UpgradeConfig::from_env();
    let connection_config = ConnectionConfig::from_env();
    debug!("{:?}", upgrade_config);
    debug!("{:?}", connection_config);

    // Start TCP listener
    let listener = TcpListener::bind(&addr).await?;
    info!("Arena WebSocket endpoint listening on {}", addr);

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                info!("New connection from {}", peer_addr);
                let upgrade_config = upgrade_config.clone();
                let connection_config = connection_config.clone();

                // Spawn a task per connection so a slow handshake never blocks accept
                tokio::spawn(async move {
                    match Connection::accept(stream, &upgrade_config, connection_config).await {
                        Ok(conn) => {
                            register_handlers(&conn);
                            conn.closed().await;
                            info!("Peer {} disconnected", peer_addr);
                        }
                        Err(e) => {
                            error!("Upgrade failed for {}: {}", peer_addr, e);
                        }
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Wire the game events to this connection
fn register_handlers(conn: &Connection) {
    let id = conn.id();
    let outbox = conn.outbox().downgrade();

    conn.on("ping", move |event: &Event| {
        let Some(outbox) = outbox.upgrade() else {
            return;
        };
        if let Err(e) = outbox.try_emit("pong", &event.payload) {
            warn!("Could not answer ping from {}: {}", id, e);
        }
    })
    .on("move", move |event: &Event| {
        debug!("Client {} moved: {}", id, event.payload);
    })
    .on("eat", move |event: &Event| match event.payload_as::<Food>() {
        Ok(food) => info!("Client {} ate food {} worth {}", id, food.id, food.value),
        Err(e) => warn!("Bad food payload from {}: {}", id, e),
    })
    .on_miss(move |name: &str| {
        debug!("Client {} sent unhandled event '{}'", id, name);
    });

    // Send connection success message
    let welcome = json!({ "id": id.to_string() });
    if let Err(e) = conn.outbox().try_emit("connected", &welcome) {
        warn!("Could not greet {}: {}", id, e);
    }
}
