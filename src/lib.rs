//! Per-connection WebSocket Event Endpoint
//!
//! Connectivity layer for a real-time arena game built with
//! tokio-tungstenite. Each accepted stream becomes a [`Connection`] that
//! decodes inbound JSON envelopes into [`Event`]s and dispatches them to
//! handlers registered by event name.
//!
//! # Features
//! - WebSocket upgrade with buffer sizes and origin policy
//! - `{"name": ..., "payload": ...}` event envelopes
//! - Chainable handler registration (last registration wins)
//! - Bounded outbound queue with FIFO delivery
//! - Graceful close handshake and hard shutdown
//! - Optional read/write deadlines
//! - Per-connection counters, including unhandled events
//!
//! # Architecture
//! Every connection runs two tokio tasks plus a small supervisor:
//! - the reader task decodes frames and invokes handlers in arrival order
//! - the writer task drains the outbound `mpsc` queue
//! - both observe shared cancellation tokens, so closing from either side
//!   ends the connection without a direct channel between the tasks
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use arena_socket::{Connection, ConnectionConfig, Event, UpgradeConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let upgrade_config = UpgradeConfig::default();
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let conn = Connection::accept(stream, &upgrade_config, ConnectionConfig::default())
//!             .await
//!             .unwrap();
//!         conn.on("move", |event: &Event| println!("move: {}", event.payload))
//!             .on("eat", |event: &Event| println!("eat: {}", event.payload));
//!     }
//! }
//! ```

pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod event;
pub mod handlers;
pub mod outbox;
pub mod stats;
pub mod types;
pub mod upgrade;

// Re-export main types for convenience
pub use config::{ConnectionConfig, OriginPolicy, UpgradeConfig};
pub use connection::Connection;
pub use entity::{Cell, Food};
pub use error::{AppError, DecodeError, SendError, StreamError, UpgradeError};
pub use event::Event;
pub use handlers::{DispatchOutcome, EventHandler, HandlerTable, MissHook};
pub use outbox::{Outbox, WeakOutbox};
pub use stats::StatsSnapshot;
pub use types::ConnectionId;
