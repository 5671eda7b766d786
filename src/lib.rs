//! Chat Relay Library
//!
//! A real-time text chat relay: clients connect over TCP, speak one JSON
//! object per line, join named rooms, broadcast to them and send direct
//! messages to other connected users.
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Hub` is the central actor owning every room and the client registry
//! - Each connection runs a reader task and a writer task that talk to the
//!   hub through `HubEvent`s and a bounded per-client outbound queue
//! - No locks needed - all routing state is touched by the hub alone
//!
//! # Example
//! ```ignore
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//! use chat_relay::{Config, Hub, Listener};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chat_relay::AppError> {
//!     let config = Config::load(None)?;
//!     let shutdown = CancellationToken::new();
//!     let (event_tx, event_rx) = mpsc::channel(config.event_queue_capacity);
//!
//!     tokio::spawn(Hub::new(event_rx).run(shutdown.clone()));
//!
//!     let listener = Listener::bind(
//!         config.bind_address(),
//!         event_tx,
//!         config.connection_settings(),
//!     )
//!     .await?;
//!     listener.run(shutdown).await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod hub;
pub mod listener;
pub mod message;
pub mod room;
pub mod sanitize;
pub mod types;

// Re-export main types for convenience
pub use cli::Cli;
pub use client::Client;
pub use codec::{MessageReader, MessageWriter};
pub use config::{Config, Transport};
pub use error::{AppError, SendError};
pub use handler::{handle_connection, ConnectionSettings};
pub use hub::{Hub, HubEvent};
pub use listener::Listener;
pub use message::{MessageKind, WireMessage};
pub use room::{Room, DEFAULT_ROOM};
pub use sanitize::sanitize;
pub use types::ClientId;
