//! Error types for the chat relay
//!
//! Defines plumbing errors (transport, codec, configuration) and
//! outbound-queue errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Only raised by the transport and startup plumbing. Routing never
/// produces an `AppError`: misses and malformed requests are logged and dropped.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Line framing error on the outbound side
    #[error("Line codec error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    /// Configuration could not be loaded or extracted
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but holds unusable values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Channel send error (fatal - hub is gone)
    #[error("Channel send error")]
    ChannelSend,

    /// Writing one message took longer than the configured timeout
    #[error("Write timed out")]
    WriteTimeout,

    /// No inbound message within the configured idle limit
    #[error("Read timed out")]
    ReadTimeout,
}

/// Outbound queue errors
///
/// Returned by `Client::enqueue`. Neither variant is fatal to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The bounded queue is full; the message was dropped
    #[error("Outbound queue full")]
    QueueFull,
    /// The handle was closed or its writer has gone away
    #[error("Channel closed")]
    ChannelClosed,
}
