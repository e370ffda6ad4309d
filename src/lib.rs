//! Bconomy-Sync: a real-time game economy log synchronizer
//!
//! This crate keeps one socket connection to the game service, multiplexes
//! correlated requests over it, and crawls item log pages shard by shard into
//! a local SQLite store, stopping each shard at the first already-known record.

pub mod client;
pub mod config;
pub mod connection;
pub mod correlation;
pub mod crawler;
pub mod output;
pub mod protocol;
pub mod records;
pub mod storage;

use thiserror::Error;

/// Main error type for Bconomy-Sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Unexpected payload: {0}")]
    UnexpectedPayload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised while establishing or holding the socket connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Session prefetch failed: {0}")]
    Session(String),

    #[error("Handshake did not complete within {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("Connection closed before handshake: {0}")]
    ClosedBeforeHandshake(String),

    #[error("Cannot connect while {0:?}")]
    InvalidState(connection::ConnectionState),
}

/// Errors delivered to the caller of a logical request
///
/// Cloneable so that a single connection loss can reject every pending
/// request with the same cause.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Request {id} timed out after {timeout_ms}ms")]
    Timeout { id: u64, timeout_ms: u64 },

    #[error("Correlation id {0} is already pending")]
    DuplicateId(u64),

    #[error("Malformed response to request {id}: {message}")]
    MalformedResponse { id: u64, message: String },

    #[error("Failed to encode request: {0}")]
    Encode(String),
}

/// Result type alias for Bconomy-Sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for logical requests
pub type RequestResult<T> = std::result::Result<T, RequestError>;

// Re-export commonly used types
pub use client::RequestClient;
pub use config::Config;
pub use connection::{Connection, ConnectionState};
pub use correlation::CorrelationTable;
pub use protocol::{Frame, RawFrame};
