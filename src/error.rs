//! Error types for RingKV
//!
//! Provides a unified error type for ring, cluster, node and wire operations.

use thiserror::Error;

/// Result type alias using RingKvError
pub type Result<T> = std::result::Result<T, RingKvError>;

/// Unified error type for RingKV operations
#[derive(Debug, Error)]
pub enum RingKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Ring / Membership Errors
    // -------------------------------------------------------------------------
    #[error("Ring position {position} already taken (node {node})")]
    RingCollision { node: String, position: String },

    #[error("Hash ring is empty")]
    EmptyRing,

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node already registered: {0}")]
    DuplicateNode(String),

    #[error("Insufficient capacity: requested {requested} nodes, {available} available")]
    InsufficientCapacity { requested: usize, available: usize },

    // -------------------------------------------------------------------------
    // Client Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Empty value rejected")]
    EmptyValueRejected,

    #[error("Pair too large: {size} bytes (max {max})")]
    PairTooLarge { size: usize, max: usize },

    #[error("Server not responsible for key: {0}")]
    NotResponsible(String),

    #[error("Server stopped")]
    ServerStopped,

    // -------------------------------------------------------------------------
    // Migration Errors
    // -------------------------------------------------------------------------
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Migration abandoned: {0}")]
    MigrationAbandoned(String),

    // -------------------------------------------------------------------------
    // Wire / Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for RingKvError {
    fn from(e: bincode::Error) -> Self {
        RingKvError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RingKvError {
    fn from(e: serde_json::Error) -> Self {
        RingKvError::Config(e.to_string())
    }
}

impl RingKvError {
    /// True for I/O failures that just mean the peer went away
    pub fn is_disconnect(&self) -> bool {
        match self {
            RingKvError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            RingKvError::ConnectionLost(_) => true,
            _ => false,
        }
    }
}
