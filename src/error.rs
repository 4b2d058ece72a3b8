//! Error types for the DHT node.

use thiserror::Error;

/// Result type alias for DHT operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("malformed datagram: {0}")]
    Decode(String),

    #[error("value type not supported by set(): {0}")]
    InvalidValueType(String),

    #[error("routing table has no neighbors")]
    NoNeighbors,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("bootstrap state persistence error: {0}")]
    Persistence(String),
}
