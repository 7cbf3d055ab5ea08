//! Error types for the content pipeline.

use thiserror::Error;

/// Result type for content operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by content loading and decoding.
#[derive(Debug, Error)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] tiles3d_decode::DecodeError),

    #[error("geometry worker failed: {0}")]
    Worker(String),

    #[error("geometry worker dropped the request without replying")]
    WorkerDisconnected,

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("invalid batch table: {0}")]
    InvalidBatchTable(String),

    #[error("failed to start worker thread: {0}")]
    Io(#[from] std::io::Error),
}
