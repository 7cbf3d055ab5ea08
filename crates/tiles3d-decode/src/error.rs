//! Error types for decoding.

use thiserror::Error;

/// Result type for decode operations.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Fatal errors raised while parsing containers or packed buffers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("only composite tile version 1 is supported, got version {version}")]
    UnsupportedVersion { version: u32 },

    #[error("unknown tile content type {magic:?}")]
    UnknownContentType { magic: String },

    #[error("{what} truncated: needed {needed} bytes/slots, {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("inner tile {index} declares byte length {byte_length}, smaller than its header")]
    InvalidChildLength { index: usize, byte_length: u32 },

    #[error("invalid index width {0}, expected 2 or 4")]
    InvalidIndexWidth(f64),

    #[error("{what} of {len} does not fit in 32 bits")]
    TooLarge { what: &'static str, len: usize },

    #[error("{what} has {actual} entries, expected {expected}")]
    MismatchedLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{what} range {start}..{end} exceeds {len} entries")]
    OutOfBounds {
        what: &'static str,
        start: u64,
        end: u64,
        len: usize,
    },

    #[error("invalid count {value} for {what}")]
    InvalidCount { what: &'static str, value: f64 },

    #[error(
        "{kind} buffer of {len} values does not hold whole {stride}-value shapes for {batch_ids} batch ids"
    )]
    InvalidShapeLayout {
        kind: &'static str,
        len: usize,
        stride: usize,
        batch_ids: usize,
    },
}
