//! # Error Types
//!
//! Central error type for the muxer. Every fallible operation in the crate
//! returns [`Result`], and errors surface to the caller unmodified; non-fatal
//! conditions (unsupported Opus channel mappings, a missing access-unit
//! delimiter after the first frame, `dts < pcr`) are logged instead.

use thiserror::Error;

/// Primary error type for the isdbt-mux library
#[derive(Error, Debug)]
pub enum MuxError {
    /// I/O errors raised by the byte sink
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A section or descriptor loop would overflow the 1020-byte section limit
    #[error("invalid length: {0}")]
    InvalidLength(String),

    /// Malformed caller input: missing first PTS, duplicate or out-of-range
    /// PID, an H.264/HEVC packet with no start code on the first frame
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Bitstream shape the muxer cannot packetize, e.g. AAC that is neither
    /// ADTS nor accompanied by extradata
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// A specialized Result type for muxing operations.
pub type Result<T> = std::result::Result<T, MuxError>;
