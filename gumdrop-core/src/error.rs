// Error types for the Gumdrop server core

use thiserror::Error;

/// HTTP/2 error code for `PROTOCOL_ERROR` (RFC 7540 §7).
pub const H2_PROTOCOL_ERROR: u32 = 0x1;
/// HTTP/2 error code for `INTERNAL_ERROR` (RFC 7540 §7).
pub const H2_INTERNAL_ERROR: u32 = 0x2;
/// HTTP/2 error code for `FLOW_CONTROL_ERROR` (RFC 7540 §7).
pub const H2_FLOW_CONTROL_ERROR: u32 = 0x3;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}. The frame layer should reset the stream or send GOAWAY.")]
    Protocol(String),

    #[error("Flow control error: {0}")]
    FlowControl(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Scheduled executor unavailable: {0}. The ticket proceeds without a timeout.")]
    ExecutorUnavailable(String),
}

impl Error {
    /// Map this error onto the HTTP/2 error-code space for RST_STREAM/GOAWAY.
    ///
    /// `IllegalState` and `ExecutorUnavailable` are returned to local callers
    /// and never reach the wire; they map to `INTERNAL_ERROR` defensively.
    pub fn h2_error_code(&self) -> u32 {
        match self {
            Error::Protocol(_) => H2_PROTOCOL_ERROR,
            Error::FlowControl(_) => H2_FLOW_CONTROL_ERROR,
            Error::IllegalState(_) | Error::ExecutorUnavailable(_) => H2_INTERNAL_ERROR,
        }
    }

    /// Whether the frame layer must translate this error to a wire reset.
    pub fn is_stream_error(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::FlowControl(_))
    }
}

/// Result alias used across the core.
pub type Result<T> = std::result::Result<T, Error>;
