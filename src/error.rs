//! Error types for zwave-controller.

use thiserror::Error;

use crate::protocol::FunctionId;

/// Main error type for all controller operations.
#[derive(Debug, Error)]
pub enum ZWaveError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading a class catalog or configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Serial port could not be opened or configured.
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Protocol error (unknown header byte, bad length byte, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Payload does not fit in a single data frame.
    #[error("Payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    /// A solicited response was too short or otherwise unusable.
    #[error("Malformed {function} response: {reason}")]
    MalformedResponse {
        /// Function code of the request.
        function: FunctionId,
        /// What was wrong with it.
        reason: String,
    },

    /// Node id is not present in the node table.
    #[error("Unknown node: {0}")]
    UnknownNode(u8),

    /// The caller's cancellation token fired.
    #[error("Request cancelled")]
    Cancelled,

    /// Retries were exhausted and the hard timeout elapsed.
    #[error("Request timed out")]
    TimedOut,

    /// The transport closed while a request or wait was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl ZWaveError {
    /// True for both external cancellation and internal timeout.
    ///
    /// Callers that only care whether an operation was abandoned should use
    /// this instead of matching on the two variants.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ZWaveError::Cancelled | ZWaveError::TimedOut)
    }

    pub(crate) fn malformed(function: FunctionId, reason: impl Into<String>) -> Self {
        ZWaveError::MalformedResponse {
            function,
            reason: reason.into(),
        }
    }
}

/// Result type alias using ZWaveError.
pub type Result<T> = std::result::Result<T, ZWaveError>;
