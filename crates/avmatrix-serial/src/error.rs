//! Error types for the serial client.

use avmatrix_protocol::ProtocolError;
use thiserror::Error;

use crate::client::ClientState;

/// Errors that can occur while talking to a matrix.
#[derive(Debug, Error)]
pub enum MatrixError {
    /// Invalid command, out-of-bounds argument, undecodable or unparseable
    /// response, or unknown model.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The device stopped sending before the response was complete.
    #[error(
        "timed out waiting for response to {command:?} ({lines_seen} of {expected_lines} lines, {} bytes received)",
        .partial.len()
    )]
    Timeout {
        /// The command that was sent.
        command: String,
        /// Lines the response should have had.
        expected_lines: usize,
        /// Lines received before the timeout.
        lines_seen: usize,
        /// Every byte received before the timeout.
        partial: Vec<u8>,
    },

    /// The device kept sending without completing the response.
    #[error("response to {command:?} exceeded {max} bytes")]
    ResponseTooLong {
        /// The command that was sent.
        command: String,
        /// The size limit.
        max: usize,
    },

    /// The version query did not return a usable version line.
    #[error("device identification failed: {0}")]
    IdentificationError(String),

    /// An operation was attempted before the client was ready.
    #[error("client is not ready (state: {state})")]
    NotReady {
        /// The state the client was in.
        state: ClientState,
    },

    /// I/O error on the byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl MatrixError {
    /// Bytes received before a timeout, for diagnosis.
    pub fn partial_response(&self) -> Option<&[u8]> {
        match self {
            MatrixError::Timeout { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// Whether the argument checks rejected the call before any I/O.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            MatrixError::Protocol(
                ProtocolError::InvalidArgument(_) | ProtocolError::OutOfBounds { .. }
            )
        )
    }
}

/// Result type alias for client operations.
pub type MatrixResult<T> = Result<T, MatrixError>;
