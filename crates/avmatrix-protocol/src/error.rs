//! Error types for the matrix protocol.

use std::fmt;
use thiserror::Error;

/// Errors that can occur when building commands or interpreting responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A command or argument is malformed before any bounds are considered.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An argument falls outside the range the model supports.
    #[error("{parameter} {value} is out of bounds (valid: {valid})")]
    OutOfBounds {
        /// Which argument was rejected.
        parameter: Parameter,
        /// The offending value, as it would have appeared on the wire.
        value: String,
        /// What the model accepts for this argument.
        valid: ValidRange,
    },

    /// Response bytes are not 7-bit ASCII.
    #[error("non-ASCII byte 0x{byte:02X} at offset {offset} in response")]
    DecodeError {
        /// Offset of the first offending byte.
        offset: usize,
        /// The offending byte.
        byte: u8,
    },

    /// A response did not match any recognized shape.
    #[error("failed to parse response: {0}")]
    ParseError(String),

    /// A capability table is malformed or does not contain a model.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

/// Command arguments that are validated against a capability descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    /// HDMI output number.
    Output,
    /// HDMI input number.
    Input,
    /// Audio output identifier.
    AudioOutput,
    /// EDID parameter number.
    EdidParam,
    /// CEC power delay in minutes.
    Delay,
    /// IR system code mode.
    IrMode,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Output => write!(f, "output"),
            Parameter::Input => write!(f, "input"),
            Parameter::AudioOutput => write!(f, "audio output"),
            Parameter::EdidParam => write!(f, "EDID parameter"),
            Parameter::Delay => write!(f, "delay"),
            Parameter::IrMode => write!(f, "IR mode"),
        }
    }
}

/// The set of values a model accepts for a [`Parameter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidRange {
    /// An inclusive numeric range.
    Range {
        /// Smallest accepted value.
        min: u32,
        /// Largest accepted value.
        max: u32,
    },
    /// One of a fixed list of identifiers.
    OneOf(Vec<String>),
}

impl fmt::Display for ValidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidRange::Range { min, max } => write!(f, "{}..={}", min, max),
            ValidRange::OneOf(names) => write!(f, "one of [{}]", names.join(", ")),
        }
    }
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
