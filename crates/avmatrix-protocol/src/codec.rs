//! Line framing for the matrix serial protocol.
//!
//! Commands are sent as ASCII text followed by `\r\n`. Responses are read a
//! byte at a time until the expected number of line terminators has been
//! seen. Most responses end their lines with `\r\n`, but the version query
//! replies with `\n\r`, so the terminator is chosen per command.

use bytes::BytesMut;

use crate::error::{ProtocolError, ProtocolResult};

/// Line separator appended to every outgoing command.
pub const COMMAND_TERMINATOR: &[u8] = b"\r\n";

/// Upper bound on an accumulated response.
///
/// The longest legitimate reply is the `help` listing, well under this.
pub const MAX_RESPONSE_LENGTH: usize = 8 * 1024;

/// The two-byte sequence that ends a response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Terminator {
    /// `\r\n`, used by almost every response.
    #[default]
    Standard,
    /// `\n\r`, used by the `GET VER` response.
    Reversed,
}

impl Terminator {
    /// The terminator bytes on the wire.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Terminator::Standard => b"\r\n",
            Terminator::Reversed => b"\n\r",
        }
    }

    /// The terminator as a string slice, for splitting decoded text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Terminator::Standard => "\r\n",
            Terminator::Reversed => "\n\r",
        }
    }
}

/// Encode a command for transmission.
///
/// Appends the `\r\n` terminator. The command must be non-empty ASCII with no
/// embedded line breaks, otherwise the device would see more than one line.
pub fn encode_command(cmd: &str) -> ProtocolResult<Vec<u8>> {
    if cmd.is_empty() {
        return Err(ProtocolError::InvalidArgument(
            "cannot send an empty command".to_string(),
        ));
    }
    if !cmd.is_ascii() {
        return Err(ProtocolError::InvalidArgument(format!(
            "command {:?} is not ASCII",
            cmd
        )));
    }
    if cmd.contains(|c: char| c == '\r' || c == '\n') {
        return Err(ProtocolError::InvalidArgument(format!(
            "command {:?} contains a line break",
            cmd
        )));
    }

    let mut buf = Vec::with_capacity(cmd.len() + COMMAND_TERMINATOR.len());
    buf.extend_from_slice(cmd.as_bytes());
    buf.extend_from_slice(COMMAND_TERMINATOR);
    Ok(buf)
}

/// Decode response bytes as ASCII text with surrounding whitespace trimmed.
pub fn decode_response(data: &[u8]) -> ProtocolResult<String> {
    if let Some(offset) = data.iter().position(|b| !b.is_ascii()) {
        return Err(ProtocolError::DecodeError {
            offset,
            byte: data[offset],
        });
    }
    // All bytes are ASCII, so this cannot fail or replace anything.
    let text = String::from_utf8_lossy(data);
    Ok(text.trim().to_string())
}

/// Split a decoded response into its non-empty lines.
///
/// Lines are separated by the terminator the request was read with. Stray
/// `\r`/`\n` bytes left over from a device that mixes conventions are
/// trimmed from each line.
pub fn split_lines(text: &str, terminator: Terminator) -> Vec<&str> {
    text.split(terminator.as_str())
        .map(|line| line.trim_matches(|c: char| c == '\r' || c == '\n').trim())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Accumulates a response one byte at a time.
///
/// Each pushed byte is appended to the buffer; if the buffer then ends with
/// the terminator, one more line has been seen. A terminator can only end at
/// one byte position, so it is never counted twice.
#[derive(Debug)]
pub struct ResponseBuffer {
    /// Bytes received so far.
    buffer: BytesMut,
    /// Terminator being counted.
    terminator: Terminator,
    /// Number of terminators that completes the response.
    expected_lines: usize,
    /// Number of terminators seen so far.
    lines_seen: usize,
}

impl ResponseBuffer {
    /// Create a buffer waiting for `expected_lines` terminators.
    pub fn new(terminator: Terminator, expected_lines: usize) -> Self {
        ResponseBuffer {
            buffer: BytesMut::with_capacity(64),
            terminator,
            expected_lines,
            lines_seen: 0,
        }
    }

    /// Add a received byte.
    ///
    /// Returns `true` once the expected number of lines has been seen.
    pub fn push(&mut self, byte: u8) -> bool {
        self.buffer.extend_from_slice(&[byte]);
        if self.buffer.ends_with(self.terminator.as_bytes()) {
            self.lines_seen += 1;
        }
        self.is_complete()
    }

    /// Whether the expected number of lines has been seen.
    pub fn is_complete(&self) -> bool {
        self.lines_seen >= self.expected_lines
    }

    /// Number of terminators seen so far.
    pub fn lines_seen(&self) -> usize {
        self.lines_seen
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been received yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take the raw bytes, leaving the buffer empty.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        self.buffer.split().to_vec()
    }

    /// Decode the buffered bytes as trimmed ASCII text.
    pub fn decode(&self) -> ProtocolResult<String> {
        decode_response(&self.buffer)
    }

    /// Get the current buffer contents as a string (for debugging).
    pub fn buffer_as_str(&self) -> String {
        String::from_utf8_lossy(&self.buffer).to_string()
    }
}
