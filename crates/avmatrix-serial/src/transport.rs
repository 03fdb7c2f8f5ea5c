//! Request/response framing over a byte stream.
//!
//! One exchange is: discard anything left in the stream buffers, send the
//! command with a `\r\n` terminator, then read a byte at a time until the
//! response terminator has been seen the expected number of times. A read
//! that comes back empty means the device went quiet, and the exchange fails
//! with [`MatrixError::Timeout`] carrying whatever had arrived.
//!
//! The transport is not reentrant. Two exchanges on the same stream would
//! interleave their bytes, so callers must serialize access; [`HdmiMatrix`]
//! does this with a lock.
//!
//! [`HdmiMatrix`]: crate::HdmiMatrix

use avmatrix_protocol::{encode_command, ProtocolError, ResponseBuffer, Terminator, MAX_RESPONSE_LENGTH};
use tracing::{debug, trace, warn};

use crate::error::{MatrixError, MatrixResult};
use crate::stream::ByteStream;

/// Framed command/response exchanges over a [`ByteStream`].
#[derive(Debug)]
pub struct Transport<S: ByteStream> {
    stream: S,
}

impl<S: ByteStream> Transport<S> {
    /// Wrap an open stream.
    pub fn new(stream: S) -> Self {
        Transport { stream }
    }

    /// Send `command` and return the trimmed response text.
    ///
    /// Reading stops once `terminator` has ended a line `expected_lines`
    /// times. Fails without touching the stream if the command is empty or
    /// not a single ASCII line, or if `expected_lines` is zero.
    pub fn exchange(
        &mut self,
        command: &str,
        terminator: Terminator,
        expected_lines: usize,
    ) -> MatrixResult<String> {
        let encoded = encode_command(command)?;
        if expected_lines == 0 {
            return Err(ProtocolError::InvalidArgument(
                "a response must have at least one line".to_string(),
            )
            .into());
        }

        trace!("Clearing buffers...");
        self.stream.clear_output()?;
        self.stream.clear_input()?;

        debug!(command, "Sending");
        self.stream.write_all(&encoded)?;
        self.stream.flush()?;

        let mut response = ResponseBuffer::new(terminator, expected_lines);
        let mut byte = [0u8; 1];
        loop {
            if self.stream.read(&mut byte)? == 0 {
                let received = response.buffer_as_str();
                warn!(
                    command,
                    lines_seen = response.lines_seen(),
                    expected_lines,
                    received = %received.escape_debug(),
                    "Connection timed out"
                );
                return Err(MatrixError::Timeout {
                    command: command.to_string(),
                    expected_lines,
                    lines_seen: response.lines_seen(),
                    partial: response.take_bytes(),
                });
            }

            if response.push(byte[0]) {
                break;
            }

            if response.len() >= MAX_RESPONSE_LENGTH {
                return Err(MatrixError::ResponseTooLong {
                    command: command.to_string(),
                    max: MAX_RESPONSE_LENGTH,
                });
            }
        }

        let text = response.decode()?;
        debug!(command, response = %text.escape_debug(), "Received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ScriptedStream;

    fn transport() -> (Transport<ScriptedStream>, ScriptedStream) {
        let stream = ScriptedStream::new();
        (Transport::new(stream.clone()), stream)
    }

    #[test]
    fn test_exchange_single_line() {
        let (mut transport, stream) = transport();
        stream.push_reply(b"MP in3 out2\r\n");

        let text = transport.exchange("SET SW in3 out2", Terminator::Standard, 1).unwrap();
        assert_eq!(text, "MP in3 out2");
        assert_eq!(stream.sent(), b"SET SW in3 out2\r\n");
    }

    #[test]
    fn test_exchange_reversed_terminator() {
        let (mut transport, stream) = transport();
        stream.push_reply(b"VER 1.0.2\n\r");

        let text = transport.exchange("GET VER", Terminator::Reversed, 1).unwrap();
        assert_eq!(text, "VER 1.0.2");
    }

    #[test]
    fn test_exchange_stops_after_expected_lines() {
        let (mut transport, stream) = transport();
        stream.push_reply(b"MP in1 out1\r\nMP in4 out2\r\nleftover");

        let text = transport.exchange("GET MP all", Terminator::Standard, 2).unwrap();
        assert_eq!(text, "MP in1 out1\r\nMP in4 out2");
    }

    #[test]
    fn test_exchange_empty_command() {
        let (mut transport, stream) = transport();
        let err = transport.exchange("", Terminator::Standard, 1).unwrap_err();
        assert!(matches!(
            err,
            MatrixError::Protocol(ProtocolError::InvalidArgument(_))
        ));
        assert_eq!(stream.operations(), 0);
    }

    #[test]
    fn test_exchange_zero_lines() {
        let (mut transport, stream) = transport();
        let err = transport.exchange("help", Terminator::Standard, 0).unwrap_err();
        assert!(err.is_validation_error());
        assert_eq!(stream.operations(), 0);
    }

    #[test]
    fn test_exchange_timeout_keeps_partial() {
        let (mut transport, stream) = transport();
        stream.push_reply(b"MP in3 ou");

        let err = transport.exchange("GET MP out2", Terminator::Standard, 1).unwrap_err();
        match err {
            MatrixError::Timeout { partial, lines_seen, expected_lines, .. } => {
                assert_eq!(partial, b"MP in3 ou");
                assert_eq!(lines_seen, 0);
                assert_eq!(expected_lines, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_exchange_timeout_after_some_lines() {
        let (mut transport, stream) = transport();
        stream.push_reply(b"MP in1 out1\r\n");

        let err = transport.exchange("GET MP all", Terminator::Standard, 2).unwrap_err();
        assert_eq!(err.partial_response(), Some(&b"MP in1 out1\r\n"[..]));
    }

    #[test]
    fn test_exchange_timeout_on_silence() {
        let (mut transport, _stream) = transport();
        let err = transport.exchange("GET IR_SC", Terminator::Standard, 1).unwrap_err();
        assert_eq!(err.partial_response(), Some(&b""[..]));
    }

    #[test]
    fn test_exchange_discards_stale_input() {
        let (mut transport, stream) = transport();
        stream.push_stale_input(b"MP in1 out1\r\n");
        stream.push_reply(b"MP in2 out1\r\n");

        let text = transport.exchange("GET MP out1", Terminator::Standard, 1).unwrap();
        assert_eq!(text, "MP in2 out1");
    }

    #[test]
    fn test_exchange_drops_unsent_output() {
        let (mut transport, stream) = transport();
        let mut handle = stream.clone();
        handle.write_all(b"SET SW in").unwrap();
        stream.push_reply(b"MP in2 out1\r\n");

        let text = transport.exchange("GET MP out1", Terminator::Standard, 1).unwrap();
        assert_eq!(text, "MP in2 out1");
        assert_eq!(stream.sent(), b"GET MP out1\r\n");
        assert_eq!(stream.sent_commands(), vec!["GET MP out1"]);
    }

    #[test]
    fn test_exchange_non_ascii() {
        let (mut transport, stream) = transport();
        stream.push_reply(b"MP in\xE92 out1\r\n");

        let err = transport.exchange("GET MP out1", Terminator::Standard, 1).unwrap_err();
        assert!(matches!(
            err,
            MatrixError::Protocol(ProtocolError::DecodeError { byte: 0xE9, .. })
        ));
    }

    #[test]
    fn test_exchange_response_too_long() {
        let (mut transport, stream) = transport();
        stream.push_reply(vec![b'x'; MAX_RESPONSE_LENGTH + 10]);

        let err = transport.exchange("help", Terminator::Standard, 1).unwrap_err();
        assert!(matches!(err, MatrixError::ResponseTooLong { .. }));
    }
}
