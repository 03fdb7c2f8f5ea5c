//! Byte streams the transport can run over.
//!
//! [`ByteStream`] is the minimal set of operations the framing needs: write,
//! flush, a read that gives up after the link timeout, and discarding of
//! buffered data in either direction. [`SerialStream`] implements it over a
//! real RS-232 port; [`ScriptedStream`] plays back canned device replies and
//! records what was sent, for tests and for running without hardware.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::error::MatrixResult;

/// Default baud rate of the matrix control port.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default read and write timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// A bidirectional byte stream with bounded blocking reads.
pub trait ByteStream: Send {
    /// Write all of `data`.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Push any buffered output onto the wire.
    fn flush(&mut self) -> io::Result<()>;

    /// Read up to `buf.len()` bytes.
    ///
    /// Blocks for at most the stream's timeout and returns `Ok(0)` if nothing
    /// arrived in that time.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discard received bytes that have not been read.
    fn clear_input(&mut self) -> io::Result<()>;

    /// Discard written bytes that have not been sent.
    fn clear_output(&mut self) -> io::Result<()>;
}

// ============================================================================
// Serial Port
// ============================================================================

/// Serial link parameters. Framing is always 8N1 without flow control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Baud rate.
    pub baud_rate: u32,
    /// Read and write timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        LinkSettings {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl LinkSettings {
    /// The read and write timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A [`ByteStream`] over an RS-232 port.
pub struct SerialStream {
    port: Box<dyn SerialPort>,
}

impl SerialStream {
    /// Open and configure the port at `path` (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn open(path: &str, settings: &LinkSettings) -> MatrixResult<Self> {
        debug!(
            path,
            baud_rate = settings.baud_rate,
            timeout_secs = settings.timeout_secs,
            "Opening serial port"
        );
        let port = serialport::new(path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.timeout())
            .open()?;
        Ok(SerialStream { port })
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("port", &self.port.name())
            .finish()
    }
}

impl ByteStream for SerialStream {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.port)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match Read::read(&mut self.port, buf) {
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn clear_output(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Output).map_err(io::Error::from)
    }
}

// ============================================================================
// Scripted Stream
// ============================================================================

/// A [`ByteStream`] that replays queued device replies.
///
/// Each flush releases the next queued reply into the receive buffer. A read
/// with nothing buffered returns `Ok(0)` immediately, so a reply without its
/// terminator behaves like a device that went quiet. Clones share state, so
/// a test can keep a handle after moving the stream into a client.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStream {
    state: Arc<Mutex<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    /// Replies waiting for a command.
    replies: VecDeque<Vec<u8>>,
    /// Bytes available to read.
    rx: VecDeque<u8>,
    /// Bytes written but not flushed.
    tx_pending: Vec<u8>,
    /// Every flushed byte.
    tx: Vec<u8>,
    /// Number of stream operations performed.
    operations: usize,
}

impl ScriptedStream {
    /// Create a stream with no replies queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the reply to the next command.
    pub fn push_reply(&self, reply: impl AsRef<[u8]>) {
        self.state.lock().replies.push_back(reply.as_ref().to_vec());
    }

    /// Make bytes readable right away, as if left over from an earlier
    /// exchange.
    pub fn push_stale_input(&self, data: impl AsRef<[u8]>) {
        self.state.lock().rx.extend(data.as_ref());
    }

    /// Every byte sent so far.
    pub fn sent(&self) -> Vec<u8> {
        self.state.lock().tx.clone()
    }

    /// Commands sent so far, without their `\r\n` terminators.
    pub fn sent_commands(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.sent())
            .split_terminator("\r\n")
            .map(str::to_string)
            .collect()
    }

    /// Number of stream operations performed, of any kind.
    pub fn operations(&self) -> usize {
        self.state.lock().operations
    }

    /// Number of queued replies not yet released.
    pub fn replies_remaining(&self) -> usize {
        self.state.lock().replies.len()
    }
}

impl ByteStream for ScriptedStream {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        state.operations += 1;
        state.tx_pending.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.operations += 1;
        if state.tx_pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut state.tx_pending);
        state.tx.extend_from_slice(&pending);
        if let Some(reply) = state.replies.pop_front() {
            state.rx.extend(reply);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.operations += 1;
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.operations += 1;
        state.rx.clear();
        Ok(())
    }

    fn clear_output(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.operations += 1;
        state.tx_pending.clear();
        Ok(())
    }
}
