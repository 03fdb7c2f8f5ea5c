//! Serial client for AV Access HDMI matrix switchers.
//!
//! This crate drives a matrix over its RS-232 control port using the protocol
//! types from [`avmatrix_protocol`]. It is layered as:
//!
//! - [`ByteStream`]: the port primitives (write, flush, bounded read, buffer
//!   clearing), implemented by [`SerialStream`] for real hardware and by
//!   [`ScriptedStream`] for tests.
//! - [`Transport`]: one framed request/response exchange at a time.
//! - [`HdmiMatrix`]: typed operations with argument checks and response
//!   parsing.
//!
//! Link parameters default to 115200 baud, 8N1, with a 10 second read and
//! write timeout.
//!
//! # Example
//!
//! ```rust,ignore
//! use avmatrix_protocol::CapabilityTable;
//! use avmatrix_serial::{HdmiMatrix, LinkSettings};
//!
//! let table = CapabilityTable::builtin()?;
//! let matrix = HdmiMatrix::connect("/dev/ttyUSB0", "4KMX42-H2A", &table, &LinkSettings::default())?;
//!
//! let mapping = matrix.set_route(3, 2)?;
//! assert_eq!(mapping.input_for(2), Some(3));
//! ```

mod client;
mod error;
mod stream;
mod transport;

pub use client::*;
pub use error::*;
pub use stream::*;
pub use transport::*;
