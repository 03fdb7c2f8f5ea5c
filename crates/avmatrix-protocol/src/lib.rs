//! AV Access HDMI Matrix RS-232 Protocol
//!
//! This crate provides types and utilities for talking to AV Access HDMI
//! matrix switchers over their RS-232 control port. The device speaks a
//! simple ASCII line protocol; this crate handles everything that does not
//! require an open port.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → device): ASCII text terminated with `\r\n`
//! - **Responses** (device → host): one or more ASCII lines, normally
//!   terminated with `\r\n`. The version query is the odd one out and ends
//!   its line with `\n\r`.
//! - **No echo**: the device does not echo the command back.
//!
//! # Command Types
//!
//! - **System commands**: `RESET`, `REBOOT`, `GET VER`, `help`
//! - **Status commands**: `GET MP out1`, `GET MUTE all`, `GET EDID in2`, ...
//! - **Control commands**: `SET SW in3 out2`, `SET MUTE audioout1 on`, ...
//!
//! Every argument is checked against the model's [`CapabilityDescriptor`]
//! before a command is allowed onto the wire.
//!
//! # Example
//!
//! ```rust,ignore
//! use avmatrix_protocol::{CapabilityTable, Command, Terminator, parse_mapping};
//!
//! let table = CapabilityTable::builtin()?;
//! let caps = table.lookup_model("4KMX42-H2A").unwrap();
//!
//! let cmd = Command::SetRoute { input: 3, output: 2 };
//! cmd.validate(caps)?;
//! assert_eq!(cmd.to_command_string(), "SET SW in3 out2");
//!
//! let mapping = parse_mapping("MP in3 out2", Terminator::Standard, caps.output_count);
//! assert_eq!(mapping.input_for(2), Some(3));
//! ```

mod codec;
mod commands;
mod error;
mod models;
mod responses;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use models::*;
pub use responses::*;
