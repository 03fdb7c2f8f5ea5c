//! Commands that can be sent to the matrix.
//!
//! The device understands three categories of commands:
//! - System commands (reset, reboot, version, help)
//! - Status queries (`GET ...`)
//! - Control commands (`SET ...`)
//!
//! Each command knows its wire form, which terminator its response uses, how
//! many response lines to wait for, and how to validate its arguments against
//! a [`CapabilityDescriptor`].

use crate::codec::{encode_command, Terminator};
use crate::error::{ProtocolError, ProtocolResult};
use crate::models::CapabilityDescriptor;
use crate::responses::Mapping;

/// Number of lines in a `GET MUTE all` reply, independent of the model.
pub const ALL_MUTE_STATUS_LINES: usize = 4;

/// Commands understood by the matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // ========== System Commands ==========
    /// Reset the device to factory settings.
    FactoryReset,

    /// Reboot the device.
    Reboot,

    /// Get the firmware version.
    GetVersion,

    /// Get the current IR system code.
    GetIrSystemCode,

    /// List the commands the firmware supports.
    Help,

    // ========== Status Commands ==========
    /// Get the input routed to an output.
    GetRoute {
        /// Output number.
        output: u32,
    },

    /// Get the input routed to every output.
    GetAllRoutes,

    /// Get the CEC auto power on/off status of an output.
    GetAutoCec {
        /// Output number.
        output: u32,
    },

    /// Get the CEC power delay of an output.
    GetCecDelay {
        /// Output number.
        output: u32,
    },

    /// Get the EDID setting of an input.
    GetInputEdid {
        /// Input number.
        input: u32,
    },

    /// Get the EDID setting of every input.
    GetAllInputEdid,

    /// Get the mute status of an audio output.
    GetMute {
        /// Audio output identifier.
        audio_output: String,
    },

    /// Get the mute status of every audio output.
    GetAllMute,

    // ========== Control Commands ==========
    /// Route an input to one output.
    SetRoute {
        /// Input number.
        input: u32,
        /// Output number.
        output: u32,
    },

    /// Route an input to every output.
    SetRouteAll {
        /// Input number.
        input: u32,
    },

    /// Switch the display on an output on or off over CEC.
    SetCecPower {
        /// Output number.
        output: u32,
        /// `true` for on.
        on: bool,
    },

    /// Enable or disable CEC auto power on an output.
    SetAutoCec {
        /// Output number.
        output: u32,
        /// `true` to enable.
        on: bool,
    },

    /// Set the CEC power delay of an output.
    SetCecDelay {
        /// Output number.
        output: u32,
        /// Delay in minutes.
        minutes: u32,
    },

    /// Select the EDID parameter set of an input.
    SetInputEdid {
        /// Input number.
        input: u32,
        /// EDID parameter number.
        param: u32,
    },

    /// Select the IR system code mode.
    SetIrSystemCode {
        /// Mode number.
        mode: u32,
    },

    /// Mute or unmute an audio output.
    SetMute {
        /// Audio output identifier.
        audio_output: String,
        /// `true` to mute.
        on: bool,
    },
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

impl Command {
    /// Encode the command as bytes to send to the device, including the
    /// `\r\n` terminator.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_command(&self.to_command_string())
    }

    /// Get the command string without the terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            // System
            Command::FactoryReset => "RESET".to_string(),
            Command::Reboot => "REBOOT".to_string(),
            Command::GetVersion => "GET VER".to_string(),
            Command::GetIrSystemCode => "GET IR_SC".to_string(),
            Command::Help => "help".to_string(),

            // Status
            Command::GetRoute { output } => format!("GET MP out{}", output),
            Command::GetAllRoutes => "GET MP all".to_string(),
            Command::GetAutoCec { output } => format!("GET AUTOCEC_FN out{}", output),
            Command::GetCecDelay { output } => format!("GET AUTOCEC_D out{}", output),
            Command::GetInputEdid { input } => format!("GET EDID in{}", input),
            Command::GetAllInputEdid => "GET EDID all".to_string(),
            Command::GetMute { audio_output } => format!("GET MUTE {}", audio_output),
            Command::GetAllMute => "GET MUTE all".to_string(),

            // Control
            Command::SetRoute { input, output } => format!("SET SW in{} out{}", input, output),
            Command::SetRouteAll { input } => format!("SET SW in{} all", input),
            Command::SetCecPower { output, on } => {
                format!("SET CEC_PWR out{} {}", output, on_off(*on))
            }
            Command::SetAutoCec { output, on } => {
                format!("SET AUTOCEC_FN out{} {}", output, on_off(*on))
            }
            Command::SetCecDelay { output, minutes } => {
                format!("SET AUTOCEC_D out{} {}", output, minutes)
            }
            Command::SetInputEdid { input, param } => format!("SET EDID in{} {}", input, param),
            Command::SetIrSystemCode { mode } => format!("SET IR_SC mode{}", mode),
            Command::SetMute { audio_output, on } => {
                format!("SET MUTE {} {}", audio_output, on_off(*on))
            }
        }
    }

    /// The terminator the device ends response lines with.
    pub fn terminator(&self) -> Terminator {
        match self {
            Command::GetVersion => Terminator::Reversed,
            _ => Terminator::Standard,
        }
    }

    /// Number of response lines to wait for.
    pub fn expected_lines(&self, caps: &CapabilityDescriptor) -> usize {
        match self {
            Command::Help => caps.help_line_count as usize,
            Command::GetAllRoutes => caps.output_count as usize,
            Command::GetAllInputEdid => caps.input_count as usize,
            Command::GetAllMute => ALL_MUTE_STATUS_LINES,
            _ => 1,
        }
    }

    /// Check every argument against the model's capabilities.
    pub fn validate(&self, caps: &CapabilityDescriptor) -> ProtocolResult<()> {
        match self {
            Command::FactoryReset
            | Command::Reboot
            | Command::GetVersion
            | Command::GetIrSystemCode
            | Command::Help
            | Command::GetAllRoutes
            | Command::GetAllInputEdid
            | Command::GetAllMute => Ok(()),

            Command::GetRoute { output }
            | Command::GetAutoCec { output }
            | Command::GetCecDelay { output }
            | Command::SetCecPower { output, .. }
            | Command::SetAutoCec { output, .. } => caps.check_output(*output),

            Command::GetInputEdid { input } | Command::SetRouteAll { input } => {
                caps.check_input(*input)
            }

            Command::GetMute { audio_output } | Command::SetMute { audio_output, .. } => {
                caps.check_audio_output(audio_output)
            }

            Command::SetRoute { input, output } => {
                caps.check_output(*output)?;
                caps.check_input(*input)
            }
            Command::SetCecDelay { output, minutes } => {
                caps.check_output(*output)?;
                caps.check_delay(*minutes)
            }
            Command::SetInputEdid { input, param } => {
                caps.check_input(*input)?;
                caps.check_edid_param(*param)
            }
            Command::SetIrSystemCode { mode } => caps.check_ir_mode(*mode),
        }
    }

    /// The single output a routing command asks about or changes.
    ///
    /// `None` for commands that cover every output and for commands that do
    /// not return a routing table.
    pub fn routed_output(&self) -> Option<u32> {
        match self {
            Command::GetRoute { output } | Command::SetRoute { output, .. } => Some(*output),
            _ => None,
        }
    }

    /// Check a parsed routing reply against the model and the request.
    ///
    /// Every entry must name an output and an input the model has, and a
    /// reply to a single-output command must cover that output.
    pub fn check_mapping(&self, mapping: &Mapping, caps: &CapabilityDescriptor) -> ProtocolResult<()> {
        for (output, input) in mapping.iter() {
            caps.check_output(output)
                .and_then(|_| caps.check_input(input))
                .map_err(|e| {
                    ProtocolError::ParseError(format!(
                        "routing reply for '{}': {}",
                        self.to_command_string(),
                        e
                    ))
                })?;
        }
        if let Some(output) = self.routed_output() {
            if mapping.input_for(output).is_none() {
                return Err(ProtocolError::ParseError(format!(
                    "routing reply for '{}' does not mention output {}",
                    self.to_command_string(),
                    output
                )));
            }
        }
        Ok(())
    }
}
