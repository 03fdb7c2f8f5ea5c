//! Client for AV Access HDMI matrix switchers.
//!
//! [`HdmiMatrix`] turns operations like "route input 3 to output 2" into
//! protocol commands, checks their arguments against the model's
//! [`CapabilityDescriptor`] before anything is sent, and parses the replies.
//!
//! A client can be set up two ways:
//!
//! 1. **Versioned**: open the port, query `GET VER`, then look up the reported
//!    firmware version and the model name in a [`CapabilityTable`]
//!    ([`HdmiMatrix::connect`]).
//! 2. **Legacy**: look the model up by name alone and skip the version query
//!    ([`HdmiMatrix::open`]).
//!
//! All operations take `&self`. Exchanges on the underlying port are
//! serialized with a mutex, so a client can be shared between threads.

use std::fmt;

use avmatrix_protocol::{
    parse_switch_state, require_mapping, CapabilityDescriptor, CapabilityTable, Command,
    FirmwareVersion, Mapping, Terminator,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{MatrixError, MatrixResult};
use crate::stream::{ByteStream, LinkSettings, SerialStream};
use crate::transport::Transport;

// ============================================================================
// Client State
// ============================================================================

/// Lifecycle of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// The port has been closed.
    Disconnected,
    /// The port is open but the device has not been identified.
    Connected,
    /// The device reported its firmware version.
    Identified,
    /// A capability descriptor has been resolved; every operation is allowed.
    Ready,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientState::Disconnected => write!(f, "disconnected"),
            ClientState::Connected => write!(f, "connected"),
            ClientState::Identified => write!(f, "identified"),
            ClientState::Ready => write!(f, "ready"),
        }
    }
}

// ============================================================================
// HDMI Matrix Client
// ============================================================================

/// A connection to one HDMI matrix.
pub struct HdmiMatrix<S: ByteStream = SerialStream> {
    /// `None` once disconnected.
    transport: Mutex<Option<Transport<S>>>,
    state: ClientState,
    version: Option<FirmwareVersion>,
    caps: Option<CapabilityDescriptor>,
}

impl HdmiMatrix<SerialStream> {
    /// Open a serial port and identify the device by firmware version and
    /// model name.
    pub fn connect(
        path: &str,
        model: &str,
        table: &CapabilityTable,
        settings: &LinkSettings,
    ) -> MatrixResult<Self> {
        let mut matrix = HdmiMatrix::new(SerialStream::open(path, settings)?);
        matrix.identify(model, table)?;
        Ok(matrix)
    }

    /// Open a serial port for a model looked up by name, without querying
    /// the device.
    pub fn open(
        path: &str,
        model: &str,
        table: &CapabilityTable,
        settings: &LinkSettings,
    ) -> MatrixResult<Self> {
        let caps = table.lookup_model(model)?.clone();
        Ok(HdmiMatrix::with_descriptor(
            SerialStream::open(path, settings)?,
            caps,
        ))
    }
}

impl<S: ByteStream> HdmiMatrix<S> {
    /// Wrap an open stream. The client must be identified before use.
    pub fn new(stream: S) -> Self {
        HdmiMatrix {
            transport: Mutex::new(Some(Transport::new(stream))),
            state: ClientState::Connected,
            version: None,
            caps: None,
        }
    }

    /// Wrap an open stream for a known model. The client is ready at once.
    pub fn with_descriptor(stream: S, caps: CapabilityDescriptor) -> Self {
        debug!(model = %caps.model, "Creating HDMI matrix");
        HdmiMatrix {
            transport: Mutex::new(Some(Transport::new(stream))),
            state: ClientState::Ready,
            version: None,
            caps: Some(caps),
        }
    }

    /// Query the firmware version and resolve the capability descriptor.
    ///
    /// On failure the client is left `Connected` (no usable version) or
    /// `Identified` (version or model not in the table), and every operation
    /// other than the version query is refused.
    pub fn identify(
        &mut self,
        model: &str,
        table: &CapabilityTable,
    ) -> MatrixResult<&CapabilityDescriptor> {
        if self.state == ClientState::Disconnected {
            return Err(MatrixError::NotReady { state: self.state });
        }
        self.state = ClientState::Connected;
        self.version = None;
        self.caps = None;

        let raw = self.firmware_version()?;
        let version = FirmwareVersion::parse(&raw).map_err(|e| {
            warn!(response = %raw, "Unusable version response");
            MatrixError::IdentificationError(e.to_string())
        })?;
        debug!(version = %version, "Device identified");
        let version = self.version.insert(version);
        self.state = ClientState::Identified;

        let caps = table.lookup(&version.version, model)?.clone();
        info!(model = %caps.model, version = %version, "Matrix ready");
        self.state = ClientState::Ready;
        Ok(self.caps.insert(caps))
    }

    /// Close the port. Every later operation fails with
    /// [`MatrixError::NotReady`].
    pub fn disconnect(&mut self) {
        if self.transport.get_mut().take().is_some() {
            debug!("Disconnected");
        }
        self.state = ClientState::Disconnected;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The resolved capability descriptor, once ready.
    pub fn descriptor(&self) -> Option<&CapabilityDescriptor> {
        self.caps.as_ref()
    }

    /// The firmware version found during identification.
    pub fn version(&self) -> Option<&FirmwareVersion> {
        self.version.as_ref()
    }

    fn ready_caps(&self) -> MatrixResult<&CapabilityDescriptor> {
        match (&self.state, &self.caps) {
            (ClientState::Ready, Some(caps)) => Ok(caps),
            _ => Err(MatrixError::NotReady { state: self.state }),
        }
    }

    /// Run one exchange while holding the port lock.
    fn exchange(&self, command: &str, terminator: Terminator, lines: usize) -> MatrixResult<String> {
        let mut guard = self.transport.lock();
        let transport = guard.as_mut().ok_or(MatrixError::NotReady {
            state: ClientState::Disconnected,
        })?;
        transport.exchange(command, terminator, lines)
    }

    /// Validate and send a command, returning the raw reply.
    fn execute(&self, command: &Command) -> MatrixResult<String> {
        let caps = self.ready_caps()?;
        command.validate(caps)?;
        let output = self.exchange(
            &command.to_command_string(),
            command.terminator(),
            command.expected_lines(caps),
        )?;
        debug!("Device output: {}", output);
        Ok(output)
    }

    /// Validate and send a routing command, returning the parsed mapping.
    ///
    /// Replies naming outputs or inputs the model does not have, or missing
    /// the requested output, are parse errors.
    fn execute_mapping(&self, command: &Command) -> MatrixResult<Mapping> {
        let output = self.execute(command)?;
        let caps = self.ready_caps()?;
        let mapping = require_mapping(&output, command.terminator(), caps.output_count)?;
        command.check_mapping(&mapping, caps)?;
        Ok(mapping)
    }

    /// Send a free-form command.
    ///
    /// No argument checks are possible; the command only has to be a
    /// non-empty ASCII line.
    pub fn raw(&self, command: &str, terminator: Terminator, lines: usize) -> MatrixResult<String> {
        self.ready_caps()?;
        self.exchange(command, terminator, lines)
    }

    // ========== System ==========

    /// Reset the device to factory settings.
    pub fn factory_reset(&self) -> MatrixResult<String> {
        debug!("Resetting device to factory settings...");
        self.execute(&Command::FactoryReset)
    }

    /// Reboot the device.
    pub fn reboot(&self) -> MatrixResult<String> {
        debug!("Rebooting device...");
        self.execute(&Command::Reboot)
    }

    /// Current firmware version line, e.g. `VER 1.0.2`.
    ///
    /// Allowed in any connected state, since identification relies on it.
    pub fn firmware_version(&self) -> MatrixResult<String> {
        if self.state == ClientState::Disconnected {
            return Err(MatrixError::NotReady { state: self.state });
        }
        debug!("Getting firmware version...");
        let command = Command::GetVersion;
        self.exchange(&command.to_command_string(), command.terminator(), 1)
    }

    /// Current IR system code.
    pub fn ir_system_code(&self) -> MatrixResult<String> {
        debug!("Getting IR system code...");
        self.execute(&Command::GetIrSystemCode)
    }

    /// The firmware's command listing.
    pub fn help(&self) -> MatrixResult<String> {
        debug!("Getting available commands...");
        self.execute(&Command::Help)
    }

    // ========== Status ==========

    /// The input currently routed to `output`.
    pub fn route(&self, output: u32) -> MatrixResult<Mapping> {
        debug!("Getting mapping for output {}...", output);
        self.execute_mapping(&Command::GetRoute { output })
    }

    /// The input currently routed to every output.
    pub fn routes(&self) -> MatrixResult<Mapping> {
        debug!("Getting mappings for all outputs...");
        self.execute_mapping(&Command::GetAllRoutes)
    }

    /// CEC auto power on/off status of `output`.
    pub fn auto_cec_status(&self, output: u32) -> MatrixResult<String> {
        debug!("Getting Auto CEC status for output {}...", output);
        self.execute(&Command::GetAutoCec { output })
    }

    /// Whether CEC auto power is enabled on `output`.
    pub fn auto_cec_enabled(&self, output: u32) -> MatrixResult<bool> {
        Ok(parse_switch_state(&self.auto_cec_status(output)?)?)
    }

    /// CEC power delay of `output`.
    pub fn cec_delay(&self, output: u32) -> MatrixResult<String> {
        debug!("Getting CEC delay for output {}...", output);
        self.execute(&Command::GetCecDelay { output })
    }

    /// EDID setting of `input`.
    pub fn input_edid(&self, input: u32) -> MatrixResult<String> {
        debug!("Getting EDID status for input {}...", input);
        self.execute(&Command::GetInputEdid { input })
    }

    /// EDID setting of every input, one line each.
    pub fn all_input_edid(&self) -> MatrixResult<String> {
        debug!("Getting EDID status for all inputs...");
        self.execute(&Command::GetAllInputEdid)
    }

    /// Mute status of an audio output.
    pub fn mute_status(&self, audio_output: &str) -> MatrixResult<String> {
        debug!("Getting mute status for {}...", audio_output);
        self.execute(&Command::GetMute {
            audio_output: audio_output.to_string(),
        })
    }

    /// Whether an audio output is muted.
    pub fn is_muted(&self, audio_output: &str) -> MatrixResult<bool> {
        Ok(parse_switch_state(&self.mute_status(audio_output)?)?)
    }

    /// Mute status of every audio output, one line each.
    pub fn all_mute_status(&self) -> MatrixResult<String> {
        debug!("Getting mute status for all audio outputs...");
        self.execute(&Command::GetAllMute)
    }

    // ========== Control ==========

    /// Route `input` to `output`, returning the device's confirmation.
    pub fn set_route(&self, input: u32, output: u32) -> MatrixResult<Mapping> {
        debug!("Mapping input {} to output {}...", input, output);
        self.execute_mapping(&Command::SetRoute { input, output })
    }

    /// Route `input` to every output.
    pub fn set_route_all(&self, input: u32) -> MatrixResult<Mapping> {
        debug!("Mapping input {} to all outputs...", input);
        self.execute_mapping(&Command::SetRouteAll { input })
    }

    /// Switch the display on `output` on or off over CEC.
    pub fn set_cec_power(&self, output: u32, on: bool) -> MatrixResult<String> {
        debug!("Setting CEC power for output {} to {}...", output, on);
        self.execute(&Command::SetCecPower { output, on })
    }

    /// Enable or disable CEC auto power on `output`.
    pub fn set_auto_cec(&self, output: u32, on: bool) -> MatrixResult<String> {
        debug!("Setting CEC auto power for output {} to {}...", output, on);
        self.execute(&Command::SetAutoCec { output, on })
    }

    /// Set the CEC power delay of `output`, in minutes.
    pub fn set_cec_delay(&self, output: u32, minutes: u32) -> MatrixResult<String> {
        debug!("Setting CEC delay for output {} to {}...", output, minutes);
        self.execute(&Command::SetCecDelay { output, minutes })
    }

    /// Select the EDID parameter set of `input`.
    pub fn set_input_edid(&self, input: u32, param: u32) -> MatrixResult<String> {
        debug!("Setting EDID for input {} to {}...", input, param);
        self.execute(&Command::SetInputEdid { input, param })
    }

    /// Select the IR system code mode.
    pub fn set_ir_system_code(&self, mode: u32) -> MatrixResult<String> {
        debug!("Setting IR system code to mode {}...", mode);
        self.execute(&Command::SetIrSystemCode { mode })
    }

    /// Mute or unmute an audio output.
    pub fn set_mute(&self, audio_output: &str, on: bool) -> MatrixResult<String> {
        debug!("Setting mute for {} to {}...", audio_output, on);
        self.execute(&Command::SetMute {
            audio_output: audio_output.to_string(),
            on,
        })
    }
}

impl<S: ByteStream> fmt::Debug for HdmiMatrix<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdmiMatrix")
            .field("state", &self.state)
            .field("model", &self.caps.as_ref().map(|c| c.model.as_str()))
            .field("version", &self.version.as_ref().map(|v| v.version.as_str()))
            .finish()
    }
}
