//! Per-model capability data.
//!
//! Every supported matrix is described by a [`CapabilityDescriptor`]: how many
//! inputs and outputs it has, which audio outputs it names, and the ranges its
//! EDID, CEC delay and IR settings accept. Descriptors are keyed by the
//! firmware version the device reports and by model name, and live in a
//! [`CapabilityTable`].
//!
//! The table starts from a statically declared list of known models and can
//! be extended from YAML:
//!
//! ```yaml
//! - firmware_version: "1.0.2"
//!   model: 4KMX42-H2A
//!   input_count: 4
//!   output_count: 2
//!   audio_outputs: [hdmiaudioout1, hdmiaudioout2, audioout1, spdifaudioout2]
//!   edid_param_count: 11
//!   max_delay_minutes: 30
//!   ir_mode_count: 2
//!   help_line_count: 24
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Parameter, ProtocolError, ProtocolResult, ValidRange};

// ============================================================================
// Capability Descriptor
// ============================================================================

/// Capabilities of one matrix model running one firmware version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityDescriptor {
    /// Firmware version as reported by `GET VER` (without the `VER ` prefix).
    pub firmware_version: String,
    /// Model name, e.g. `4KMX42-H2A`.
    pub model: String,
    /// Number of HDMI inputs.
    pub input_count: u32,
    /// Number of HDMI outputs.
    pub output_count: u32,
    /// Identifiers accepted by the `MUTE` commands.
    pub audio_outputs: Vec<String>,
    /// Number of selectable EDID parameter sets.
    pub edid_param_count: u32,
    /// Longest CEC power delay, in minutes.
    pub max_delay_minutes: u32,
    /// Number of IR system code modes.
    pub ir_mode_count: u32,
    /// Number of lines the `help` command prints.
    pub help_line_count: u32,
}

impl CapabilityDescriptor {
    /// Check that every field is usable.
    pub fn validate(&self) -> ProtocolResult<()> {
        let bad = |reason: String| -> ProtocolResult<()> {
            Err(ProtocolError::ConfigurationError(format!(
                "model '{}' (firmware '{}'): {}",
                self.model, self.firmware_version, reason
            )))
        };

        if self.model.trim().is_empty() {
            return bad("model name is empty".to_string());
        }
        if self.firmware_version.trim().is_empty() {
            return bad("firmware version is empty".to_string());
        }

        let counts = [
            ("input_count", self.input_count),
            ("output_count", self.output_count),
            ("edid_param_count", self.edid_param_count),
            ("max_delay_minutes", self.max_delay_minutes),
            ("ir_mode_count", self.ir_mode_count),
            ("help_line_count", self.help_line_count),
        ];
        for (name, value) in counts {
            if value == 0 {
                return bad(format!("{} must be positive", name));
            }
        }

        if self.audio_outputs.is_empty() {
            return bad("no audio outputs listed".to_string());
        }
        let mut seen = HashSet::new();
        for name in &self.audio_outputs {
            if name.is_empty() || !name.is_ascii() || name.contains(char::is_whitespace) {
                return bad(format!("invalid audio output identifier {:?}", name));
            }
            if !seen.insert(name.as_str()) {
                return bad(format!("duplicate audio output '{}'", name));
            }
        }

        Ok(())
    }

    /// Check an output number.
    pub fn check_output(&self, output: u32) -> ProtocolResult<()> {
        check_range(Parameter::Output, output, self.output_count)
    }

    /// Check an input number.
    pub fn check_input(&self, input: u32) -> ProtocolResult<()> {
        check_range(Parameter::Input, input, self.input_count)
    }

    /// Check an audio output identifier.
    pub fn check_audio_output(&self, name: &str) -> ProtocolResult<()> {
        if self.audio_outputs.iter().any(|o| o == name) {
            Ok(())
        } else {
            Err(ProtocolError::OutOfBounds {
                parameter: Parameter::AudioOutput,
                value: name.to_string(),
                valid: ValidRange::OneOf(self.audio_outputs.clone()),
            })
        }
    }

    /// Check an EDID parameter number.
    pub fn check_edid_param(&self, param: u32) -> ProtocolResult<()> {
        check_range(Parameter::EdidParam, param, self.edid_param_count)
    }

    /// Check a CEC power delay in minutes.
    pub fn check_delay(&self, minutes: u32) -> ProtocolResult<()> {
        check_range(Parameter::Delay, minutes, self.max_delay_minutes)
    }

    /// Check an IR system code mode.
    pub fn check_ir_mode(&self, mode: u32) -> ProtocolResult<()> {
        check_range(Parameter::IrMode, mode, self.ir_mode_count)
    }
}

/// All numeric parameters are 1-based.
fn check_range(parameter: Parameter, value: u32, max: u32) -> ProtocolResult<()> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        log::error!("{} {} is out of bounds (1..={})", parameter, value, max);
        Err(ProtocolError::OutOfBounds {
            parameter,
            value: value.to_string(),
            valid: ValidRange::Range { min: 1, max },
        })
    }
}

/// Order firmware versions by their dot-separated parts.
///
/// Numeric parts compare as numbers, so `1.10.0` is newer than `1.9.0`.
/// Parts that are not numbers compare as text, and a version that extends
/// another (`1.0.2.1` after `1.0.2`) is newer.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.trim().split('.');
    let mut right = b.trim().split('.');
    loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

/// Normalize a model name for table keys.
pub fn normalize_model(model: &str) -> String {
    model.trim().to_ascii_uppercase()
}

// ============================================================================
// Built-in Models
// ============================================================================

/// Static form of a descriptor, for the compiled-in table.
struct BuiltinModel {
    firmware_version: &'static str,
    model: &'static str,
    input_count: u32,
    output_count: u32,
    audio_outputs: &'static [&'static str],
    edid_param_count: u32,
    max_delay_minutes: u32,
    ir_mode_count: u32,
    help_line_count: u32,
}

impl BuiltinModel {
    fn to_descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            firmware_version: self.firmware_version.to_string(),
            model: self.model.to_string(),
            input_count: self.input_count,
            output_count: self.output_count,
            audio_outputs: self.audio_outputs.iter().map(|s| s.to_string()).collect(),
            edid_param_count: self.edid_param_count,
            max_delay_minutes: self.max_delay_minutes,
            ir_mode_count: self.ir_mode_count,
            help_line_count: self.help_line_count,
        }
    }
}

const BUILTIN_MODELS: &[BuiltinModel] = &[
    // AV Access 4KMX42-H2A, 4x2 HDMI 2.0 matrix.
    BuiltinModel {
        firmware_version: "1.0.2",
        model: "4KMX42-H2A",
        input_count: 4,
        output_count: 2,
        audio_outputs: &["hdmiaudioout1", "hdmiaudioout2", "audioout1", "spdifaudioout2"],
        edid_param_count: 11,
        max_delay_minutes: 30,
        ir_mode_count: 2,
        help_line_count: 24,
    },
];

// ============================================================================
// Capability Table
// ============================================================================

/// Descriptors keyed by firmware version, then by normalized model name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityTable {
    by_version: BTreeMap<String, BTreeMap<String, CapabilityDescriptor>>,
}

impl CapabilityTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The compiled-in table of known models.
    pub fn builtin() -> ProtocolResult<Self> {
        let mut table = Self::new();
        for model in BUILTIN_MODELS {
            table.insert(model.to_descriptor())?;
        }
        Ok(table)
    }

    /// Parse a table from a YAML list of descriptors.
    pub fn from_yaml_str(yaml: &str) -> ProtocolResult<Self> {
        let records: Vec<CapabilityDescriptor> = serde_yaml::from_str(yaml).map_err(|e| {
            ProtocolError::ConfigurationError(format!("invalid capability table: {}", e))
        })?;

        let mut table = Self::new();
        for record in records {
            table.insert(record)?;
        }
        Ok(table)
    }

    /// Load a table from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ProtocolResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            ProtocolError::ConfigurationError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Add a descriptor, rejecting invalid records and duplicate keys.
    pub fn insert(&mut self, descriptor: CapabilityDescriptor) -> ProtocolResult<()> {
        descriptor.validate()?;

        let version = descriptor.firmware_version.trim().to_string();
        let model = normalize_model(&descriptor.model);
        let models = self.by_version.entry(version).or_default();
        if models.contains_key(&model) {
            return Err(ProtocolError::ConfigurationError(format!(
                "duplicate entry for model '{}' firmware '{}'",
                descriptor.model, descriptor.firmware_version
            )));
        }
        models.insert(model, descriptor);
        Ok(())
    }

    /// Merge another table into this one. Entries in `other` replace
    /// entries with the same key.
    pub fn merge(&mut self, other: CapabilityTable) {
        for (version, models) in other.by_version {
            let target = self.by_version.entry(version).or_default();
            for (model, descriptor) in models {
                if target.insert(model, descriptor).is_some() {
                    log::info!("capability entry overridden by merged table");
                }
            }
        }
    }

    /// Find the descriptor for a firmware version and model.
    ///
    /// The version must match exactly; the model name is matched without
    /// regard to case.
    pub fn lookup(&self, firmware_version: &str, model: &str) -> ProtocolResult<&CapabilityDescriptor> {
        let models = self.by_version.get(firmware_version.trim()).ok_or_else(|| {
            ProtocolError::ConfigurationError(format!(
                "firmware version '{}' is not in the capability table",
                firmware_version
            ))
        })?;

        models.get(&normalize_model(model)).ok_or_else(|| {
            ProtocolError::ConfigurationError(format!(
                "model '{}' is not known for firmware version '{}'",
                model, firmware_version
            ))
        })
    }

    /// Find a descriptor by model name alone.
    ///
    /// When several firmware versions list the model, the newest version
    /// wins (see [`compare_versions`]).
    pub fn lookup_model(&self, model: &str) -> ProtocolResult<&CapabilityDescriptor> {
        let key = normalize_model(model);
        self.by_version
            .iter()
            .filter_map(|(version, models)| models.get(&key).map(|caps| (version, caps)))
            .max_by(|(a, _), (b, _)| compare_versions(a, b))
            .map(|(_, caps)| caps)
            .ok_or_else(|| {
                ProtocolError::ConfigurationError(format!(
                    "model '{}' is not in the capability table",
                    model
                ))
            })
    }

    /// Iterate over every descriptor.
    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.by_version.values().flat_map(|models| models.values())
    }

    /// Number of descriptors in the table.
    pub fn len(&self) -> usize {
        self.by_version.values().map(|models| models.len()).sum()
    }

    /// Whether the table has no descriptors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
