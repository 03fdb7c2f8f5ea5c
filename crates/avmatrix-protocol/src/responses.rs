//! Response parsing for the matrix protocol.
//!
//! Most responses are returned to the caller as text. The routing commands
//! reply with lines in one of two shapes:
//! - `<prefix> in<N> out<M>`: output `M` now shows input `N`
//! - `<prefix> in<N> all`: every output now shows input `N`
//!
//! The version query replies with `VER <version>`, and the CEC and mute status
//! queries end their reply with `on` or `off`.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::codec::{split_lines, Terminator};
use crate::error::{ProtocolError, ProtocolResult};

// ============================================================================
// Mapping
// ============================================================================

/// Which input each output is showing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Mapping {
    routes: BTreeMap<u32, u32>,
}

impl Mapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// A mapping where outputs `1..=output_count` all show `input`.
    pub fn all(input: u32, output_count: u32) -> Self {
        Mapping {
            routes: (1..=output_count).map(|output| (output, input)).collect(),
        }
    }

    /// Record that `output` shows `input`.
    pub fn insert(&mut self, output: u32, input: u32) {
        self.routes.insert(output, input);
    }

    /// The input routed to `output`, if the response mentioned it.
    pub fn input_for(&self, output: u32) -> Option<u32> {
        self.routes.get(&output).copied()
    }

    /// Iterate over `(output, input)` pairs in output order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.routes.iter().map(|(&output, &input)| (output, input))
    }

    /// Number of outputs in the mapping.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no output was mentioned.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl FromIterator<(u32, u32)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (u32, u32)>>(iter: I) -> Self {
        Mapping {
            routes: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Response Patterns
// ============================================================================

/// The two routing response shapes, compiled once.
#[derive(Debug)]
pub struct ResponsePatterns {
    /// `<prefix> in<N> out<M>`
    single: Regex,
    /// `<prefix> in<N> all`
    all: Regex,
}

impl ResponsePatterns {
    fn compile() -> Self {
        ResponsePatterns {
            single: Regex::new(r"(?i)(?:^|\s)in(\d+)\s+out(\d+)\s*$")
                .expect("single-output pattern is valid"),
            all: Regex::new(r"(?i)(?:^|\s)in(\d+)\s+all\s*$")
                .expect("all-outputs pattern is valid"),
        }
    }

    /// The process-wide compiled patterns.
    pub fn get() -> &'static ResponsePatterns {
        static PATTERNS: Lazy<ResponsePatterns> = Lazy::new(ResponsePatterns::compile);
        &PATTERNS
    }

    /// Match a single-output line, returning `(input, output)`.
    fn match_single(&self, line: &str) -> Option<(u32, u32)> {
        let caps = self.single.captures(line)?;
        let input = caps[1].parse().ok()?;
        let output = caps[2].parse().ok()?;
        Some((input, output))
    }

    /// Match an all-outputs line, returning the input.
    fn match_all(&self, line: &str) -> Option<u32> {
        let caps = self.all.captures(line)?;
        caps[1].parse().ok()
    }

    /// Parse a routing response.
    ///
    /// Lines are scanned in order. The first all-outputs line produces the
    /// complete table immediately; single-output lines accumulate; anything
    /// else is ignored. The result is empty if nothing matched.
    pub fn parse_mapping(&self, raw: &str, terminator: Terminator, output_count: u32) -> Mapping {
        let mut mapping = Mapping::new();
        for line in split_lines(raw, terminator) {
            if let Some(input) = self.match_all(line) {
                return Mapping::all(input, output_count);
            }
            match self.match_single(line) {
                Some((input, output)) => mapping.insert(output, input),
                None => log::trace!("ignoring non-routing line {:?}", line),
            }
        }
        mapping
    }
}

/// Parse a routing response with the shared patterns.
pub fn parse_mapping(raw: &str, terminator: Terminator, output_count: u32) -> Mapping {
    ResponsePatterns::get().parse_mapping(raw, terminator, output_count)
}

/// Parse a routing response, failing if it contains no routing line.
pub fn require_mapping(raw: &str, terminator: Terminator, output_count: u32) -> ProtocolResult<Mapping> {
    let mapping = parse_mapping(raw, terminator, output_count);
    if mapping.is_empty() {
        return Err(ProtocolError::ParseError(format!(
            "no routing line in response {:?}",
            raw
        )));
    }
    Ok(mapping)
}

// ============================================================================
// Firmware Version
// ============================================================================

/// Firmware version reported by `GET VER`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    /// The version token, e.g. `1.0.2`.
    pub version: String,
    /// The full response line, e.g. `VER 1.0.2`.
    pub raw: String,
}

impl FirmwareVersion {
    /// Parse a version response.
    ///
    /// Format: "VER <version>". Only the first non-empty line is considered.
    pub fn parse(text: &str) -> ProtocolResult<FirmwareVersion> {
        let line = split_lines(text, Terminator::Reversed)
            .into_iter()
            .next()
            .ok_or_else(|| ProtocolError::ParseError("empty version response".to_string()))?;

        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(tag), Some(version), None) if tag.eq_ignore_ascii_case("VER") => {
                Ok(FirmwareVersion {
                    version: version.to_string(),
                    raw: line.to_string(),
                })
            }
            _ => Err(ProtocolError::ParseError(format!(
                "unexpected version response: {:?}",
                line
            ))),
        }
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.version)
    }
}

// ============================================================================
// Switch State
// ============================================================================

/// Parse the trailing `on`/`off` token of a status reply.
///
/// Format: "<prefix> ... on" or "<prefix> ... off"
pub fn parse_switch_state(text: &str) -> ProtocolResult<bool> {
    let last = text
        .split_whitespace()
        .last()
        .ok_or_else(|| ProtocolError::ParseError("empty status response".to_string()))?;

    if last.eq_ignore_ascii_case("on") {
        Ok(true)
    } else if last.eq_ignore_ascii_case("off") {
        Ok(false)
    } else {
        Err(ProtocolError::ParseError(format!(
            "expected on/off status: {:?}",
            text
        )))
    }
}
