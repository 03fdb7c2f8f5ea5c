//! Integration tests for the HDMI matrix client.
//!
//! These tests drive `HdmiMatrix` through a `ScriptedStream` that plays the
//! part of a 4KMX42-H2A, so no hardware is needed.

use std::sync::Arc;
use std::thread;

use avmatrix_protocol::{CapabilityTable, Mapping, Parameter, ProtocolError, Terminator};
use avmatrix_serial::{ClientState, HdmiMatrix, MatrixError, ScriptedStream};

/// Install a subscriber so `RUST_LOG=debug cargo test` shows the exchanges.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A client identified as a 4KMX42-H2A on firmware 1.0.2.
fn identified_matrix() -> (HdmiMatrix<ScriptedStream>, ScriptedStream) {
    init_tracing();
    let stream = ScriptedStream::new();
    stream.push_reply(b"VER 1.0.2\n\r");

    let mut matrix = HdmiMatrix::new(stream.clone());
    let table = CapabilityTable::builtin().expect("built-in table is valid");
    matrix
        .identify("4KMX42-H2A", &table)
        .expect("identification should succeed");
    (matrix, stream)
}

/// A client for a small descriptor loaded from YAML.
fn yaml_matrix(yaml: &str, model: &str) -> (HdmiMatrix<ScriptedStream>, ScriptedStream) {
    init_tracing();
    let table = CapabilityTable::from_yaml_str(yaml).expect("table should load");
    let caps = table.lookup_model(model).expect("model should exist").clone();
    let stream = ScriptedStream::new();
    (HdmiMatrix::with_descriptor(stream.clone(), caps), stream)
}

// ============================================================================
// Identification
// ============================================================================

#[test]
fn test_version_query_has_no_trailing_separator() {
    let stream = ScriptedStream::new();
    stream.push_reply(b"VER 1.0.2\n\r");
    let matrix = HdmiMatrix::new(stream);

    assert_eq!(matrix.firmware_version().unwrap(), "VER 1.0.2");
}

#[test]
fn test_identify_with_yaml_table() {
    let yaml = r#"
- firmware_version: "2.0.0"
  model: 4KMX88-H2A
  input_count: 8
  output_count: 8
  audio_outputs: [audioout1, audioout2]
  edid_param_count: 11
  max_delay_minutes: 30
  ir_mode_count: 2
  help_line_count: 30
"#;
    let mut table = CapabilityTable::builtin().unwrap();
    table.merge(CapabilityTable::from_yaml_str(yaml).unwrap());

    let stream = ScriptedStream::new();
    stream.push_reply(b"VER 2.0.0\n\r");
    let mut matrix = HdmiMatrix::new(stream.clone());
    matrix.identify("4kmx88-h2a", &table).unwrap();

    stream.push_reply(b"MP in5 all\r\n");
    let mapping = matrix.set_route_all(5).unwrap();
    assert_eq!(mapping.len(), 8);
}

#[test]
fn test_unknown_model_for_known_version() {
    let stream = ScriptedStream::new();
    stream.push_reply(b"VER 1.0.2\n\r");
    let mut matrix = HdmiMatrix::new(stream.clone());

    let err = matrix
        .identify("4KMX44-H2A", &CapabilityTable::builtin().unwrap())
        .unwrap_err();
    assert!(matches!(
        err,
        MatrixError::Protocol(ProtocolError::ConfigurationError(_))
    ));
    assert_ne!(matrix.state(), ClientState::Ready);

    // Nothing further goes out on the wire.
    assert!(matrix.routes().is_err());
    assert_eq!(stream.sent_commands(), vec!["GET VER"]);
}

#[test]
fn test_identify_timeout_is_surfaced() {
    let stream = ScriptedStream::new();
    stream.push_reply(b"VER 1.0");
    let mut matrix = HdmiMatrix::new(stream);

    let err = matrix
        .identify("4KMX42-H2A", &CapabilityTable::builtin().unwrap())
        .unwrap_err();
    assert_eq!(err.partial_response(), Some(&b"VER 1.0"[..]));
    assert_eq!(matrix.state(), ClientState::Connected);
}

#[test]
fn test_reidentify_after_failure() {
    let stream = ScriptedStream::new();
    stream.push_reply(b"VER 9.9.9\n\r");
    stream.push_reply(b"VER 1.0.2\n\r");
    let mut matrix = HdmiMatrix::new(stream);
    let table = CapabilityTable::builtin().unwrap();

    assert!(matrix.identify("4KMX42-H2A", &table).is_err());
    assert!(matrix.identify("4KMX42-H2A", &table).is_ok());
    assert_eq!(matrix.state(), ClientState::Ready);
}

// ============================================================================
// Routing
// ============================================================================

#[test]
fn test_set_route_single_output() {
    let yaml = r#"
- firmware_version: "1.0.0"
  model: TEST-42
  input_count: 4
  output_count: 2
  audio_outputs: [audioout1]
  edid_param_count: 1
  max_delay_minutes: 1
  ir_mode_count: 1
  help_line_count: 1
"#;
    let (matrix, stream) = yaml_matrix(yaml, "test-42");
    stream.push_reply(b"MP in3 out2\r\n");

    let mapping = matrix.set_route(3, 2).unwrap();
    assert_eq!(mapping, Mapping::from_iter([(2, 3)]));
    assert_eq!(stream.sent_commands(), vec!["SET SW in3 out2"]);
}

#[test]
fn test_set_route_all_outputs() {
    let (matrix, stream) = identified_matrix();
    stream.push_reply(b"MP in2 all\r\n");

    let mapping = matrix.set_route_all(2).unwrap();
    assert_eq!(mapping, Mapping::from_iter([(1, 2), (2, 2)]));
    assert_eq!(stream.sent_commands().last().unwrap(), "SET SW in2 all");
}

#[test]
fn test_route_round_trip_for_every_pair() {
    let (matrix, stream) = identified_matrix();
    for input in 1..=4 {
        for output in 1..=2 {
            stream.push_reply(format!("MP in{} out{}\r\n", input, output));
            let mapping = matrix.set_route(input, output).unwrap();
            assert_eq!(mapping.input_for(output), Some(input));
            assert_eq!(mapping.len(), 1);
        }
    }
}

#[test]
fn test_get_route() {
    let (matrix, stream) = identified_matrix();
    stream.push_reply(b"MP in4 out1\r\n");

    let mapping = matrix.route(1).unwrap();
    assert_eq!(mapping.input_for(1), Some(4));
    assert_eq!(stream.sent_commands().last().unwrap(), "GET MP out1");
}

#[test]
fn test_get_route_unparseable() {
    let (matrix, stream) = identified_matrix();
    stream.push_reply(b"Command FAILED\r\n");

    assert!(matches!(
        matrix.route(1),
        Err(MatrixError::Protocol(ProtocolError::ParseError(_)))
    ));
}

#[test]
fn test_get_route_reply_for_other_output() {
    let (matrix, stream) = identified_matrix();
    stream.push_reply(b"MP in4 out2\r\n");

    assert!(matches!(
        matrix.route(1),
        Err(MatrixError::Protocol(ProtocolError::ParseError(_)))
    ));
}

#[test]
fn test_get_route_reply_beyond_model() {
    let (matrix, stream) = identified_matrix();
    stream.push_reply(b"MP in9 out7\r\n");

    assert!(matches!(
        matrix.route(1),
        Err(MatrixError::Protocol(ProtocolError::ParseError(_)))
    ));
}

#[test]
fn test_set_route_all_reply_with_input_zero() {
    let (matrix, stream) = identified_matrix();
    stream.push_reply(b"MP in0 all\r\n");

    assert!(matches!(
        matrix.set_route_all(1),
        Err(MatrixError::Protocol(ProtocolError::ParseError(_)))
    ));
}

#[test]
fn test_get_all_routes_reads_one_line_per_output() {
    let (matrix, stream) = identified_matrix();
    stream.push_reply(b"MP in1 out1\r\nMP in3 out2\r\n");

    let mapping = matrix.routes().unwrap();
    assert_eq!(mapping, Mapping::from_iter([(1, 1), (2, 3)]));
}

#[test]
fn test_get_all_routes_short_reply_times_out() {
    let (matrix, stream) = identified_matrix();
    stream.push_reply(b"MP in1 out1\r\n");

    match matrix.routes().unwrap_err() {
        MatrixError::Timeout { lines_seen, expected_lines, partial, .. } => {
            assert_eq!(lines_seen, 1);
            assert_eq!(expected_lines, 2);
            assert_eq!(partial, b"MP in1 out1\r\n");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

// ============================================================================
// Status and Control Commands
// ============================================================================

#[test]
fn test_text_commands_wire_forms() {
    let (matrix, stream) = identified_matrix();

    type Op = fn(&HdmiMatrix<ScriptedStream>) -> Result<String, MatrixError>;
    let cases: [(Op, &str); 13] = [
        (|m| m.factory_reset(), "RESET"),
        (|m| m.reboot(), "REBOOT"),
        (|m| m.ir_system_code(), "GET IR_SC"),
        (|m| m.auto_cec_status(2), "GET AUTOCEC_FN out2"),
        (|m| m.cec_delay(1), "GET AUTOCEC_D out1"),
        (|m| m.input_edid(3), "GET EDID in3"),
        (|m| m.mute_status("audioout1"), "GET MUTE audioout1"),
        (|m| m.set_cec_power(1, true), "SET CEC_PWR out1 on"),
        (|m| m.set_auto_cec(2, false), "SET AUTOCEC_FN out2 off"),
        (|m| m.set_cec_delay(2, 30), "SET AUTOCEC_D out2 30"),
        (|m| m.set_input_edid(4, 11), "SET EDID in4 11"),
        (|m| m.set_ir_system_code(2), "SET IR_SC mode2"),
        (|m| m.set_mute("spdifaudioout2", true), "SET MUTE spdifaudioout2 on"),
    ];

    for (op, command) in cases {
        stream.push_reply(b"OK\r\n");
        assert_eq!(op(&matrix).unwrap(), "OK");
        assert_eq!(stream.sent_commands().last().unwrap(), command);
    }
}

#[test]
fn test_help_reads_descriptor_line_count() {
    let (matrix, stream) = identified_matrix();
    let listing: String = (1..=24).map(|i| format!("command {}\r\n", i)).collect();
    stream.push_reply(listing);

    let text = matrix.help().unwrap();
    assert!(text.starts_with("command 1\r\n"));
    assert!(text.ends_with("command 24"));
}

#[test]
fn test_all_input_edid_reads_one_line_per_input() {
    let (matrix, stream) = identified_matrix();
    stream.push_reply(b"EDID in1 1\r\nEDID in2 1\r\nEDID in3 4\r\nEDID in4 11\r\n");

    let text = matrix.all_input_edid().unwrap();
    assert_eq!(text.lines().count(), 4);
    assert!(text.ends_with("EDID in4 11"));
}

#[test]
fn test_all_mute_status_reads_four_lines() {
    let (matrix, stream) = identified_matrix();
    stream.push_reply(
        b"MUTE hdmiaudioout1 off\r\nMUTE hdmiaudioout2 off\r\nMUTE audioout1 on\r\nMUTE spdifaudioout2 off\r\n",
    );

    let text = matrix.all_mute_status().unwrap();
    assert_eq!(text.lines().count(), 4);
}

#[test]
fn test_typed_switch_states() {
    let (matrix, stream) = identified_matrix();
    stream.push_reply(b"MUTE audioout1 on\r\n");
    stream.push_reply(b"AUTOCEC_FN out1 off\r\n");

    assert!(matrix.is_muted("audioout1").unwrap());
    assert!(!matrix.auto_cec_enabled(1).unwrap());
}

#[test]
fn test_validation_rejects_before_io() {
    let (matrix, stream) = identified_matrix();
    let before = stream.operations();

    let err = matrix.set_input_edid(1, 12).unwrap_err();
    match err {
        MatrixError::Protocol(ProtocolError::OutOfBounds { parameter, value, .. }) => {
            assert_eq!(parameter, Parameter::EdidParam);
            assert_eq!(value, "12");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(matrix.set_ir_system_code(3).is_err());
    assert!(matrix.mute_status("all").is_err());
    assert!(matrix.cec_delay(3).is_err());
    assert!(matrix.set_route_all(0).is_err());

    assert_eq!(stream.operations(), before);
}

#[test]
fn test_raw_command() {
    let (matrix, stream) = identified_matrix();
    stream.push_reply(b"IR_SC mode1\r\n");

    assert_eq!(
        matrix.raw("GET IR_SC", Terminator::Standard, 1).unwrap(),
        "IR_SC mode1"
    );
    assert!(matches!(
        matrix.raw("", Terminator::Standard, 1),
        Err(MatrixError::Protocol(ProtocolError::InvalidArgument(_)))
    ));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_shared_client_serializes_exchanges() {
    let (matrix, stream) = identified_matrix();
    for _ in 0..8 {
        stream.push_reply(b"MP in1 all\r\n");
    }

    let matrix = Arc::new(matrix);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let matrix = Arc::clone(&matrix);
            thread::spawn(move || matrix.set_route_all(1))
        })
        .collect();

    for handle in handles {
        let mapping = handle.join().unwrap().unwrap();
        assert_eq!(mapping, Mapping::all(1, 2));
    }
    assert_eq!(stream.replies_remaining(), 0);
    assert_eq!(stream.sent_commands().len(), 9);
}
