//! `avmatrix`: control an AV Access HDMI matrix from the command line.
//!
//! ```text
//! avmatrix --port /dev/ttyUSB0 switch --input 3 --output 2
//! avmatrix --port /dev/ttyUSB0 --json routes
//! avmatrix --port COM3 --legacy mute audioout1 on
//! avmatrix models --capabilities extra-models.yaml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use avmatrix_protocol::{CapabilityTable, Mapping, ProtocolError, Terminator};
use avmatrix_serial::{HdmiMatrix, LinkSettings, MatrixError, MatrixResult, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_SECS};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "avmatrix")]
#[command(about = "Control an AV Access HDMI matrix over RS-232")]
#[command(version)]
struct Cli {
    /// Serial port (e.g. /dev/ttyUSB0 or COM3)
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Matrix model name
    #[arg(short, long, default_value = "4KMX42-H2A", global = true)]
    model: String,

    /// YAML file with additional capability descriptors
    #[arg(short, long, global = true)]
    capabilities: Option<PathBuf>,

    /// Look the model up by name only, without querying the firmware version
    #[arg(long, global = true)]
    legacy: bool,

    /// Baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE, global = true)]
    baud: u32,

    /// Read/write timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    timeout: u64,

    /// Print routing tables and model data as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the models in the capability table
    Models,

    /// Show the firmware version
    Version,

    /// Reset the matrix to factory settings
    Reset,

    /// Reboot the matrix
    Reboot,

    /// Print the firmware's command listing
    #[command(name = "commands")]
    ListCommands,

    /// Show the routing of one output, or of all outputs
    Routes {
        /// Output number
        #[arg(short, long)]
        output: Option<u32>,
    },

    /// Route an input to one output, or to all outputs
    Switch {
        /// Input number
        #[arg(short, long)]
        input: u32,
        /// Output number (all outputs if omitted)
        #[arg(short, long)]
        output: Option<u32>,
    },

    /// Switch a display on or off over CEC
    CecPower {
        /// Output number
        output: u32,
        /// New state
        state: State,
    },

    /// Show or set CEC auto power for an output
    AutoCec {
        /// Output number
        output: u32,
        /// New state (shows the current state if omitted)
        state: Option<State>,
    },

    /// Show or set the CEC power delay for an output
    CecDelay {
        /// Output number
        output: u32,
        /// Delay in minutes (shows the current delay if omitted)
        minutes: Option<u32>,
    },

    /// Show or set input EDID
    Edid {
        /// Input number (all inputs if omitted)
        #[arg(short, long)]
        input: Option<u32>,
        /// EDID parameter number to select
        #[arg(requires = "input")]
        param: Option<u32>,
    },

    /// Show or set the IR system code
    IrCode {
        /// Mode to select (shows the current mode if omitted)
        mode: Option<u32>,
    },

    /// Show or set audio mute
    Mute {
        /// Audio output identifier (all outputs if omitted)
        audio_output: Option<String>,
        /// New state
        #[arg(requires = "audio_output")]
        state: Option<State>,
    },

    /// Send a raw command
    Raw {
        /// Command text, without line terminator
        command: String,
        /// Expect LF CR line endings instead of CR LF
        #[arg(long)]
        reversed: bool,
        /// Number of response lines to wait for
        #[arg(short, long, default_value_t = 1)]
        lines: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    On,
    Off,
}

impl State {
    fn is_on(self) -> bool {
        self == State::On
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(partial) = e.partial_response() {
                let received = String::from_utf8_lossy(partial);
                debug!(received = %received.escape_debug(), "Partial response");
            }
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_table(cli: &Cli) -> MatrixResult<CapabilityTable> {
    let mut table = CapabilityTable::builtin()?;
    if let Some(path) = &cli.capabilities {
        debug!(path = %path.display(), "Loading capability table");
        table.merge(CapabilityTable::from_yaml_file(path)?);
    }
    Ok(table)
}

fn connect(cli: &Cli, table: &CapabilityTable) -> MatrixResult<HdmiMatrix> {
    let port = cli.port.as_deref().ok_or_else(|| {
        MatrixError::from(ProtocolError::InvalidArgument(
            "a serial port is required (--port)".to_string(),
        ))
    })?;
    let settings = LinkSettings {
        baud_rate: cli.baud,
        timeout_secs: cli.timeout,
    };

    if cli.legacy {
        HdmiMatrix::open(port, &cli.model, table, &settings)
    } else {
        HdmiMatrix::connect(port, &cli.model, table, &settings)
    }
}

fn print_mapping(mapping: &Mapping, json: bool) {
    if json {
        match serde_json::to_string_pretty(mapping) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("cannot encode mapping: {}", e),
        }
    } else {
        for (output, input) in mapping.iter() {
            println!("out{} <- in{}", output, input);
        }
    }
}

fn print_models(table: &CapabilityTable, json: bool) {
    let models: Vec<_> = table.iter().collect();
    let encoded = if json {
        serde_json::to_string_pretty(&models).map_err(|e| e.to_string())
    } else {
        serde_yaml::to_string(&models).map_err(|e| e.to_string())
    };
    match encoded {
        Ok(text) => println!("{}", text.trim_end()),
        Err(e) => error!("cannot encode capability table: {}", e),
    }
}

fn run(cli: &Cli) -> MatrixResult<()> {
    let table = load_table(cli)?;
    let open = || connect(cli, &table);

    let text = match &cli.command {
        Commands::Models => {
            print_models(&table, cli.json);
            return Ok(());
        }
        Commands::Version => open()?.firmware_version()?,
        Commands::Reset => open()?.factory_reset()?,
        Commands::Reboot => open()?.reboot()?,
        Commands::ListCommands => open()?.help()?,
        Commands::Routes { output } => {
            let mapping = match output {
                Some(output) => open()?.route(*output)?,
                None => open()?.routes()?,
            };
            print_mapping(&mapping, cli.json);
            return Ok(());
        }
        Commands::Switch { input, output } => {
            let mapping = match output {
                Some(output) => open()?.set_route(*input, *output)?,
                None => open()?.set_route_all(*input)?,
            };
            print_mapping(&mapping, cli.json);
            return Ok(());
        }
        Commands::CecPower { output, state } => open()?.set_cec_power(*output, state.is_on())?,
        Commands::AutoCec { output, state } => match state {
            Some(state) => open()?.set_auto_cec(*output, state.is_on())?,
            None => open()?.auto_cec_status(*output)?,
        },
        Commands::CecDelay { output, minutes } => match minutes {
            Some(minutes) => open()?.set_cec_delay(*output, *minutes)?,
            None => open()?.cec_delay(*output)?,
        },
        Commands::Edid { input, param } => match (input, param) {
            (Some(input), Some(param)) => open()?.set_input_edid(*input, *param)?,
            (Some(input), None) => open()?.input_edid(*input)?,
            (None, _) => open()?.all_input_edid()?,
        },
        Commands::IrCode { mode } => match mode {
            Some(mode) => open()?.set_ir_system_code(*mode)?,
            None => open()?.ir_system_code()?,
        },
        Commands::Mute { audio_output, state } => match (audio_output, state) {
            (Some(name), Some(state)) => open()?.set_mute(name, state.is_on())?,
            (Some(name), None) => open()?.mute_status(name)?,
            (None, _) => open()?.all_mute_status()?,
        },
        Commands::Raw { command, reversed, lines } => {
            let terminator = if *reversed {
                Terminator::Reversed
            } else {
                Terminator::Standard
            };
            open()?.raw(command, terminator, *lines)?
        }
    };

    for line in text.lines() {
        println!("{}", line.trim_end());
    }
    Ok(())
}
