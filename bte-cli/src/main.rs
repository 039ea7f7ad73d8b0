//! BTE Calibration CLI Application
//!
//! Command-line driver for the bte-codec library. It adds:
//! - Configuration loading (config.toml)
//! - Logging setup
//! - A dry-run transport writing candump-style trace lines
//! - Text and JSON output of frames, macros and the catalog

use anyhow::{Context, Result};
use bte_codec::sequencer::{self, SystemRequest};
use bte_codec::{
    codec, send_macro, CalibrationMacro, ControlMode, FieldValue, Frame, FrameBuilder,
    MacroSequencer, MessageCatalog, MessageKey, OperatingState, RegisterCommand, Transport,
    TransportConfig,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

mod config;
mod input;
mod trace;

use config::AppConfig;
use trace::TraceTransport;

/// BTE Calibration - Build and send calibration frames for the battery test emulator
#[derive(Parser, Debug)]
#[command(name = "bte-calib")]
#[command(about = "Build calibration CAN frames for the BTE (EStorage)", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Message catalog file replacing the built-in catalog
    #[arg(long, value_name = "FILE", global = true)]
    catalog: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Trace file for sent frames (default: stdout)
    #[arg(short, long, value_name = "FILE", global = true)]
    output: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the message catalog
    Catalog {
        /// Export the catalog as a loadable file
        #[arg(long, value_enum)]
        export: Option<ExportFormat>,
    },
    /// Build a single frame from field=value assignments
    Encode {
        /// Message name or CAN ID (0x..)
        message: MessageKey,
        /// Field assignments, e.g. u_min=0 u_max=1400
        values: Vec<String>,
    },
    /// Decode a payload against a catalog entry
    Decode {
        /// Message name or CAN ID (0x..)
        message: MessageKey,
        /// Payload bytes in hex
        payload: String,
    },
    /// Build a control register frame
    Register {
        /// Operating state (off, standby, on)
        #[arg(long, default_value = "standby")]
        state: OperatingState,
        /// Control mode (none, voltage, current, power, resistance or a code)
        #[arg(long, default_value = "none")]
        mode: ControlMode,
        /// Set value of the active controller
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        reference: f64,
        /// Reset the charge counter
        #[arg(long)]
        reset_charge: bool,
        /// Reset the energy counter
        #[arg(long)]
        reset_energy: bool,
        /// Inner resistance in mOhm
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        inner_resistance: f64,
    },
    /// Send the initialization macro
    Init,
    /// Initialize, then run a calibration curve ([calibration] or the 800 V preset)
    Calibrate {
        /// Override the set value of the run
        #[arg(long, allow_hyphen_values = true)]
        setpoint: Option<f64>,
        /// Override the control mode of the run
        #[arg(long)]
        mode: Option<ControlMode>,
    },
    /// Switch the device off
    Stop,
    /// Request system status or information
    Request {
        #[arg(value_enum)]
        kind: RequestKind,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExportFormat {
    Toml,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RequestKind {
    Status,
    Info,
}

impl From<RequestKind> for SystemRequest {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Status => SystemRequest::Status,
            RequestKind::Info => SystemRequest::Info,
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("BTE Calibration CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using codec library v{}", bte_codec::VERSION);

    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    let catalog = config.load_catalog(args.catalog.as_deref())?;

    let mut session = Session::new(args.output.clone(), args.format, config.can.clone());

    match &args.command {
        Command::Catalog { export } => print_catalog(&catalog, *export, args.format),
        Command::Encode { message, values } => {
            let frame = encode_frame(&catalog, message, values)?;
            session.send_frame(message.to_string(), frame)
        }
        Command::Decode { message, payload } => decode_payload(&catalog, message, payload, args.format),
        Command::Register {
            state,
            mode,
            reference,
            reset_charge,
            reset_energy,
            inner_resistance,
        } => {
            let command = RegisterCommand::new(*state, *mode)
                .with_reference(*reference)
                .with_resets(*reset_charge, *reset_energy)
                .with_inner_resistance(*inner_resistance);
            let frame = FrameBuilder::new(&catalog).build_register(&command)?;
            session.send_frame(format!("{} ({})", state, mode), frame)
        }
        Command::Init => {
            let mut sequencer = MacroSequencer::new(&catalog);
            let init = sequencer.initialize(&config.initialization)?;
            session.send(&init)
        }
        Command::Calibrate { setpoint, mode } => {
            let mut run = config.calibration.clone();
            if let Some(setpoint) = setpoint {
                run.setpoint = *setpoint;
            }
            if let Some(mode) = mode {
                run.control_mode = *mode;
            }

            let mut sequencer = MacroSequencer::new(&catalog);
            let init = sequencer.initialize(&config.initialization)?;
            session.send(&init)?;
            let curve = sequencer.run_calibration(&run)?;
            session.send(&curve)?;
            log::info!(
                "Device left ON at {} ({}); use `stop` to switch off",
                run.setpoint,
                run.control_mode
            );
            Ok(())
        }
        Command::Stop => session.send(&sequencer::stop_macro(&catalog)?),
        Command::Request { kind } => {
            session.send(&sequencer::system_request_macro(&catalog, (*kind).into())?)
        }
    }
}

/// Where built frames go: the dry-run trace, plus JSON on stdout if asked
///
/// The trace writer is opened on the first send, so commands that only print
/// never create or truncate the `--output` file.
struct Session {
    output: Option<PathBuf>,
    format: OutputFormat,
    can: TransportConfig,
    trace: Option<TraceTransport<Box<dyn Write>>>,
}

impl Session {
    fn new(output: Option<PathBuf>, format: OutputFormat, can: TransportConfig) -> Self {
        Self {
            output,
            format,
            can,
            trace: None,
        }
    }

    fn trace(&mut self) -> Result<Option<&mut TraceTransport<Box<dyn Write>>>> {
        if self.trace.is_none() {
            let writer: Option<Box<dyn Write>> = match (&self.output, self.format) {
                (Some(path), _) => {
                    let file = File::create(path)
                        .with_context(|| format!("Failed to create trace file: {:?}", path))?;
                    Some(Box::new(io::BufWriter::new(file)))
                }
                (None, OutputFormat::Text) => Some(Box::new(io::stdout())),
                // JSON owns stdout; no trace without --output
                (None, OutputFormat::Json) => None,
            };
            self.trace = writer.map(|w| TraceTransport::new(w, self.can.clone()));
        }
        Ok(self.trace.as_mut())
    }

    fn send(&mut self, calibration_macro: &CalibrationMacro) -> Result<()> {
        if self.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(calibration_macro)?);
        }
        if let Some(trace) = self.trace()? {
            let sent = send_macro(trace, calibration_macro)
                .with_context(|| format!("Failed to send '{}'", calibration_macro.name()))?;
            log::info!("✓ {} ({} frames)", calibration_macro.name(), sent);
        }
        Ok(())
    }

    fn send_frame(&mut self, label: String, frame: Frame) -> Result<()> {
        if self.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&frame)?);
        }
        if let Some(trace) = self.trace()? {
            trace
                .send(&frame)
                .with_context(|| format!("Failed to send {}", label))?;
            log::info!("✓ {}: {}", label, frame);
        }
        Ok(())
    }
}

fn encode_frame(catalog: &MessageCatalog, message: &MessageKey, values: &[String]) -> Result<Frame> {
    let definition = catalog.lookup(message)?;
    let assignments = values
        .iter()
        .map(|v| input::parse_assignment(v))
        .collect::<Result<Vec<_>>>()?;
    let named: Vec<(&str, FieldValue)> = assignments
        .iter()
        .map(|(name, value)| (name.as_str(), *value))
        .collect();

    let frame = FrameBuilder::new(catalog).build(definition, &named)?;
    Ok(frame)
}

fn decode_payload(catalog: &MessageCatalog, message: &MessageKey, payload: &str, format: OutputFormat) -> Result<()> {
    let definition = catalog.lookup(message)?;
    let bytes = input::parse_hex(payload)?;
    let values = codec::decode_payload(definition, &bytes)?;

    match format {
        OutputFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = definition
                .fields
                .iter()
                .zip(&values)
                .map(|(field, value)| -> Result<(String, serde_json::Value)> {
                    Ok((field.name.clone(), serde_json::to_value(value)?))
                })
                .collect::<Result<_>>()?;
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        OutputFormat::Text => {
            println!("{} (0x{:03X})", definition.name, definition.id);
            for (field, value) in definition.fields.iter().zip(&values) {
                let unit = field.unit.as_deref().unwrap_or("");
                println!("  {:<16} {} {}", field.name, value, unit);
            }
        }
    }
    Ok(())
}

fn print_catalog(catalog: &MessageCatalog, export: Option<ExportFormat>, format: OutputFormat) -> Result<()> {
    match (export, format) {
        (Some(ExportFormat::Toml), _) => print!("{}", catalog.to_toml()?),
        (Some(ExportFormat::Json), _) | (None, OutputFormat::Json) => println!("{}", catalog.to_json()?),
        (None, OutputFormat::Text) => {
            let stats = catalog.stats();
            println!("═══════════════════════════════════════════════");
            println!("  BTE Message Catalog");
            println!("═══════════════════════════════════════════════\n");
            for message in catalog.messages() {
                let rate = message
                    .periodicity
                    .map(|hz| format!("{} Hz", hz))
                    .unwrap_or_default();
                println!(
                    "  0x{:03X}  {:<24} [{}] {:>2} fields  {}",
                    message.id,
                    message.name,
                    message.length,
                    message.fields.len(),
                    rate
                );
            }
            println!("\n📊 Messages: {}", stats.num_messages);
            println!("   Fields:   {}", stats.num_fields);
            println!("   Bit-packed: {}", stats.num_bit_packed);
        }
    }
    Ok(())
}

/// Initialize logging: `-q` shows errors only, each `-v` adds a level, and
/// `RUST_LOG` can still refine per target
fn init_logging(verbose: u8, quiet: bool) {
    use log::LevelFilter;

    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(buf, "[{} {}] {}", record.level(), record.target(), record.args())
        })
        .init();
}
