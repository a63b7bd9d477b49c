use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use linkprobe::mapfile::{self, MapFilter};
use linkprobe_frame::FaultConfig;
use linkprobe_payload::{memory::parse_address, StreamConfig, WireFormat};
use linkprobe_peer::{ClientConfig, HarnessConfig, SimulatorConfig, StreamMode, VariableRegistry};
use tracing::{info, warn};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod loopback;
pub mod ping;
pub mod sim;
pub mod test;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a simulated device on a socket path.
    Sim(SimArgs),
    /// Run the compliance scenario against a device.
    Test(TestArgs),
    /// Run the simulator and the compliance scenario in one process.
    Loopback(LoopbackArgs),
    /// Ping a device and report round-trip latency.
    Ping(PingArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Sim(args) => sim::run(args, format),
        Command::Test(args) => test::run(args, format),
        Command::Loopback(args) => loopback::run(args, format),
        Command::Ping(args) => ping::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum FormatArg {
    Text,
    Binary,
}

impl From<FormatArg> for WireFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => WireFormat::Text,
            FormatArg::Binary => WireFormat::Binary,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum StreamModeArg {
    /// STREAM_DATA frames.
    Binary,
    /// Bare CSV lines.
    Csv,
}

impl From<StreamModeArg> for StreamMode {
    fn from(value: StreamModeArg) -> Self {
        match value {
            StreamModeArg::Binary => StreamMode::Binary,
            StreamModeArg::Csv => StreamMode::Csv,
        }
    }
}

/// Device behavior shared by `sim` and `loopback`.
#[derive(Args, Debug, Clone)]
pub struct SimOptions {
    /// Initial stream channel count.
    #[arg(long, default_value_t = 4)]
    pub channels: u8,
    /// Initial stream rate in frames per second.
    #[arg(long, default_value_t = 200)]
    pub stream_hz: u16,
    /// Stream without waiting for STREAM_START.
    #[arg(long)]
    pub auto_stream: bool,
    #[arg(long, value_enum, default_value = "binary")]
    pub stream_mode: StreamModeArg,
    /// Probability of dropping an outbound frame [0..1].
    #[arg(long, default_value_t = 0.0)]
    pub drop_rate: f64,
    /// Probability of corrupting one byte of an outbound frame [0..1].
    #[arg(long, default_value_t = 0.0)]
    pub crc_error_rate: f64,
    /// Fault injection RNG seed.
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long, value_enum, default_value = "text")]
    pub var_table_format: FormatArg,
    #[arg(long, value_enum, default_value = "text")]
    pub readmem_format: FormatArg,
    /// Reply with empty ACK payloads.
    #[arg(long)]
    pub legacy_acks: bool,
    /// Log every received frame.
    #[arg(long)]
    pub echo_rx: bool,
    /// Linker map file to import variables from.
    #[arg(long, value_name = "FILE")]
    pub map_file: Option<PathBuf>,
    /// Comma-separated symbol prefixes for map import.
    #[arg(long, default_value = "g_,com_,gui_")]
    pub map_prefix: String,
    /// Maximum number of variables imported from the map.
    #[arg(long, default_value_t = 48)]
    pub map_max_vars: usize,
    /// Lowest address imported from the map (e.g. 0x1000).
    #[arg(long, default_value = "0x1000")]
    pub map_min_addr: String,
}

impl SimOptions {
    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            stream: StreamConfig {
                channel_count: self.channels,
                stream_rate_hz: self.stream_hz,
            },
            auto_stream: self.auto_stream,
            stream_mode: self.stream_mode.into(),
            faults: FaultConfig {
                drop_rate: self.drop_rate,
                crc_error_rate: self.crc_error_rate,
                seed: self.seed,
            }
            .clamped(),
            var_table_format: self.var_table_format.into(),
            read_format: self.readmem_format.into(),
            legacy_acks: self.legacy_acks,
            echo_rx: self.echo_rx,
            ..SimulatorConfig::default()
        }
    }

    /// The map-file table when it yields variables, otherwise the defaults.
    pub fn registry(&self) -> CliResult<VariableRegistry> {
        let Some(path) = &self.map_file else {
            return Ok(VariableRegistry::default());
        };
        let min_address = parse_address(self.map_min_addr.trim()).ok_or_else(|| {
            CliError::new(USAGE, format!("invalid map address: {}", self.map_min_addr))
        })?;
        let filter = MapFilter {
            min_address,
            max_vars: self.map_max_vars,
            ..MapFilter::default()
        }
        .with_prefix_list(&self.map_prefix);

        match mapfile::load(path, &filter) {
            Ok(vars) if !vars.is_empty() => {
                info!(count = vars.len(), path = %path.display(), "loaded variables from map");
                Ok(VariableRegistry::from_descriptors(vars))
            }
            Ok(_) => {
                warn!(path = %path.display(), "no matching map symbols, using default variables");
                Ok(VariableRegistry::default())
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "map import failed, using default variables");
                Ok(VariableRegistry::default())
            }
        }
    }
}

/// Scenario parameters shared by `test` and `loopback`.
#[derive(Args, Debug, Clone)]
pub struct HarnessOptions {
    /// Stream capture window (e.g. 6s, 500ms).
    #[arg(long, default_value = "6s")]
    pub duration: String,
    /// Write the JSON report to this file.
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
    /// Deadline for ACK responses.
    #[arg(long, default_value = "1500ms")]
    pub ack_timeout: String,
    /// Deadline for table and memory replies.
    #[arg(long, default_value = "2s")]
    pub reply_timeout: String,
    /// Stream frames required for the stream step to pass.
    #[arg(long, default_value_t = 21)]
    pub min_stream_frames: u64,
    /// Channel count requested with SET_STREAM_CONFIG.
    #[arg(long, default_value_t = 4)]
    pub request_channels: u8,
    /// Stream rate requested with SET_STREAM_CONFIG.
    #[arg(long, default_value_t = 200)]
    pub request_hz: u16,
    /// Value written and verified.
    #[arg(long, default_value_t = 42.5)]
    pub test_value: f64,
    /// Write with the fixed address/f32 layout.
    #[arg(long)]
    pub legacy_write: bool,
    /// Send the two-byte stream configuration.
    #[arg(long)]
    pub legacy_stream_config: bool,
}

impl HarnessOptions {
    pub fn client_config(&self) -> CliResult<ClientConfig> {
        Ok(ClientConfig {
            ack_timeout: parse_duration(&self.ack_timeout)?,
            reply_timeout: parse_duration(&self.reply_timeout)?,
            ..ClientConfig::default()
        })
    }

    pub fn harness_config(&self) -> CliResult<HarnessConfig> {
        Ok(HarnessConfig {
            stream: StreamConfig {
                channel_count: self.request_channels,
                stream_rate_hz: self.request_hz,
            },
            legacy_stream_config: self.legacy_stream_config,
            legacy_write: self.legacy_write,
            test_value: self.test_value,
            capture_window: parse_duration(&self.duration)?,
            min_stream_frames: self.min_stream_frames,
            ..HarnessConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct SimArgs {
    /// Socket path to serve the device on.
    pub path: PathBuf,
    /// Exit after the first connection closes.
    #[arg(long)]
    pub once: bool,
    #[command(flatten)]
    pub sim: SimOptions,
}

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Socket path of the device.
    pub path: PathBuf,
    #[command(flatten)]
    pub harness: HarnessOptions,
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    #[command(flatten)]
    pub sim: SimOptions,
    #[command(flatten)]
    pub harness: HarnessOptions,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    /// Socket path of the device.
    pub path: PathBuf,
    /// Number of pings to send.
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: usize,
    /// Deadline for each ACK (e.g. 1500ms, 2s).
    #[arg(long, default_value = "1500ms")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub(crate) fn install_ctrlc_handler(
    on_interrupt: impl FnMut() + Send + 'static,
) -> CliResult<()> {
    ctrlc::set_handler(on_interrupt).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}

/// Flag cleared by Ctrl-C.
pub(crate) fn interrupt_flag() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    install_ctrlc_handler(move || flag.store(false, Ordering::SeqCst))?;
    Ok(running)
}

pub(crate) fn write_report_file(path: &std::path::Path, json: &str) -> CliResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|err| crate::exit::io_error("create report directory", err))?;
    }
    std::fs::write(path, json).map_err(|err| crate::exit::io_error("write report", err))
}
