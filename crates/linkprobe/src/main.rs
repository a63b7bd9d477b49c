mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "linkprobe",
    version,
    about = "Serial frame protocol simulator and compliance tester"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sim_subcommand() {
        let cli = Cli::try_parse_from([
            "linkprobe",
            "sim",
            "/tmp/dev.sock",
            "--channels",
            "8",
            "--crc-error-rate",
            "0.05",
            "--readmem-format",
            "binary",
        ])
        .expect("sim args should parse");

        let Command::Sim(args) = cli.command else {
            panic!("expected sim command");
        };
        let config = args.sim.simulator_config();
        assert_eq!(config.stream.channel_count, 8);
        assert_eq!(config.faults.crc_error_rate, 0.05);
        assert_eq!(config.read_format, linkprobe_payload::WireFormat::Binary);
    }

    #[test]
    fn parses_loopback_with_both_option_sets() {
        let cli = Cli::try_parse_from([
            "linkprobe",
            "loopback",
            "--legacy-acks",
            "--duration",
            "500ms",
            "--request-channels",
            "6",
        ])
        .expect("loopback args should parse");
        let Command::Loopback(args) = cli.command else {
            panic!("expected loopback command");
        };
        assert!(args.sim.legacy_acks);
        let harness = args.harness.harness_config().expect("harness config");
        assert_eq!(harness.stream.channel_count, 6);
        assert_eq!(harness.capture_window, std::time::Duration::from_millis(500));
    }

    #[test]
    fn rejects_unknown_wire_format() {
        let err = Cli::try_parse_from([
            "linkprobe",
            "sim",
            "/tmp/dev.sock",
            "--var-table-format",
            "xml",
        ])
        .expect_err("bad format should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
