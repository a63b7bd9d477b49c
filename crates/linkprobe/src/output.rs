use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use linkprobe_peer::{ComplianceReport, SimulatorStats};
use serde::Serialize;
use serde_json::Value;

use crate::cmd::ping::PingOutput;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn verdict(ok: bool) -> &'static str {
    if ok {
        "PASS"
    } else {
        "FAIL"
    }
}

/// `key=value` pairs of a step's detail.
fn detail_text(detail: &serde_json::Map<String, Value>) -> String {
    detail
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}={s}"),
            other => format!("{key}={other}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn print_report(report: &ComplianceReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = new_table(vec!["STEP", "RESULT", "DETAIL"]);
            for step in &report.steps {
                table.add_row(vec![
                    step.name.clone(),
                    verdict(step.ok).to_string(),
                    detail_text(&step.detail),
                ]);
            }
            println!("{table}");
            println!(
                "stream_frames={} channels={} crc_errors={} overall={}",
                report.stream_frames,
                report.stream_channels_last,
                report.link.rx_crc_errors,
                verdict(report.ok)
            );
        }
        OutputFormat::Pretty => {
            for step in &report.steps {
                println!(
                    "[{}] {} {}",
                    verdict(step.ok),
                    step.name,
                    detail_text(&step.detail)
                );
            }
            println!("overall: {}", verdict(report.ok));
        }
    }
}

pub fn print_sim_stats(stats: &SimulatorStats, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(stats),
        OutputFormat::Table => {
            let mut table = new_table(vec!["RX", "TX", "DROPPED", "CORRUPTED", "WRITE FAILURES"]);
            table.add_row(vec![
                stats.rx_frames.to_string(),
                stats.tx_frames.to_string(),
                stats.dropped_frames.to_string(),
                stats.corrupted_frames.to_string(),
                stats.write_failures.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "session: rx={} tx={} dropped={} corrupted={} write_failures={} rx_crc_errors={}",
                stats.rx_frames,
                stats.tx_frames,
                stats.dropped_frames,
                stats.corrupted_frames,
                stats.write_failures,
                stats.rx_crc_errors
            );
        }
    }
}

pub fn print_ping(out: &PingOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["SEQ", "ACK", "LATENCY (ms)"]);
            table.add_row(vec![
                out.seq.to_string(),
                out.ack.to_string(),
                format!("{:.2}", out.latency_ms),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "ping seq={} ack={} time={:.2}ms",
                out.seq, out.ack, out.latency_ms
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn detail_text_unquotes_strings() {
        let mut detail = serde_json::Map::new();
        detail.insert("format".into(), json!("text"));
        detail.insert("count".into(), json!(4));
        assert_eq!(detail_text(&detail), "count=4 format=text");
    }
}
