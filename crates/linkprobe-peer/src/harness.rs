//! Fixed end-to-end compliance scenario.
//!
//! Every step records a pass/fail outcome with detail; a failure never stops
//! the scenario. Steps that need a variable fail outright when no table was
//! obtained.

use std::io::{Read, Write};
use std::time::Duration;

use linkprobe_frame::{DecodeStats, TxStats};
use linkprobe_payload::{
    AckPayload, DataType, Decoded, MemRead, MemValue, StreamConfig, VariableDescriptor,
    WireFormat,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::client::Client;
use crate::error::Result;

/// Scenario parameters.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Stream configuration sent before streaming.
    pub stream: StreamConfig,
    /// Send the two-byte stream configuration.
    pub legacy_stream_config: bool,
    /// Write the test value with the fixed `address, f32` layout.
    pub legacy_write: bool,
    pub test_value: f64,
    /// Largest accepted difference between the written and re-read value.
    pub tolerance: f64,
    pub capture_window: Duration,
    /// Stream frames the capture must see to pass.
    pub min_stream_frames: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            legacy_stream_config: false,
            legacy_write: false,
            test_value: 42.5,
            tolerance: 0.6,
            capture_window: Duration::from_secs(6),
            min_stream_frames: 21,
        }
    }
}

/// One recorded step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub name: String,
    pub ok: bool,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl StepResult {
    fn new(name: &str, ok: bool) -> Self {
        Self {
            name: name.to_string(),
            ok,
            detail: Map::new(),
        }
    }

    fn failed(name: &str, reason: impl ToString) -> Self {
        Self::new(name, false).with("reason", reason.to_string())
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.detail.insert(key.to_string(), value.into());
        self
    }
}

/// Link counters observed by the client over the whole scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkCounters {
    pub rx_frames: u64,
    pub rx_crc_errors: u64,
    pub rx_oversize_lengths: u64,
    pub rx_discarded_bytes: u64,
    pub tx_frames: u64,
    pub tx_write_failures: u64,
}

impl LinkCounters {
    fn new(rx: DecodeStats, tx: TxStats) -> Self {
        Self {
            rx_frames: rx.frames,
            rx_crc_errors: rx.crc_errors,
            rx_oversize_lengths: rx.oversize_lengths,
            rx_discarded_bytes: rx.discarded_bytes,
            tx_frames: tx.frames_sent,
            tx_write_failures: tx.write_failures,
        }
    }
}

/// Scenario outcome; `ok` is true only if every step passed.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub steps: Vec<StepResult>,
    pub stream_frames: u64,
    pub stream_channels_last: usize,
    pub link: LinkCounters,
    pub ok: bool,
}

impl ComplianceReport {
    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| !s.ok)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs the compliance scenario through a [`Client`].
#[derive(Debug, Clone, Default)]
pub struct ComplianceHarness {
    config: HarnessConfig,
}

impl ComplianceHarness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn run<R: Read, W: Write>(&self, client: &mut Client<R, W>) -> ComplianceReport {
        let mut steps = Vec::with_capacity(10);

        steps.push(ack_step("PING->ACK", client.ping()));

        let stream_config = self.config.stream.normalized();
        steps.push(
            ack_step(
                "SET_STREAM_CONFIG->ACK",
                client.set_stream_config(stream_config, self.config.legacy_stream_config),
            )
            .with("channels", stream_config.channel_count)
            .with("rate_hz", stream_config.stream_rate_hz),
        );

        let target = match client.get_var_table() {
            Ok(table) => {
                let format = format_name(&table);
                let vars = table.into_items();
                let step = StepResult::new("GET_VAR_TABLE", !vars.is_empty())
                    .with("count", vars.len())
                    .with("format", format);
                steps.push(match vars.first() {
                    Some(first) => step.with("first", first.name.clone()),
                    None => step.with("reason", "empty or undecodable table"),
                });
                vars.into_iter().next()
            }
            Err(err) => {
                steps.push(StepResult::failed("GET_VAR_TABLE", err).with("count", 0));
                None
            }
        };

        match &target {
            Some(var) => {
                steps.push(self.read_step(client, var));
                steps.push(self.write_step(client, var));
                steps.push(self.verify_step(client, var));
            }
            None => {
                for name in ["READ_MEM_BATCH", "WRITE_MEM->ACK", "WRITE_VERIFY"] {
                    steps.push(StepResult::failed(name, "no variables"));
                }
            }
        }

        steps.push(ack_step("STREAM_START->ACK", client.stream_start()));

        let (stream_frames, stream_channels_last) =
            match client.capture_stream(self.config.capture_window) {
                Ok(capture) => {
                    steps.push(
                        StepResult::new(
                            "STREAM_DATA",
                            capture.frames >= self.config.min_stream_frames,
                        )
                        .with("frames", capture.frames)
                        .with("channels", capture.last_channels)
                        .with("rejected", capture.rejected)
                        .with("rate_fps", round2(capture.rate())),
                    );
                    (capture.frames, capture.last_channels)
                }
                Err(err) => {
                    steps.push(StepResult::failed("STREAM_DATA", err).with("frames", 0));
                    (0, 0)
                }
            };

        steps.push(ack_step("STREAM_STOP->ACK", client.stream_stop()));
        steps.push(ack_step("PING_AFTER_STOP", client.ping()));

        let ok = steps.iter().all(|s| s.ok);
        for step in steps.iter().filter(|s| !s.ok) {
            let detail = Value::Object(step.detail.clone());
            warn!(step = %step.name, %detail, "step failed");
        }
        info!(ok, steps = steps.len(), stream_frames, "compliance scenario finished");

        ComplianceReport {
            steps,
            stream_frames,
            stream_channels_last,
            link: LinkCounters::new(client.decode_stats(), client.tx_stats()),
            ok,
        }
    }

    fn read_step<R: Read, W: Write>(
        &self,
        client: &mut Client<R, W>,
        var: &VariableDescriptor,
    ) -> StepResult {
        const NAME: &str = "READ_MEM_BATCH";
        match read_value(client, var) {
            Ok((Some(value), format)) => StepResult::new(NAME, true)
                .with("address", hex(var.address))
                .with("value", value)
                .with("format", format),
            Ok((None, format)) => StepResult::new(NAME, false)
                .with("address", hex(var.address))
                .with("format", format)
                .with("reason", "address missing from reply"),
            Err(err) => StepResult::failed(NAME, err).with("address", hex(var.address)),
        }
    }

    fn write_step<R: Read, W: Write>(
        &self,
        client: &mut Client<R, W>,
        var: &VariableDescriptor,
    ) -> StepResult {
        const NAME: &str = "WRITE_MEM->ACK";
        let result = if self.config.legacy_write {
            client.write_mem_legacy(&[(var.address, self.config.test_value as f32)])
        } else {
            client.write_mem(&[MemValue::typed(
                var.address,
                var.data_type,
                self.config.test_value,
            )])
        };
        ack_step(NAME, result)
            .with("address", hex(var.address))
            .with("value", self.config.test_value)
            .with(
                "type",
                if self.config.legacy_write {
                    DataType::Float32.name()
                } else {
                    var.data_type.name()
                },
            )
    }

    fn verify_step<R: Read, W: Write>(
        &self,
        client: &mut Client<R, W>,
        var: &VariableDescriptor,
    ) -> StepResult {
        const NAME: &str = "WRITE_VERIFY";
        let target = self.config.test_value;
        match read_value(client, var) {
            Ok((Some(value), _)) => {
                let delta = (value - target).abs();
                StepResult::new(NAME, delta < self.config.tolerance)
                    .with("target", target)
                    .with("value", value)
                    .with("delta", delta)
            }
            Ok((None, _)) => StepResult::failed(NAME, "address missing from reply"),
            Err(err) => StepResult::failed(NAME, err),
        }
    }
}

fn ack_step(name: &str, result: Result<AckPayload>) -> StepResult {
    match result {
        Ok(AckPayload::Structured(ack)) => StepResult::new(name, true)
            .with("ack", "structured")
            .with("for_sequence", ack.for_sequence),
        Ok(AckPayload::Legacy) => StepResult::new(name, true).with("ack", "legacy"),
        Err(err) => StepResult::failed(name, err),
    }
}

fn read_value<R: Read, W: Write>(
    client: &mut Client<R, W>,
    var: &VariableDescriptor,
) -> Result<(Option<f64>, &'static str)> {
    let size = u16::try_from(var.data_type.width()).unwrap_or(4);
    let reply = client.read_mem(&[MemRead {
        address: var.address,
        size,
    }])?;
    let format = format_name(&reply);
    let value = reply
        .items()
        .iter()
        .find(|v| v.address == var.address)
        .and_then(|v| match reply.format() {
            Some(WireFormat::Binary) => var.data_type.decode_value(&v.raw).or_else(|| v.value()),
            _ => v.value(),
        });
    Ok((value, format))
}

fn format_name<T>(decoded: &Decoded<T>) -> &'static str {
    match decoded {
        Decoded::Binary(_) => "binary",
        Decoded::Text(_) => "text",
        Decoded::Unknown => "unknown",
    }
}

fn hex(address: u32) -> String {
    format!("0x{address:08X}")
}

fn round2(value: f64) -> Value {
    json!((value * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_serializes_flat() {
        let step = StepResult::new("PING->ACK", true).with("ack", "legacy");
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json, json!({"name": "PING->ACK", "ok": true, "ack": "legacy"}));
    }

    #[test]
    fn ack_step_outcomes() {
        let ok = ack_step("X", Ok(AckPayload::Legacy));
        assert!(ok.ok);
        let timeout = ack_step("X", Err(crate::PeerError::Timeout(Duration::from_millis(5))));
        assert!(!timeout.ok);
        assert!(timeout.detail["reason"]
            .as_str()
            .unwrap()
            .starts_with("no response"));
    }

    #[test]
    fn defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.test_value, 42.5);
        assert_eq!(config.capture_window, Duration::from_secs(6));
        assert_eq!(config.min_stream_frames, 21);
    }
}
