use std::sync::atomic::Ordering;
use std::time::Instant;

use linkprobe_payload::AckPayload;
use linkprobe_peer::{Client, ClientConfig};
use linkprobe_transport::UnixDomainSocket;
use serde::Serialize;

use crate::cmd::{interrupt_flag, parse_duration, PingArgs};
use crate::exit::{peer_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_ping, OutputFormat};

#[derive(Serialize)]
pub struct PingOutput {
    pub seq: usize,
    pub ack: &'static str,
    pub latency_ms: f64,
}

pub fn run(args: PingArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ClientConfig {
        ack_timeout: parse_duration(&args.timeout)?,
        ..ClientConfig::default()
    };
    let stream = UnixDomainSocket::connect(&args.path)
        .map_err(|err| transport_error("connect failed", err))?;
    let mut client =
        Client::connect(stream, config).map_err(|err| peer_error("link setup failed", err))?;
    let running = interrupt_flag()?;

    for seq in 1..=args.count.max(1) {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let started = Instant::now();
        let ack = client.ping().map_err(|err| peer_error("ping failed", err))?;
        let out = PingOutput {
            seq,
            ack: match ack {
                AckPayload::Structured(_) => "structured",
                AckPayload::Legacy => "legacy",
            },
            latency_ms: (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0,
        };
        print_ping(&out, format);
    }

    Ok(SUCCESS)
}
