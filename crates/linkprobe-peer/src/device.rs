//! Simulated device: answers the command set and streams samples.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use linkprobe_frame::{
    command_name, CommandId, DecodeStats, FaultConfig, FaultInjector, Frame, FrameError,
    FrameReader, FrameWriter, TxStats,
};
use linkprobe_payload::{
    control::ACK_BAD_PAYLOAD, memory, stream, vartable, Ack, MemValue, StreamConfig,
    StreamSample, WireFormat,
};
use linkprobe_transport::LinkStream;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::registry::VariableRegistry;
use crate::sequence::SequenceCounter;
use crate::streaming::{synth_sample, StreamMode, StreamPacer};

/// Simulator behavior.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Initial stream configuration.
    pub stream: StreamConfig,
    /// Stream from startup without waiting for `STREAM_START`.
    pub auto_stream: bool,
    pub stream_mode: StreamMode,
    pub faults: FaultConfig,
    pub var_table_format: WireFormat,
    pub read_format: WireFormat,
    /// Reply with empty ack payloads.
    pub legacy_acks: bool,
    /// Log every received frame at info level.
    pub echo_rx: bool,
    /// Read timeout of the command loop.
    pub poll_interval: Duration,
    /// Writes that block longer than this are abandoned and counted.
    pub write_timeout: Duration,
    pub stats_interval: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            auto_stream: false,
            stream_mode: StreamMode::Binary,
            faults: FaultConfig::default(),
            var_table_format: WireFormat::Text,
            read_format: WireFormat::Text,
            legacy_acks: false,
            echo_rx: false,
            poll_interval: Duration::from_millis(10),
            write_timeout: Duration::from_millis(50),
            stats_interval: Duration::from_secs(1),
        }
    }
}

/// A frame the simulator sends in response to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub command: CommandId,
    pub payload: Vec<u8>,
}

/// Counters reported when a simulator run ends.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SimulatorStats {
    pub rx_frames: u64,
    pub tx_frames: u64,
    pub dropped_frames: u64,
    pub corrupted_frames: u64,
    pub write_failures: u64,
    pub rx_crc_errors: u64,
    pub rx_discarded_bytes: u64,
}

impl SimulatorStats {
    fn collect(rx_frames: u64, tx: TxStats, rx: DecodeStats) -> Self {
        Self {
            rx_frames,
            tx_frames: tx.frames_sent,
            dropped_frames: tx.frames_dropped,
            corrupted_frames: tx.frames_corrupted,
            write_failures: tx.write_failures,
            rx_crc_errors: rx.crc_errors,
            rx_discarded_bytes: rx.discarded_bytes,
        }
    }
}

#[derive(Debug)]
struct SimState {
    running: AtomicBool,
    streaming: AtomicBool,
    channel_count: AtomicU8,
    rate_hz: AtomicU16,
    rx_frames: AtomicU64,
    sequence: SequenceCounter,
}

/// Stops a running [`Simulator`] from another thread.
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    state: Arc<SimState>,
}

impl SimulatorHandle {
    pub fn stop(&self) {
        self.state.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }
}

/// Device simulator.
///
/// [`handle_frame`](Self::handle_frame) is the whole command protocol;
/// [`run`](Self::run) drives it from a link alongside the stream producer.
pub struct Simulator {
    config: SimulatorConfig,
    registry: Arc<VariableRegistry>,
    state: Arc<SimState>,
    started: Instant,
}

impl Simulator {
    pub fn new(config: SimulatorConfig, registry: Arc<VariableRegistry>) -> Self {
        let stream = config.stream.normalized();
        let state = SimState {
            running: AtomicBool::new(true),
            streaming: AtomicBool::new(config.auto_stream),
            channel_count: AtomicU8::new(stream.channel_count),
            rate_hz: AtomicU16::new(stream.stream_rate_hz),
            rx_frames: AtomicU64::new(0),
            sequence: SequenceCounter::new(),
        };
        Self {
            config,
            registry,
            state: Arc::new(state),
            started: Instant::now(),
        }
    }

    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn registry(&self) -> &Arc<VariableRegistry> {
        &self.registry
    }

    pub fn is_streaming(&self) -> bool {
        self.state.streaming.load(Ordering::SeqCst)
    }

    /// Current stream configuration.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            channel_count: self.state.channel_count.load(Ordering::Relaxed),
            stream_rate_hz: self.state.rate_hz.load(Ordering::Relaxed),
        }
    }

    /// Apply one received frame and build the response, if any.
    ///
    /// `ACK`, `STREAM_DATA` and unknown commands are ignored.
    pub fn handle_frame(&self, frame: &Frame) -> Option<Reply> {
        self.state.rx_frames.fetch_add(1, Ordering::Relaxed);
        if self.config.echo_rx {
            info!(
                command = command_name(frame.command),
                sequence = frame.sequence,
                len = frame.payload.len(),
                "rx"
            );
        }

        let Ok(command) = frame.command_id() else {
            debug!(command = frame.command, "ignoring unknown command");
            return None;
        };
        match command {
            CommandId::Ping => Some(self.ack(frame, 0)),
            CommandId::StreamStart => {
                self.state.streaming.store(true, Ordering::SeqCst);
                info!("stream on");
                Some(self.ack(frame, 0))
            }
            CommandId::StreamStop => {
                self.state.streaming.store(false, Ordering::SeqCst);
                info!("stream off");
                Some(self.ack(frame, 0))
            }
            CommandId::SetStreamConfig => match StreamConfig::decode(&frame.payload) {
                Ok(config) => {
                    let config = config.normalized();
                    self.state
                        .channel_count
                        .store(config.channel_count, Ordering::Relaxed);
                    self.state
                        .rate_hz
                        .store(config.stream_rate_hz, Ordering::Relaxed);
                    info!(
                        channels = config.channel_count,
                        rate_hz = config.stream_rate_hz,
                        "stream configured"
                    );
                    Some(self.ack(frame, 0))
                }
                Err(err) => {
                    warn!(%err, "bad stream config");
                    if self.config.legacy_acks {
                        None
                    } else {
                        Some(self.ack(frame, ACK_BAD_PAYLOAD))
                    }
                }
            },
            CommandId::GetVarTable => Some(Reply {
                command: CommandId::GetVarTable,
                payload: vartable::encode(
                    &self.registry.descriptors(),
                    self.config.var_table_format,
                ),
            }),
            CommandId::ReadMemBatch => {
                let values: Vec<MemValue> = memory::decode_read_request(&frame.payload)
                    .into_iter()
                    .filter_map(|req| {
                        let (data_type, value) = self.registry.read(req.address)?;
                        Some(match self.config.read_format {
                            WireFormat::Binary => MemValue::typed(req.address, data_type, value),
                            WireFormat::Text => MemValue::from_f64(req.address, value),
                        })
                    })
                    .collect();
                Some(Reply {
                    command: CommandId::ReadMemBatch,
                    payload: memory::encode_read_reply(&values, self.config.read_format),
                })
            }
            CommandId::WriteMem => {
                for write in memory::decode_write_request(&frame.payload) {
                    if !self.registry.write(write.address, &write.raw) {
                        debug!(address = write.address, "write ignored");
                    }
                }
                Some(self.ack(frame, 0))
            }
            CommandId::Ack | CommandId::StreamData => None,
        }
    }

    fn ack(&self, frame: &Frame, status: u8) -> Reply {
        let payload = if self.config.legacy_acks {
            Vec::new()
        } else {
            Ack::with_status(status, frame.command, frame.sequence).encode()
        };
        Reply {
            command: CommandId::Ack,
            payload,
        }
    }

    /// Serve one duplex link until it closes or the simulator is stopped.
    pub fn run_on(&self, stream: LinkStream) -> Result<SimulatorStats> {
        let read_half = stream.try_clone()?;
        let reader = FrameReader::with_read_timeout(read_half, self.config.poll_interval)?;
        let writer = FrameWriter::with_write_timeout(stream, self.config.write_timeout)?;
        self.run(reader, writer)
    }

    /// Run the command loop on this thread and the stream producer on a
    /// second one, until the link closes or [`SimulatorHandle::stop`].
    ///
    /// Both loops share `writer` behind one lock so frames never interleave.
    /// Write failures are counted, never fatal.
    pub fn run<R, W>(
        &self,
        mut reader: FrameReader<R>,
        mut writer: FrameWriter<W>,
    ) -> Result<SimulatorStats>
    where
        R: Read,
        W: Write + Send,
    {
        if self.config.faults.is_active() {
            writer.set_fault_injector(Some(FaultInjector::new(self.config.faults)));
        }
        let writer = Mutex::new(writer);
        let stream = self.stream_config();
        info!(
            channels = stream.channel_count,
            rate_hz = stream.stream_rate_hz,
            mode = ?self.config.stream_mode,
            vars = self.registry.len(),
            "simulator running"
        );

        let outcome = std::thread::scope(|scope| {
            let streamer = scope.spawn(|| self.stream_loop(&writer));
            let outcome = self.command_loop(&mut reader, &writer);
            self.state.running.store(false, Ordering::SeqCst);
            if streamer.join().is_err() {
                warn!("stream producer panicked");
            }
            outcome
        });

        let stats = SimulatorStats::collect(
            self.state.rx_frames.load(Ordering::Relaxed),
            lock(&writer).stats(),
            reader.stats(),
        );
        info!(
            rx = stats.rx_frames,
            tx = stats.tx_frames,
            write_failures = stats.write_failures,
            "simulator stopped"
        );
        outcome.map(|()| stats)
    }

    fn command_loop<R: Read, W: Write>(
        &self,
        reader: &mut FrameReader<R>,
        writer: &Mutex<FrameWriter<W>>,
    ) -> Result<()> {
        let mut last_report = Instant::now();
        let mut last_tx = 0u64;
        let mut last_rx = 0u64;

        while self.state.running.load(Ordering::SeqCst) {
            self.registry.tick();
            match reader.poll_frame() {
                Ok(Some(frame)) => {
                    if let Some(reply) = self.handle_frame(&frame) {
                        self.send(writer, reply.command, &reply.payload);
                    }
                }
                Ok(None) => {}
                Err(FrameError::ConnectionClosed) => {
                    info!("link closed");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }

            let elapsed = last_report.elapsed();
            if elapsed >= self.config.stats_interval {
                let tx = lock(writer).stats();
                let rx = self.state.rx_frames.load(Ordering::Relaxed);
                let secs = elapsed.as_secs_f64();
                info!(
                    tx_fps = format_args!("{:.1}", (tx.frames_sent - last_tx) as f64 / secs),
                    rx_fps = format_args!("{:.1}", (rx - last_rx) as f64 / secs),
                    stream = if self.is_streaming() { "on" } else { "off" },
                    write_failures = tx.write_failures,
                    dropped = tx.frames_dropped,
                    corrupted = tx.frames_corrupted,
                    vars = self.registry.len(),
                    "simulator stats"
                );
                last_tx = tx.frames_sent;
                last_rx = rx;
                last_report = Instant::now();
            }
        }
        Ok(())
    }

    fn stream_loop<W: Write>(&self, writer: &Mutex<FrameWriter<W>>) {
        let mut rate = self.state.rate_hz.load(Ordering::Relaxed);
        let mut pacer = StreamPacer::new(rate);
        while self.state.running.load(Ordering::SeqCst) {
            let current = self.state.rate_hz.load(Ordering::Relaxed);
            if current != rate {
                rate = current;
                pacer.set_rate(rate, Instant::now());
            }
            if self.is_streaming() {
                self.emit_sample(writer);
            }
            pacer.wait();
        }
        debug!(resets = pacer.resets(), "stream producer stopped");
    }

    fn emit_sample<W: Write>(&self, writer: &Mutex<FrameWriter<W>>) {
        let channels = usize::from(self.state.channel_count.load(Ordering::Relaxed));
        let values = synth_sample(self.started.elapsed().as_secs_f64(), channels);
        match self.config.stream_mode {
            StreamMode::Binary => {
                let sample = StreamSample::from_values(unix_micros(), &values);
                self.send(writer, CommandId::StreamData, &stream::encode(&sample));
            }
            StreamMode::Csv => {
                let line = stream::encode_csv_line(&values);
                if let Err(err) = lock(writer).send_raw(line.as_bytes()) {
                    debug!(%err, "stream line not sent");
                }
            }
        }
    }

    fn send<W: Write>(&self, writer: &Mutex<FrameWriter<W>>, command: CommandId, payload: &[u8]) {
        let sequence = self.state.sequence.next();
        if let Err(err) = lock(writer).send(command.code(), sequence, payload) {
            debug!(command = command.name(), sequence, %err, "frame not sent");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use linkprobe_payload::{AckPayload, DataType, Decoded, MemRead};

    use super::*;

    fn sim(config: SimulatorConfig) -> Simulator {
        Simulator::new(config, Arc::new(VariableRegistry::default()))
    }

    fn request(command: CommandId, sequence: u16, payload: Vec<u8>) -> Frame {
        Frame::new(command, sequence, payload)
    }

    #[test]
    fn ping_gets_structured_ack() {
        let sim = sim(SimulatorConfig::default());
        let reply = sim.handle_frame(&request(CommandId::Ping, 7, vec![])).unwrap();
        assert_eq!(reply.command, CommandId::Ack);
        assert_eq!(
            AckPayload::parse(&reply.payload),
            AckPayload::Structured(Ack::ok(0x01, 7))
        );
    }

    #[test]
    fn legacy_acks_are_empty() {
        let sim = sim(SimulatorConfig {
            legacy_acks: true,
            ..SimulatorConfig::default()
        });
        let reply = sim.handle_frame(&request(CommandId::Ping, 1, vec![])).unwrap();
        assert!(reply.payload.is_empty());
        assert!(sim
            .handle_frame(&request(CommandId::SetStreamConfig, 2, vec![1]))
            .is_none());
    }

    #[test]
    fn stream_toggles() {
        let sim = sim(SimulatorConfig::default());
        assert!(!sim.is_streaming());
        sim.handle_frame(&request(CommandId::StreamStart, 1, vec![]));
        assert!(sim.is_streaming());
        sim.handle_frame(&request(CommandId::StreamStop, 2, vec![]));
        assert!(!sim.is_streaming());
    }

    #[test]
    fn stream_config_full_and_legacy() {
        let sim = sim(SimulatorConfig::default());
        let config = StreamConfig {
            channel_count: 8,
            stream_rate_hz: 500,
        };
        sim.handle_frame(&request(CommandId::SetStreamConfig, 1, config.encode()));
        assert_eq!(sim.stream_config(), config);

        sim.handle_frame(&request(CommandId::SetStreamConfig, 2, vec![0, 50]));
        assert_eq!(
            sim.stream_config(),
            StreamConfig {
                channel_count: 1,
                stream_rate_hz: 50
            }
        );

        let reply = sim
            .handle_frame(&request(CommandId::SetStreamConfig, 3, vec![9]))
            .unwrap();
        match AckPayload::parse(&reply.payload) {
            AckPayload::Structured(ack) => assert_eq!(ack.status, ACK_BAD_PAYLOAD),
            AckPayload::Legacy => panic!("expected structured ack"),
        }
    }

    #[test]
    fn var_table_in_configured_format() {
        let sim = sim(SimulatorConfig {
            var_table_format: WireFormat::Binary,
            ..SimulatorConfig::default()
        });
        let reply = sim.handle_frame(&request(CommandId::GetVarTable, 1, vec![])).unwrap();
        assert_eq!(reply.command, CommandId::GetVarTable);
        match vartable::decode(&reply.payload) {
            Decoded::Binary(vars) => assert_eq!(vars.len(), 4),
            other => panic!("expected binary table, got {other:?}"),
        }
    }

    #[test]
    fn write_then_read_text_and_binary() {
        for format in [WireFormat::Text, WireFormat::Binary] {
            let sim = sim(SimulatorConfig {
                read_format: format,
                ..SimulatorConfig::default()
            });
            let write = memory::encode_write_request(&[MemValue::typed(
                0x2000_1000,
                DataType::Float32,
                42.5,
            )]);
            let ack = sim.handle_frame(&request(CommandId::WriteMem, 1, write)).unwrap();
            assert_eq!(ack.command, CommandId::Ack);
            sim.registry().tick();

            let read = memory::encode_read_request(&[
                MemRead {
                    address: 0x2000_1000,
                    size: 4,
                },
                MemRead {
                    address: 0x9999,
                    size: 4,
                },
            ]);
            let reply = sim.handle_frame(&request(CommandId::ReadMemBatch, 2, read)).unwrap();
            let decoded = memory::decode_read_reply(&reply.payload);
            assert_eq!(decoded.format(), Some(format));
            assert_eq!(decoded.items().len(), 1);
            assert_eq!(decoded.items()[0].value(), Some(42.5));
        }
    }

    #[test]
    fn legacy_write_is_applied() {
        let sim = sim(SimulatorConfig::default());
        let write = memory::encode_write_request_legacy(&[(0x2000_1008, 42.5)]);
        sim.handle_frame(&request(CommandId::WriteMem, 1, write));
        assert_eq!(
            sim.registry().read(0x2000_1008),
            Some((DataType::Float32, 42.5))
        );
    }

    #[test]
    fn ignored_frames() {
        let sim = sim(SimulatorConfig::default());
        assert!(sim.handle_frame(&request(CommandId::Ack, 1, vec![])).is_none());
        assert!(sim
            .handle_frame(&request(CommandId::StreamData, 1, vec![0; 8]))
            .is_none());
        assert!(sim.handle_frame(&Frame::new(0x7Fu8, 1, Vec::new())).is_none());
    }

    #[test]
    fn run_ends_when_link_closes() {
        let (device, host) = LinkStream::pair().unwrap();
        let sim = sim(SimulatorConfig {
            auto_stream: true,
            ..SimulatorConfig::default()
        });
        let handle = sim.handle();
        let worker = std::thread::spawn(move || sim.run_on(device));
        std::thread::sleep(Duration::from_millis(100));
        drop(host);
        let stats = worker.join().unwrap().unwrap();
        assert!(!handle.is_running());
        assert_eq!(stats.rx_frames, 0);
    }

    #[test]
    fn stop_handle_ends_run() {
        let (device, _host) = LinkStream::pair().unwrap();
        let sim = sim(SimulatorConfig::default());
        let handle = sim.handle();
        let worker = std::thread::spawn(move || sim.run_on(device));
        std::thread::sleep(Duration::from_millis(50));
        handle.stop();
        assert!(worker.join().unwrap().is_ok());
    }
}
