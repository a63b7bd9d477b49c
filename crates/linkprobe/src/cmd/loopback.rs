use std::sync::Arc;

use linkprobe_peer::{Client, ComplianceHarness, Simulator};
use linkprobe_transport::LinkStream;
use tracing::{info, warn};

use crate::cmd::test::finish;
use crate::cmd::LoopbackArgs;
use crate::exit::{peer_error, transport_error, CliResult};
use crate::output::OutputFormat;

pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let client_config = args.harness.client_config()?;
    let harness = ComplianceHarness::new(args.harness.harness_config()?);
    let simulator = Simulator::new(
        args.sim.simulator_config(),
        Arc::new(args.sim.registry()?),
    );

    let (device, host) =
        LinkStream::pair().map_err(|err| transport_error("socket pair failed", err))?;
    let mut client =
        Client::connect(host, client_config).map_err(|err| peer_error("link setup failed", err))?;

    let report = std::thread::scope(|scope| {
        let device_thread = scope.spawn(|| simulator.run_on(device));
        let report = harness.run(&mut client);
        // Closing the host side ends the simulator session.
        drop(client);
        match device_thread.join() {
            Ok(Ok(stats)) => info!(
                rx = stats.rx_frames,
                tx = stats.tx_frames,
                dropped = stats.dropped_frames,
                corrupted = stats.corrupted_frames,
                "simulator session finished"
            ),
            Ok(Err(err)) => warn!(%err, "simulator session failed"),
            Err(_) => warn!("simulator thread panicked"),
        }
        report
    });

    finish(&report, args.harness.out.as_deref(), format)
}
