use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use linkprobe_peer::{Simulator, SimulatorHandle};
use linkprobe_transport::UnixDomainSocket;
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, SimArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_sim_stats, OutputFormat};

pub fn run(args: SimArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.sim.simulator_config();
    let registry = Arc::new(args.sim.registry()?);
    let socket =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    info!(
        path = %socket.path().display(),
        vars = registry.len(),
        "device listening"
    );

    let running = Arc::new(AtomicBool::new(true));
    let session: Arc<Mutex<Option<SimulatorHandle>>> = Arc::default();
    {
        let running = Arc::clone(&running);
        let session = Arc::clone(&session);
        let wake_path = socket.path().to_path_buf();
        install_ctrlc_handler(move || {
            running.store(false, Ordering::SeqCst);
            if let Some(handle) = lock(&session).as_ref() {
                handle.stop();
            }
            // Unblock a pending accept.
            let _ = UnixDomainSocket::connect(&wake_path);
        })?;
    }

    while running.load(Ordering::SeqCst) {
        let stream = socket
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        info!("host connected");

        let simulator = Simulator::new(config.clone(), Arc::clone(&registry));
        *lock(&session) = Some(simulator.handle());
        let outcome = simulator.run_on(stream);
        *lock(&session) = None;

        match outcome {
            Ok(stats) => print_sim_stats(&stats, format),
            Err(err) => warn!(%err, "session ended with error"),
        }
        if args.once {
            break;
        }
    }

    info!("device stopped");
    Ok(SUCCESS)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
