use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// First Ctrl-C asks the running pipeline to stop at the next stage
/// boundary; a second one exits immediately.
pub(crate) fn install_handler() {
    let installed = ctrlc::set_handler(|| {
        if SHUTDOWN_REQUESTED.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("\ninterrupt received, rolling back after the current stage...");
    });
    if let Err(e) = installed {
        warn!("failed to install interrupt handler: {e}");
    }
}

pub(crate) fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
