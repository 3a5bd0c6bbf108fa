//! SIGINT capture for supervised runs.
//!
//! The attached engine process shares our process group, so Ctrl+C reaches it
//! directly; we only record that it happened.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn handle_sigint(_sig: i32) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Replace the default SIGINT disposition with a flag-setting handler.
#[cfg(unix)]
pub fn install_interrupt_handler() {
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

    let act = SigAction::new(
        SigHandler::Handler(handle_sigint),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe {
        if let Err(e) = signal::sigaction(Signal::SIGINT, &act) {
            tracing::warn!("failed to install SIGINT handler: {e}");
        }
    }
}

#[cfg(not(unix))]
pub fn install_interrupt_handler() {}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

pub fn clear_interrupt() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}
