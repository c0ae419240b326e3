use log::debug;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// Signals the terminal driver sends to a background group that touches the
/// terminal. The shell hands the terminal around, so it must not be stopped
/// by them itself.
pub const TERMINAL_STOP_SIGNALS: [Signal; 2] = [Signal::SIGTTIN, Signal::SIGTTOU];

/// Reset to the default in every launched child. SIGPIPE is ignored by the
/// Rust runtime at startup and an ignored disposition survives exec.
pub const CHILD_DEFAULT_SIGNALS: [Signal; 3] = [Signal::SIGTTIN, Signal::SIGTTOU, Signal::SIGPIPE];

pub struct SignalHandler;

impl SignalHandler {
    /// Installed once at startup and kept for the life of the shell.
    pub fn ignore_terminal_stops() -> Result<(), nix::Error> {
        debug!("Ignoring SIGTTIN and SIGTTOU");
        Self::set_disposition(&TERMINAL_STOP_SIGNALS, SigHandler::SigIgn)
    }

    /// Runs in a forked child before exec so the new program can be stopped
    /// by the terminal like any other job, and dies quietly on a closed pipe.
    pub fn restore_child_defaults() -> Result<(), nix::Error> {
        Self::set_disposition(&CHILD_DEFAULT_SIGNALS, SigHandler::SigDfl)
    }

    fn set_disposition(signals: &[Signal], handler: SigHandler) -> Result<(), nix::Error> {
        let action = SigAction::new(handler, SaFlags::empty(), SigSet::all());
        for &sig in signals {
            // SAFETY: SigIgn and SigDfl install no Rust handler code.
            unsafe { signal::sigaction(sig, &action)? };
        }
        Ok(())
    }
}
