use std::collections::TryReserveError;
use std::io;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use thiserror::Error;

/// Every failure the interpreter can report.
///
/// Whether an error ends the read-eval loop is decided by [`ShellError::is_fatal`];
/// everything else is printed and the loop reprompts.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{action}: {source}")]
    Setup {
        action: &'static str,
        #[source]
        source: Errno,
    },

    #[error("failed to grow job list: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("failed to parse command: {0}")]
    Parse(String),

    #[error("{0}")]
    Usage(String),

    #[error("job index out of bounds: {0}")]
    NoSuchJob(usize),

    #[error("job {0} is stopped, not running in the background")]
    JobStopped(usize),

    #[error("cd: HOME environment variable not set")]
    HomeUnset,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("fork: {0}")]
    Fork(#[source] Errno),

    #[error("{action}: {source}")]
    Launch {
        action: String,
        #[source]
        source: Errno,
    },

    #[error("{action}: {source}")]
    Control {
        action: &'static str,
        #[source]
        source: Errno,
    },

    #[error("failed to send {signal:?} to process group {pgid}: {source}")]
    Signal {
        pgid: Pid,
        signal: Signal,
        #[source]
        source: Errno,
    },

    #[error("waitpid({pid}): {source}")]
    Wait {
        pid: Pid,
        #[source]
        source: Errno,
    },

    #[error("failed to read input: {0}")]
    Input(String),
}

impl ShellError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        ShellError::Io {
            context: context.into(),
            source,
        }
    }

    /// Errors that leave the interpreter unable to guarantee terminal
    /// ownership or its own bookkeeping. These end the loop with a nonzero
    /// exit code.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ShellError::Setup { .. }
                | ShellError::Allocation(_)
                | ShellError::Fork(_)
                | ShellError::Control { .. }
                | ShellError::Input(_)
        )
    }
}
