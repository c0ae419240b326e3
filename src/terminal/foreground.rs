use std::os::unix::io::RawFd;

use log::{debug, warn};
use nix::sys::termios::{self, SetArg, Termios};
use nix::unistd::{self, Pid};

use crate::error::ShellError;

/// Arbitrates which process group owns the terminal.
///
/// Every `hand_to` must be followed by a `reclaim`, on error paths too,
/// or the shell loses its own terminal.
pub trait ForegroundControl {
    fn hand_to(&mut self, pgid: Pid) -> Result<(), ShellError>;
    fn reclaim(&mut self) -> Result<(), ShellError>;
}

/// The terminal on `fd`, usually stdin.
pub struct ControllingTerminal {
    fd: RawFd,
    shell_pgid: Pid,
    modes: Option<Termios>,
}

impl ControllingTerminal {
    pub fn attach(fd: RawFd) -> Self {
        let shell_pgid = unistd::getpgrp();
        let modes = match termios::tcgetattr(fd) {
            Ok(modes) => Some(modes),
            Err(e) => {
                warn!("Could not save terminal modes: {}", e);
                None
            }
        };
        debug!("Attached to terminal fd {} as group {}", fd, shell_pgid);
        ControllingTerminal {
            fd,
            shell_pgid,
            modes,
        }
    }
}

impl ForegroundControl for ControllingTerminal {
    fn hand_to(&mut self, pgid: Pid) -> Result<(), ShellError> {
        debug!("Handing terminal to group {}", pgid);
        unistd::tcsetpgrp(self.fd, pgid).map_err(|source| ShellError::Control {
            action: "tcsetpgrp",
            source,
        })
    }

    fn reclaim(&mut self) -> Result<(), ShellError> {
        debug!("Reclaiming terminal for group {}", self.shell_pgid);
        unistd::tcsetpgrp(self.fd, self.shell_pgid).map_err(|source| ShellError::Control {
            action: "tcsetpgrp",
            source,
        })?;

        // A stopped or crashed program may leave the line discipline in
        // raw mode.
        if let Some(modes) = &self.modes {
            termios::tcsetattr(self.fd, SetArg::TCSADRAIN, modes).map_err(|source| {
                ShellError::Control {
                    action: "tcsetattr",
                    source,
                }
            })?;
        }
        Ok(())
    }
}

/// No controlling terminal, e.g. commands piped into the shell. Foreground
/// jobs are still waited for but nothing is handed over.
pub struct Detached;

impl ForegroundControl for Detached {
    fn hand_to(&mut self, pgid: Pid) -> Result<(), ShellError> {
        debug!("No terminal to hand to group {}", pgid);
        Ok(())
    }

    fn reclaim(&mut self) -> Result<(), ShellError> {
        Ok(())
    }
}
