use std::fmt;

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};

use crate::error::ShellError;
use crate::shell::executor::{self, LaunchPlan};
use crate::shell::job_list::{Job, JobList, JobStatus};
use crate::terminal::ForegroundControl;

/// How a waited-on process changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Exited(i32),
    Killed(Signal),
    Stopped(Signal),
}

impl StateChange {
    fn from_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(StateChange::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(StateChange::Killed(signal)),
            WaitStatus::Stopped(_, signal) => Some(StateChange::Stopped(signal)),
            _ => None,
        }
    }

    pub fn is_stopped(self) -> bool {
        matches!(self, StateChange::Stopped(_))
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateChange::Exited(code) => write!(f, "exited with status {}", code),
            StateChange::Killed(signal) => write!(f, "killed by {}", signal.as_str()),
            StateChange::Stopped(signal) => write!(f, "stopped by {}", signal.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Foreground,
    Background,
}

/// Moves process groups between the terminal's foreground and the
/// background, and keeps the job list in step with what `waitpid` reports.
pub struct JobControl {
    terminal: Box<dyn ForegroundControl>,
}

impl JobControl {
    pub fn new(terminal: Box<dyn ForegroundControl>) -> Self {
        JobControl { terminal }
    }

    /// Starts `plan` as a new process group. In the foreground this blocks
    /// until the child exits or stops; a stopped child becomes a job.
    pub fn launch(
        &mut self,
        jobs: &mut JobList,
        plan: &LaunchPlan,
        placement: Placement,
    ) -> Result<(), ShellError> {
        let child = executor::spawn(plan)?;
        claim_group(child)?;

        match placement {
            Placement::Background => jobs.add(child, plan.name(), JobStatus::Background),
            Placement::Foreground => {
                if self.in_foreground(child, wait_for_change)?.is_stopped() {
                    jobs.add(child, plan.name(), JobStatus::Stopped)?;
                }
                Ok(())
            }
        }
    }

    /// `fg` and `bg`: continue job `index` in the given placement.
    pub fn resume(
        &mut self,
        jobs: &mut JobList,
        index: usize,
        placement: Placement,
    ) -> Result<(), ShellError> {
        let job = jobs.get(index).ok_or(ShellError::NoSuchJob(index))?;
        let pid = job.pid();

        match placement {
            Placement::Background => {
                signal_group(job, Signal::SIGCONT)?;
                set_status(jobs, index, JobStatus::Background);
            }
            Placement::Foreground => {
                let change = self.in_foreground(pid, |_| {
                    signal_group(job, Signal::SIGCONT)?;
                    wait_for_change(pid)
                })?;
                if change.is_stopped() {
                    set_status(jobs, index, JobStatus::Stopped);
                } else {
                    jobs.remove(index);
                }
            }
        }
        Ok(())
    }

    /// `wait-for`: block until background job `index` exits or stops.
    pub fn wait_for(&mut self, jobs: &mut JobList, index: usize) -> Result<(), ShellError> {
        let job = jobs.get(index).ok_or(ShellError::NoSuchJob(index))?;
        if job.status() != JobStatus::Background {
            return Err(ShellError::JobStopped(index));
        }

        if wait_for_change(job.pid())?.is_stopped() {
            set_status(jobs, index, JobStatus::Stopped);
        } else {
            jobs.remove(index);
        }
        Ok(())
    }

    /// `wait-all`: block on every background job in turn, then drop the
    /// ones that finished. Jobs that stop along the way are kept as stopped.
    /// A job that cannot be waited on is dropped too; the first such error is
    /// returned after the sweep.
    pub fn wait_all(&mut self, jobs: &mut JobList) -> Result<(), ShellError> {
        let mut first_error = None;
        for (index, job) in jobs.iter_mut() {
            if job.status() != JobStatus::Background {
                continue;
            }
            match wait_for_change(job.pid()) {
                Ok(change) if change.is_stopped() => {
                    debug!("Job {} stopped during wait-all", index);
                    job.set_status(JobStatus::Stopped);
                }
                // Finished jobs stay Background and are swept below.
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        jobs.remove_by_status(JobStatus::Background);
        first_error.map_or(Ok(()), Err)
    }

    /// Non-blocking sweep: background jobs that stopped become stopped jobs,
    /// finished jobs are dropped, and so are pids that are no longer our
    /// children.
    pub fn refresh(&mut self, jobs: &mut JobList) -> Result<(), ShellError> {
        let mut finished = Vec::new();
        let mut first_error = None;
        for (index, job) in jobs.iter_mut() {
            match poll_change(job.pid()) {
                Ok(Some(change)) if change.is_stopped() => job.set_status(JobStatus::Stopped),
                Ok(Some(change)) => {
                    debug!("Job {} ({}) {}", index, job.name(), change);
                    finished.push(index);
                }
                Ok(None) => {}
                Err(ShellError::Wait {
                    source: Errno::ECHILD,
                    ..
                }) => {
                    warn!("Job {} ({}) is gone, dropping it", index, job.name());
                    finished.push(index);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        for index in finished.into_iter().rev() {
            jobs.remove(index);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Runs `wait` with `pgid` owning the terminal. The terminal is taken
    /// back even when `wait` fails.
    fn in_foreground<F>(&mut self, pgid: Pid, wait: F) -> Result<StateChange, ShellError>
    where
        F: FnOnce(Pid) -> Result<StateChange, ShellError>,
    {
        self.terminal.hand_to(pgid)?;
        let outcome = wait(pgid);
        self.terminal.reclaim()?;
        outcome
    }
}

/// Sends `signal` to every process in the job's group, not just the leader.
pub fn signal_group(job: &Job, signal: Signal) -> Result<(), ShellError> {
    debug!("Sending {:?} to group {} ({})", signal, job.pid(), job.name());
    killpg(job.pid(), signal).map_err(|source| ShellError::Signal {
        pgid: job.pid(),
        signal,
        source,
    })
}

fn set_status(jobs: &mut JobList, index: usize, status: JobStatus) {
    if let Some(job) = jobs.get_mut(index) {
        job.set_status(status);
    }
}

/// Parent half of putting the child in its own group. Losing the race to a
/// child that already exec'd (EACCES) or already exited (ESRCH) is fine:
/// the child made the same call itself.
fn claim_group(child: Pid) -> Result<(), ShellError> {
    match unistd::setpgid(child, child) {
        Ok(()) => Ok(()),
        Err(Errno::EACCES) | Err(Errno::ESRCH) => {
            debug!("Child {} already set up its process group", child);
            Ok(())
        }
        Err(source) => Err(ShellError::Control {
            action: "setpgid",
            source,
        }),
    }
}

/// Blocks until `pid` exits, is killed, or stops.
fn wait_for_change(pid: Pid) -> Result<StateChange, ShellError> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
            Ok(status) => match StateChange::from_status(status) {
                Some(change) => {
                    debug!("Process {} {}", pid, change);
                    return Ok(change);
                }
                None => debug!("Ignoring {:?} for {}", status, pid),
            },
            Err(Errno::EINTR) => continue,
            Err(source) => {
                warn!("waitpid({}) failed: {}", pid, source);
                return Err(ShellError::Wait { pid, source });
            }
        }
    }
}

fn poll_change(pid: Pid) -> Result<Option<StateChange>, ShellError> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED)) {
            Ok(status) => return Ok(StateChange::from_status(status)),
            Err(Errno::EINTR) => continue,
            Err(source) => return Err(ShellError::Wait { pid, source }),
        }
    }
}
