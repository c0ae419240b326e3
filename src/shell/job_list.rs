use std::fmt;

use log::debug;
use nix::unistd::Pid;

use crate::error::ShellError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Background,
    Stopped,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Background => write!(f, "background"),
            JobStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// A child process group the shell keeps track of after the prompt returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pid: Pid,
    name: String,
    status: JobStatus,
}

impl Job {
    /// Process id of the group leader, which is also the group id.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.status)
    }
}

/// Jobs in insertion order. Indices are positions, not identities: removing
/// job 0 turns job 1 into job 0.
#[derive(Debug, Default)]
pub struct JobList {
    jobs: Vec<Job>,
}

impl JobList {
    pub fn new() -> Self {
        JobList { jobs: Vec::new() }
    }

    pub fn add(&mut self, pid: Pid, name: &str, status: JobStatus) -> Result<(), ShellError> {
        self.jobs.try_reserve(1)?;
        debug!("Tracking job {} ({}) as {}", pid, name, status);
        self.jobs.push(Job {
            pid,
            name: name.to_string(),
            status,
        });
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Job> {
        self.jobs.get_mut(index)
    }

    pub fn remove(&mut self, index: usize) -> Option<Job> {
        if index >= self.jobs.len() {
            return None;
        }
        let job = self.jobs.remove(index);
        debug!("Forgot job {} ({})", job.pid, job.name);
        Some(job)
    }

    /// Drops every job with the given status and returns how many went.
    pub fn remove_by_status(&mut self, status: JobStatus) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|job| job.status != status);
        let removed = before - self.jobs.len();
        if removed > 0 {
            debug!("Swept {} {} job(s)", removed, status);
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Job)> {
        self.jobs.iter().enumerate()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Job)> {
        self.jobs.iter_mut().enumerate()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
