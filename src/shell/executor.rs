// src/shell/executor.rs
use std::convert::Infallible;
use std::ffi::CString;
use std::os::unix::io::RawFd;

use log::debug;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{self, ForkResult, Pid};

use crate::error::ShellError;
use crate::shell::command_parser::{OutputMode, SimpleCommand};
use crate::shell::signal_handler::SignalHandler;

/// Everything the child needs, converted before `fork` so the child does
/// not allocate on its way to a successful `exec`. Only the failure path
/// formats an error message before `_exit`.
#[derive(Debug)]
pub struct LaunchPlan {
    name: String,
    argv: Vec<CString>,
    input: Option<CString>,
    output: Option<(CString, OutputMode)>,
}

impl LaunchPlan {
    pub fn new(cmd: &SimpleCommand) -> Result<Self, ShellError> {
        let argv = std::iter::once(&cmd.program)
            .chain(cmd.args.iter())
            .map(|word| c_string(word))
            .collect::<Result<Vec<_>, _>>()?;

        let input = cmd.input().map(c_string).transpose()?;
        let output = cmd
            .output()
            .map(|(file, mode)| c_string(file).map(|path| (path, mode)))
            .transpose()?;

        Ok(LaunchPlan {
            name: cmd.program.clone(),
            argv,
            input,
            output,
        })
    }

    /// Name the job is listed under.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn c_string(word: &str) -> Result<CString, ShellError> {
    CString::new(word).map_err(|_| ShellError::Parse(format!("NUL byte in '{}'", word.escape_default())))
}

/// Forks and runs `plan` in the child. Returns the child's pid in the parent.
pub fn spawn(plan: &LaunchPlan) -> Result<Pid, ShellError> {
    debug!("Launching {:?}", plan);

    // SAFETY: the child only makes system calls on data prepared above
    // before it execs or exits.
    match unsafe { unistd::fork() }.map_err(ShellError::Fork)? {
        ForkResult::Parent { child } => {
            debug!("Forked {} as pid {}", plan.name, child);
            Ok(child)
        }
        ForkResult::Child => run_command(plan),
    }
}

fn run_command(plan: &LaunchPlan) -> ! {
    match exec(plan) {
        Ok(never) => match never {},
        Err(err) => eprintln!("{}", err),
    }
    // SAFETY: leave without running the parent's atexit handlers or
    // flushing buffers copied from it.
    unsafe { libc::_exit(1) }
}

fn exec(plan: &LaunchPlan) -> Result<Infallible, ShellError> {
    if let Some(path) = &plan.input {
        let fd = fcntl::open(path.as_c_str(), OFlag::O_RDONLY, Mode::empty())
            .map_err(|source| launch_error("failed to open input file", path, source))?;
        redirect(fd, libc::STDIN_FILENO)?;
    }

    if let Some((path, mode)) = &plan.output {
        let flags = match mode {
            OutputMode::Truncate => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
            OutputMode::Append => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
        };
        let fd = fcntl::open(path.as_c_str(), flags, Mode::S_IRUSR | Mode::S_IWUSR)
            .map_err(|source| launch_error("failed to open output file", path, source))?;
        redirect(fd, libc::STDOUT_FILENO)?;
    }

    SignalHandler::restore_child_defaults().map_err(|source| ShellError::Launch {
        action: "sigaction".to_string(),
        source,
    })?;

    unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(|source| ShellError::Launch {
        action: "setpgid".to_string(),
        source,
    })?;

    let program = &plan.argv[0];
    unistd::execvp(program, &plan.argv)
        .map_err(|source| launch_error("exec", program, source))
}

fn redirect(fd: RawFd, target: RawFd) -> Result<(), ShellError> {
    let result = unistd::dup2(fd, target);
    let _ = unistd::close(fd);
    result.map(drop).map_err(|source| ShellError::Launch {
        action: "dup2".to_string(),
        source,
    })
}

fn launch_error(action: &str, path: &CString, source: nix::Error) -> ShellError {
    ShellError::Launch {
        action: format!("{} {}", action, path.to_string_lossy()),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::command_parser::{tokenize, Redirection};
    use nix::sys::signal::{killpg, Signal};
    use nix::sys::wait::{waitpid, WaitStatus};
    use std::fs;

    fn plan(line: &str) -> LaunchPlan {
        LaunchPlan::new(&SimpleCommand::parse(tokenize(line)).unwrap()).unwrap()
    }

    fn run(line: &str) -> WaitStatus {
        let pid = spawn(&plan(line)).unwrap();
        waitpid(pid, None).unwrap()
    }

    #[test]
    fn test_plan_strips_redirections() {
        let plan = plan("sort -r < in.txt >> out.txt");
        assert_eq!(plan.name(), "sort");
        assert_eq!(plan.argv, vec![CString::new("sort").unwrap(), CString::new("-r").unwrap()]);
        assert_eq!(plan.input, Some(CString::new("in.txt").unwrap()));
        assert_eq!(plan.output, Some((CString::new("out.txt").unwrap(), OutputMode::Append)));
    }

    #[test]
    fn test_plan_rejects_nul() {
        let cmd = SimpleCommand::parse(vec!["echo".to_string(), "a\0b".to_string()]).unwrap();
        assert!(matches!(LaunchPlan::new(&cmd), Err(ShellError::Parse(_))));
    }

    #[test]
    fn test_exit_status_is_reported() {
        assert!(matches!(run("true"), WaitStatus::Exited(_, 0)));
        assert!(matches!(run("false"), WaitStatus::Exited(_, 1)));
    }

    #[test]
    fn test_child_leads_its_own_group() {
        let pid = spawn(&plan("sleep 5")).unwrap();
        // The child sets its own group before exec; give it a moment.
        let mut pgid = unistd::getpgid(Some(pid)).unwrap();
        for _ in 0..100 {
            if pgid == pid {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
            pgid = unistd::getpgid(Some(pid)).unwrap();
        }
        assert_eq!(pgid, pid);
        assert_ne!(pgid, unistd::getpgrp());

        killpg(pid, Signal::SIGKILL).unwrap();
        assert!(matches!(waitpid(pid, None).unwrap(), WaitStatus::Signaled(..)));
    }

    /// Reads the `SigIgn` mask from `/proc` once `pid` has exec'd `comm`.
    fn ignored_mask_after_exec(pid: Pid, comm: &str) -> u64 {
        for _ in 0..500 {
            let exec_done = fs::read_to_string(format!("/proc/{}/comm", pid))
                .map(|name| name.trim_end() == comm)
                .unwrap_or(false);
            if exec_done {
                let status = fs::read_to_string(format!("/proc/{}/status", pid)).unwrap();
                let mask = status
                    .lines()
                    .find_map(|line| line.strip_prefix("SigIgn:"))
                    .unwrap()
                    .trim();
                return u64::from_str_radix(mask, 16).unwrap();
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        panic!("process {} never exec'd {}", pid, comm);
    }

    #[test]
    fn test_child_gets_default_signal_dispositions() {
        let pid = spawn(&plan("sleep 5")).unwrap();
        let ignored = ignored_mask_after_exec(pid, "sleep");

        killpg(pid, Signal::SIGKILL).unwrap();
        waitpid(pid, None).unwrap();

        for sig in [Signal::SIGTTIN, Signal::SIGTTOU, Signal::SIGPIPE] {
            let bit = 1u64 << (sig as i32 - 1);
            assert_eq!(ignored & bit, 0, "{} is still ignored after exec", sig.as_str());
        }
    }

    #[test]
    fn test_closed_pipe_kills_writer_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let err = dir.path().join("err.txt");
        let out = dir.path().join("out.txt");
        // Built by hand: the script needs spaces inside one word.
        let cmd = SimpleCommand {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                format!("yes 2>{} | head -n 1", err.display()),
            ],
            redirections: vec![Redirection::Output(out.display().to_string())],
            background: false,
        };
        let pid = spawn(&LaunchPlan::new(&cmd).unwrap()).unwrap();
        assert!(matches!(waitpid(pid, None).unwrap(), WaitStatus::Exited(_, 0)));

        assert_eq!(fs::read_to_string(&out).unwrap(), "y\n");
        assert_eq!(fs::read_to_string(&err).unwrap(), "");
    }

    #[test]
    fn test_missing_program_exits_nonzero() {
        match run("definitely-not-a-real-program-jobsh") {
            WaitStatus::Exited(_, code) => assert_eq!(code, 1),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_missing_input_file_exits_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        let line = format!("cat < {}", missing.display());
        match run(&line) {
            WaitStatus::Exited(_, code) => assert_eq!(code, 1),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_truncate_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        assert!(matches!(
            run(&format!("echo hi > {}", out.display())),
            WaitStatus::Exited(_, 0)
        ));
        assert!(matches!(
            run(&format!("echo there >> {}", out.display())),
            WaitStatus::Exited(_, 0)
        ));
        assert_eq!(fs::read_to_string(&out).unwrap(), "hi\nthere\n");

        assert!(matches!(
            run(&format!("echo again > {}", out.display())),
            WaitStatus::Exited(_, 0)
        ));
        assert_eq!(fs::read_to_string(&out).unwrap(), "again\n");
    }

    #[test]
    fn test_input_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let out = dir.path().join("out.txt");
        fs::write(&input, "from file\n").unwrap();

        let line = format!("cat < {} > {}", input.display(), out.display());
        assert!(matches!(run(&line), WaitStatus::Exited(_, 0)));
        assert_eq!(fs::read_to_string(&out).unwrap(), "from file\n");
    }
}
