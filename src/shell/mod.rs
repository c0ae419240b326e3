pub mod builtin;
pub mod command_parser;
pub mod executor;
pub mod job_control;
pub mod job_list;
pub mod signal_handler;

use std::env;
use std::io::{self, Write};

use log::{debug, error};
use nix::unistd;

use crate::config::Config;
use crate::error::ShellError;
use crate::shell::builtin::Builtin;
use crate::shell::command_parser::{tokenize, SimpleCommand};
use crate::shell::executor::LaunchPlan;
use crate::shell::job_control::{JobControl, Placement};
use crate::shell::job_list::JobList;
use crate::terminal::{ControllingTerminal, Detached, LineEditor, LineSource, PipedInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// The read-eval loop. Owns the job list and lends it to the controller
/// for each command.
pub struct Shell<W: Write> {
    input: Box<dyn LineSource>,
    out: W,
    jobs: JobList,
    job_control: JobControl,
}

impl Shell<io::Stdout> {
    /// Wires the shell to the process's stdin and stdout. With a terminal on
    /// stdin the shell edits lines and does job control on it; otherwise it
    /// reads plain lines and foreground jobs never own a terminal.
    pub fn from_stdio(config: &Config) -> Result<Self, ShellError> {
        let interactive = unistd::isatty(libc::STDIN_FILENO).unwrap_or(false);
        debug!("Starting shell (interactive: {})", interactive);

        if interactive {
            Ok(Shell::new(
                Box::new(LineEditor::new(config)?),
                io::stdout(),
                JobControl::new(Box::new(ControllingTerminal::attach(libc::STDIN_FILENO))),
            ))
        } else {
            Ok(Shell::new(
                Box::new(PipedInput::new(io::stdin().lock(), Some(config.prompt.clone()))),
                io::stdout(),
                JobControl::new(Box::new(Detached)),
            ))
        }
    }
}

impl<W: Write> Shell<W> {
    pub fn new(input: Box<dyn LineSource>, out: W, job_control: JobControl) -> Self {
        Shell {
            input,
            out,
            jobs: JobList::new(),
            job_control,
        }
    }

    /// Runs until `exit` or end of input. Returns the first fatal error;
    /// anything else is reported and the loop reprompts.
    pub fn run(&mut self) -> Result<(), ShellError> {
        loop {
            let line = match self.input.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    continue;
                }
            };

            match self.execute_line(&line) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(e) if e.is_fatal() => {
                    error!("Fatal: {}", e);
                    return Err(e);
                }
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        if !self.jobs.is_empty() {
            debug!("Abandoning {} job(s) on exit", self.jobs.len());
        }
        Ok(())
    }

    pub fn execute_line(&mut self, line: &str) -> Result<Flow, ShellError> {
        let tokens = tokenize(line);
        if tokens.is_empty() {
            return Ok(Flow::Continue);
        }

        if let Some(builtin) = Builtin::parse(&tokens) {
            return self.run_builtin(builtin?);
        }

        let command = SimpleCommand::parse(tokens)?;
        let plan = LaunchPlan::new(&command)?;
        let placement = if command.background {
            Placement::Background
        } else {
            Placement::Foreground
        };

        // Anything still buffered would land after the child's output.
        self.out
            .flush()
            .map_err(|e| ShellError::io("failed to flush output", e))?;
        self.job_control.launch(&mut self.jobs, &plan, placement)?;
        Ok(Flow::Continue)
    }

    fn run_builtin(&mut self, builtin: Builtin) -> Result<Flow, ShellError> {
        debug!("Running builtin {:?}", builtin);
        match builtin {
            Builtin::Pwd => {
                let dir = env::current_dir().map_err(|e| ShellError::io("pwd", e))?;
                writeln!(self.out, "{}", dir.display()).map_err(|e| ShellError::io("pwd", e))?;
            }
            Builtin::Cd(dir) => change_dir(dir.as_deref())?,
            Builtin::Exit => return Ok(Flow::Exit),
            Builtin::Jobs => {
                self.job_control.refresh(&mut self.jobs)?;
                for (index, job) in self.jobs.iter() {
                    writeln!(self.out, "{}: {}", index, job)
                        .map_err(|e| ShellError::io("jobs", e))?;
                }
            }
            Builtin::Fg(index) => {
                self.job_control
                    .resume(&mut self.jobs, index, Placement::Foreground)?
            }
            Builtin::Bg(index) => {
                self.job_control
                    .resume(&mut self.jobs, index, Placement::Background)?
            }
            Builtin::WaitFor(index) => self.job_control.wait_for(&mut self.jobs, index)?,
            Builtin::WaitAll => self.job_control.wait_all(&mut self.jobs)?,
        }
        Ok(Flow::Continue)
    }
}

/// `cd [dir]`. Without a directory, or when changing to it fails, goes to
/// `$HOME`.
fn change_dir(dir: Option<&str>) -> Result<(), ShellError> {
    if let Some(dir) = dir {
        match env::set_current_dir(dir) {
            Ok(()) => return Ok(()),
            Err(e) => eprintln!("cd: {}: {}", dir, e),
        }
    }

    let home = env::var_os("HOME").ok_or(ShellError::HomeUnset)?;
    env::set_current_dir(&home)
        .map_err(|e| ShellError::io(format!("cd: {}", home.to_string_lossy()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::job_control::tests::{reap_all, RecordingTerminal};
    use crate::shell::job_list::JobStatus;
    use std::fs;
    use std::io::Cursor;
    use std::sync::Mutex;

    // cd and $HOME are process-wide.
    static CWD_LOCK: Mutex<()> = Mutex::new(());

    fn shell(script: &str) -> (Shell<Vec<u8>>, RecordingTerminal) {
        let terminal = RecordingTerminal::default();
        let shell = Shell::new(
            Box::new(PipedInput::new(Cursor::new(script.to_string()), None)),
            Vec::new(),
            JobControl::new(Box::new(terminal.clone())),
        );
        (shell, terminal)
    }

    fn output(shell: &Shell<Vec<u8>>) -> String {
        String::from_utf8_lossy(&shell.out).into_owned()
    }

    #[test]
    fn test_background_job_listed() {
        let (mut shell, terminal) = shell("sleep 5 &\njobs\nexit\n");
        shell.run().unwrap();

        assert_eq!(output(&shell), "0: sleep (background)\n");
        assert!(terminal.log.borrow().is_empty());

        let mut jobs = std::mem::take(&mut shell.jobs);
        reap_all(&mut jobs);
    }

    #[test]
    fn test_exit_stops_reading() {
        let (mut shell, _) = shell("exit\njobs\nsleep 5 &\n");
        shell.run().unwrap();
        assert!(shell.jobs.is_empty());
        assert_eq!(output(&shell), "");
    }

    #[test]
    fn test_end_of_input_ends_loop() {
        let (mut shell, _) = shell("\n   \n");
        shell.run().unwrap();
        assert!(shell.jobs.is_empty());
    }

    #[test]
    fn test_usage_errors_do_not_end_loop() {
        let (mut shell, _) = shell("fg 3\nbg\nwait-for x\necho >\nsleep 5 &\njobs\n");
        shell.run().unwrap();
        assert_eq!(output(&shell), "0: sleep (background)\n");

        let mut jobs = std::mem::take(&mut shell.jobs);
        reap_all(&mut jobs);
    }

    #[test]
    fn test_stopped_foreground_job_then_next_command() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("after.txt");
        let stopper = dir.path().join("stop.sh");
        fs::write(&stopper, "kill -STOP $$\n").unwrap();
        let script = format!(
            "sh {}\njobs\necho after > {}\n",
            stopper.display(),
            out.display()
        );
        let (mut shell, terminal) = shell(&script);
        shell.run().unwrap();

        assert_eq!(output(&shell), "0: sh (stopped)\n");
        assert_eq!(shell.jobs.get(0).unwrap().status(), JobStatus::Stopped);
        assert_eq!(fs::read_to_string(&out).unwrap(), "after\n");
        assert_eq!(terminal.log.borrow().len(), 4);

        let mut jobs = std::mem::take(&mut shell.jobs);
        reap_all(&mut jobs);
    }

    #[test]
    fn test_redirection_through_shell() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let script = format!(
            "echo hi > {path}\necho there >> {path}\n",
            path = out.display()
        );
        let (mut shell, _) = shell(&script);
        shell.run().unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "hi\nthere\n");
    }

    #[test]
    fn test_wait_all_through_shell() {
        let (mut shell, _) = shell("true &\nsleep 0.1 &\nwait-all\njobs\n");
        shell.run().unwrap();
        assert!(shell.jobs.is_empty());
        assert_eq!(output(&shell), "");
    }

    #[test]
    fn test_pwd_and_cd() {
        let _guard = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let original = env::current_dir().unwrap();
        let original_home = env::var_os("HOME");
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().canonicalize().unwrap();
        let home = target.join("home");
        fs::create_dir(&home).unwrap();
        env::set_var("HOME", &home);

        let (mut shell, _) = shell(&format!(
            "cd {}\npwd\ncd\npwd\ncd {}/missing\npwd\n",
            target.display(),
            target.display()
        ));
        shell.run().unwrap();

        assert_eq!(
            output(&shell),
            format!(
                "{}\n{}\n{}\n",
                target.display(),
                home.display(),
                home.display()
            )
        );

        env::remove_var("HOME");
        assert!(matches!(change_dir(None), Err(ShellError::HomeUnset)));

        match original_home {
            Some(value) => env::set_var("HOME", value),
            None => env::remove_var("HOME"),
        }
        env::set_current_dir(original).unwrap();
    }
}
