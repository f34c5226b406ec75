use std::ffi::OsStr;
use std::io::{BufRead, BufReader};
use std::io::{Error, ErrorKind};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use timeout_readwrite::TimeoutReader;

use crate::cmd::command::CommandError::{ExecutionError, ExitStatusError, TimeoutError};

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("Error while executing command: {0}")]
    ExecutionError(#[from] Error),

    #[error("Command terminated with a non success exit status code: {0}")]
    ExitStatusError(ExitStatus),

    #[error("Command killed due to timeout: {0}")]
    TimeoutError(String),
}

/// Decides when a running command has to be killed.
pub struct CommandKiller {
    deadline: Option<(Instant, Duration)>,
}

impl CommandKiller {
    pub fn never() -> CommandKiller {
        CommandKiller { deadline: None }
    }

    pub fn from_timeout(timeout: Duration) -> CommandKiller {
        CommandKiller {
            deadline: Some((Instant::now(), timeout)),
        }
    }

    /// The timeout reached, if it is.
    pub fn should_abort(&self) -> Option<Duration> {
        match self.deadline {
            Some((started_at, timeout)) if started_at.elapsed() >= timeout => Some(timeout),
            _ => None,
        }
    }
}

enum StreamState {
    Open,
    Closed,
}

/// External binary invocation streaming its output line by line.
pub struct ExternalCommand {
    command: Command,
}

impl ExternalCommand {
    pub fn new<P: AsRef<OsStr>>(binary: P, args: &[&str], envs: &[(&str, &str)]) -> ExternalCommand {
        let mut command = Command::new(binary);
        command.args(args);
        command.envs(envs.iter().copied());

        ExternalCommand { command }
    }

    fn kill(cmd_handle: &mut Child) {
        let _ = cmd_handle
            .kill()
            .map(|_| cmd_handle.wait())
            .map_err(|err| error!("Cannot kill process {:?} {}", cmd_handle, err));
    }

    pub fn exec(&mut self) -> Result<(), CommandError> {
        self.exec_with_abort(
            &mut |line| info!("{}", line),
            &mut |line| warn!("{}", line),
            &CommandKiller::never(),
        )
    }

    pub fn exec_with_abort<STDOUT, STDERR>(
        &mut self,
        stdout_output: &mut STDOUT,
        stderr_output: &mut STDERR,
        abort_notifier: &CommandKiller,
    ) -> Result<(), CommandError>
    where
        STDOUT: FnMut(String),
        STDERR: FnMut(String),
    {
        debug!("command: {:?}", self.command);
        let mut cmd_handle = self
            .command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ExecutionError)?;

        let stdout = cmd_handle
            .stdout
            .take()
            .ok_or_else(|| ExecutionError(Error::new(ErrorKind::BrokenPipe, "Cannot get stdout for command")))?;
        let mut stdout_reader = BufReader::new(TimeoutReader::new(stdout, Duration::from_secs(1))).lines();

        // don't block on stderr
        let stderr = cmd_handle
            .stderr
            .take()
            .ok_or_else(|| ExecutionError(Error::new(ErrorKind::BrokenPipe, "Cannot get stderr for command")))?;
        let mut stderr_reader = BufReader::new(TimeoutReader::new(stderr, Duration::from_secs(0))).lines();

        let mut stdout_state = StreamState::Open;
        let mut stderr_state = StreamState::Open;
        while matches!(stdout_state, StreamState::Open) || matches!(stderr_state, StreamState::Open) {
            if abort_notifier.should_abort().is_some() {
                break;
            }

            if matches!(stdout_state, StreamState::Open) {
                stdout_state = self.forward_available_lines(&mut stdout_reader, stdout_output, abort_notifier);
            }
            if matches!(stderr_state, StreamState::Open) {
                stderr_state = self.forward_available_lines(&mut stderr_reader, stderr_output, abort_notifier);
            }
        }

        // the process may still be running after closing its outputs
        let exit_status = loop {
            match cmd_handle.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Some(timeout) = abort_notifier.should_abort() {
                        let msg = format!(
                            "Killing process {:?} due to timeout {}s reached",
                            self.command,
                            timeout.as_secs()
                        );
                        warn!("{}", msg);
                        Self::kill(&mut cmd_handle);
                        return Err(TimeoutError(msg));
                    }
                }
                Err(err) => return Err(ExecutionError(err)),
            };

            std::thread::sleep(Duration::from_millis(100));
        };

        if !exit_status.success() {
            debug!(
                "command: {:?} terminated with error exit status {:?}",
                self.command, exit_status
            );
            return Err(ExitStatusError(exit_status));
        }

        Ok(())
    }

    fn forward_available_lines<LINES, OUTPUT>(
        &self,
        reader: &mut LINES,
        output: &mut OUTPUT,
        abort_notifier: &CommandKiller,
    ) -> StreamState
    where
        LINES: Iterator<Item = std::io::Result<String>>,
        OUTPUT: FnMut(String),
    {
        loop {
            match reader.next() {
                None => return StreamState::Closed,
                Some(Err(ref err)) if err.kind() == ErrorKind::TimedOut => return StreamState::Open,
                Some(Ok(line)) => output(line),
                Some(Err(err)) => {
                    error!("Error on output of cmd {:?}: {:?}", self.command, err);
                    return StreamState::Closed;
                }
            }

            if abort_notifier.should_abort().is_some() {
                return StreamState::Closed;
            }
        }
    }
}
