//! Bounded subprocess execution.
//!
//! Output goes to anonymous temporary files rather than pipes, so a chatty
//! child can never block on a full pipe while the parent polls for exit.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use log::{debug, warn};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

trait ChildExt {
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>>;
}

impl ChildExt for Child {
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        let start = Instant::now();
        loop {
            match self.try_wait()? {
                Some(status) => return Ok(Some(status)),
                None => {
                    if start.elapsed() >= timeout {
                        return Ok(None);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }
}

/// What a finished child left behind.
#[derive(Debug)]
pub(crate) struct Output {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub(crate) enum RunError {
    #[error("could not start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` did not finish within {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("I/O error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl RunError {
    /// `true` when the program itself could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RunError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Run `command` to completion or until `timeout` elapses, killing it then.
pub(crate) fn run_bounded(
    command: &mut Command,
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<Output, RunError> {
    let program = command.get_program().to_string_lossy().into_owned();
    let io_err = |source| RunError::Io {
        program: program.clone(),
        source,
    };

    let mut stdout = tempfile::tempfile().map_err(io_err)?;
    let mut stderr = tempfile::tempfile().map_err(io_err)?;
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::from(stdout.try_clone().map_err(io_err)?))
        .stderr(Stdio::from(stderr.try_clone().map_err(io_err)?));

    debug!(program = program.as_str(), timeout_secs = timeout.as_secs(); "Spawning process");
    let mut child = command.spawn().map_err(|source| RunError::Spawn {
        program: program.clone(),
        source,
    })?;

    // A separate writer keeps a child that never reads stdin from blocking us.
    let writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_string();
            Some(thread::spawn(move || pipe.write_all(input.as_bytes())))
        }
        _ => None,
    };

    let status = match child.wait_timeout(timeout).map_err(io_err)? {
        Some(status) => status,
        None => {
            warn!(program = program.as_str(); "Process timed out, killing it");
            let _ = child.kill();
            let _ = child.wait();
            return Err(RunError::Timeout {
                program: program.clone(),
                timeout,
            });
        }
    };

    if let Some(writer) = writer {
        if let Ok(Err(err)) = writer.join() {
            // The child may exit without draining stdin.
            debug!(err:% = err; "Child did not read all of stdin");
        }
    }

    Ok(Output {
        status,
        stdout: read_back(&mut stdout).map_err(io_err)?,
        stderr: read_back(&mut stderr).map_err(io_err)?,
    })
}

fn read_back(file: &mut File) -> io::Result<String> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_stdin_reaches_child() {
        let mut command = Command::new("cat");
        let output = run_bounded(&mut command, Some("BLOCK 1, 1, 1\n"), Duration::from_secs(10))
            .unwrap();

        assert!(output.status.success());
        assert_eq!(output.stdout, "BLOCK 1, 1, 1\n");
        assert!(output.stderr.is_empty());
    }

    #[test]
    fn test_timeout_kills_child() {
        let mut command = Command::new("sleep");
        command.arg("5");

        let err = run_bounded(&mut command, None, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, RunError::Timeout { .. }));
    }

    #[test]
    fn test_missing_program() {
        let mut command = Command::new("/nonexistent/hsforge-test-program");

        let err = run_bounded(&mut command, None, Duration::from_secs(1)).unwrap_err();
        assert!(err.is_not_found());
    }
}
