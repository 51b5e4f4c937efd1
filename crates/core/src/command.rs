//! Process spawning seam shared by the host engines.

use crate::error::{Error, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed or terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput>;
}

/// Runs the command and returns stdout, or an `Operation` error carrying stderr.
pub fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<String> {
    let output = runner.run(program, args, timeout)?;
    if output.success() {
        Ok(output.stdout)
    } else {
        Err(Error::Operation(format!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            output.stderr.trim()
        )))
    }
}

/// Spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        tracing::debug!(program, ?args, "spawning");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Operation(format!("run {program}: {e}")))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            thread::sleep(Duration::from_millis(20));
        };

        let stdout = stdout.map(join_drain).unwrap_or_default();
        let stderr = stderr.map(join_drain).unwrap_or_default();

        match status {
            Some(status) => Ok(CommandOutput {
                status: status.code(),
                stdout,
                stderr,
            }),
            None => Err(Error::Operation(format!(
                "{program} timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_drain(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn captures_stdout_and_status() {
        let out = SystemRunner
            .run("sh", &["-c", "echo hi; echo oops >&2; exit 3"], DEFAULT_TIMEOUT)
            .unwrap();
        assert_eq!(out.status, Some(3));
        assert_eq!(out.stdout.trim(), "hi");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn kills_on_timeout() {
        let err = SystemRunner
            .run("sleep", &["5"], Duration::from_millis(100))
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn missing_program_is_an_operation_error() {
        let err = SystemRunner
            .run("janus-definitely-not-a-binary", &[], DEFAULT_TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, Error::Operation(_)));
    }

    #[cfg(unix)]
    #[test]
    fn run_checked_surfaces_stderr() {
        let err = run_checked(&SystemRunner, "sh", &["-c", "echo broken >&2; exit 1"], DEFAULT_TIMEOUT)
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
