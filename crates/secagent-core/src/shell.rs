//! Shell commands behind config-defined post-provision steps.

use crate::error::{DeployError, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const MAX_CAPTURE: usize = 10 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Code(i32),
    /// Terminated without an exit code.
    Signal,
    TimedOut(Duration),
}

/// What a step's command did. Each stream keeps at most its last 10KB.
#[derive(Debug, Clone)]
pub struct ShellOutcome {
    pub exit: Exit,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutcome {
    pub fn success(&self) -> bool {
        self.exit == Exit::Code(0)
    }

    /// Last non-blank line of stderr, else of stdout.
    pub fn last_line(&self) -> Option<&str> {
        last_nonblank(&self.stderr).or_else(|| last_nonblank(&self.stdout))
    }

    /// Turn a non-zero exit, signal or timeout into `ShellFailed`.
    pub fn check(self, command: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let mut reason = match self.exit {
            Exit::Code(code) => format!("exited with code {code}"),
            Exit::Signal => "was terminated by a signal".to_string(),
            Exit::TimedOut(after) => format!("timed out after {}s", after.as_secs()),
        };
        if let Some(line) = self.last_line() {
            reason.push_str(": ");
            reason.push_str(line);
        }
        Err(DeployError::ShellFailed {
            command: command.to_string(),
            reason,
        })
    }
}

/// Run `command` with `sh -c` in `cwd`, killing it once `timeout` elapses.
///
/// Only a failure to spawn is an error here; how the command ended is
/// reported in the outcome. A timed-out command's output is not collected,
/// since its descendants may still hold the pipes open.
pub fn run_shell(command: &str, cwd: &Path, timeout: Duration) -> Result<ShellOutcome> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| DeployError::SpawnFailed {
            command: command.to_string(),
            message: e.to_string(),
        })?;
    tracing::debug!(command, pid = child.id(), "started shell step");

    let stdout = capture(child.stdout.take());
    let stderr = capture(child.stderr.take());

    let exit = wait_until(&mut child, timeout)?;
    if let Exit::TimedOut(_) = exit {
        tracing::warn!(command, timeout_secs = timeout.as_secs(), "shell step timed out");
        return Ok(ShellOutcome {
            exit,
            stdout: String::new(),
            stderr: String::new(),
        });
    }

    Ok(ShellOutcome {
        exit,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

fn wait_until(child: &mut Child, timeout: Duration) -> Result<Exit> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(exit_of(status));
        }
        if Instant::now() >= deadline {
            // The child may exit between try_wait and kill; wait reaps either way.
            let _ = child.kill();
            child.wait()?;
            return Ok(Exit::TimedOut(timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn exit_of(status: ExitStatus) -> Exit {
    status.code().map(Exit::Code).unwrap_or(Exit::Signal)
}

fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        tail(&String::from_utf8_lossy(&buf), MAX_CAPTURE).to_string()
    })
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

fn last_nonblank(s: &str) -> Option<&str> {
    s.lines().rev().map(str::trim).find(|l| !l.is_empty())
}
