//! Subprocess invocation of the Azure CLI.
//!
//! Every control-plane call in this crate goes through an [`AzRunner`]. The
//! production runner shells out to `az`; tests substitute a recording fake so
//! argument lists can be asserted without a cloud subscription.
//!
//! `az` signals success only through its exit code. Stdout carries JSON or
//! TSV depending on `--output`; stderr carries the human-readable error.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::{DeployError, Result};

/// Captured result of one `az` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AzOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl AzOutput {
    /// The most useful failure text: stderr when present, else stdout.
    pub fn message(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        text.chars().take(2000).collect()
    }
}

pub trait AzRunner {
    /// Run `az <args>`. Returns `Err` only when the process could not be
    /// started; a non-zero exit is reported through `AzOutput::success`.
    fn run(&self, args: &[String]) -> Result<AzOutput>;
}

/// The real `az` binary, resolved from PATH.
#[derive(Debug, Clone)]
pub struct AzCli {
    bin: PathBuf,
}

impl AzCli {
    pub fn detect() -> Result<Self> {
        let bin = which::which("az").map_err(|_| DeployError::AzNotFound)?;
        Ok(Self { bin })
    }

    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

impl AzRunner for AzCli {
    fn run(&self, args: &[String]) -> Result<AzOutput> {
        tracing::debug!(command = %display_args(args), "running az");
        let output = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DeployError::SpawnFailed {
                command: format!("az {}", display_args(args)),
                message: e.to_string(),
            })?;
        Ok(AzOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run and convert a non-zero exit into [`DeployError::AzFailed`].
pub fn run_checked(runner: &dyn AzRunner, args: &[String]) -> Result<String> {
    let output = runner.run(args)?;
    if !output.success {
        return Err(DeployError::AzFailed {
            command: display_args(args),
            message: output.message(),
        });
    }
    Ok(output.stdout)
}

/// Leading non-flag words of the argument list, enough to identify the
/// command without echoing parameter values.
pub fn display_args(args: &[String]) -> String {
    args.iter()
        .take_while(|a| !a.starts_with('-'))
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
