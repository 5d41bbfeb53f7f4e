pub mod config;
pub mod cosmos;
pub mod deploy;
pub mod health;
pub mod init;
pub mod package;
pub mod postprovision;
pub mod provision;
pub mod rule;
pub mod settings;

use secagent_core::{template::DeploymentOutputs, DeployError};

/// Pick a required value: flag (or its env var), then config, then the
/// captured template outputs. `what` names both places the user can set it.
pub(crate) fn pick(
    flag: Option<String>,
    configured: Option<&str>,
    outputs: &DeploymentOutputs,
    output_key: &str,
    what: &str,
) -> secagent_core::Result<String> {
    flag.filter(|v| !v.trim().is_empty())
        .or_else(|| {
            configured
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string)
        })
        .or_else(|| outputs.lookup(output_key))
        .ok_or_else(|| DeployError::MissingParameter(what.to_string()))
}

/// Parse `key=value`; the value may itself contain `=`.
pub(crate) fn parse_kv(raw: &str) -> Result<(String, String), String> {
    let (k, v) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let k = k.trim();
    if k.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((k.to_string(), v.to_string()))
}
