use crate::cmd::pick;
use crate::output::{self, print_json, print_table};
use anyhow::Context;
use clap::Args;
use secagent_core::{
    config::Config,
    health::{self, HealthReport},
    template::DeploymentOutputs,
};
use std::path::Path;
use std::time::Duration;

#[derive(Args)]
pub struct HealthArgs {
    /// Health endpoint URL (overrides --app)
    #[arg(long)]
    url: Option<String>,

    /// Function App name, checked at https://<app>.azurewebsites.net/api/health
    #[arg(long, env = "SECAGENT_FUNCTION_APP")]
    app: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

pub fn run(root: &Path, args: HealthArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let outputs = DeploymentOutputs::load(root).context("failed to load deployment outputs")?;
    let url = health_url(&config, &outputs, args.url, args.app)?;
    let report = check_url(&url, Duration::from_secs(args.timeout))?;

    if json {
        return print_json(&report);
    }
    let mut rows = vec![vec!["status".to_string(), report.status.clone()]];
    rows.extend(
        report
            .components
            .iter()
            .map(|(k, v)| vec![k.clone(), v.clone()]),
    );
    print_table(&["COMPONENT", "STATUS"], rows);
    Ok(())
}

/// Explicit URL, then configured URL, then the default route for the app.
pub(crate) fn health_url(
    config: &Config,
    outputs: &DeploymentOutputs,
    url: Option<String>,
    app: Option<String>,
) -> secagent_core::Result<String> {
    if let Some(u) = url.or_else(|| config.function_app.health_url.clone()) {
        return Ok(u);
    }
    let app = pick(
        app,
        config.function_app.name.as_deref(),
        outputs,
        "FUNCTION_APP_NAME",
        "--url / --app / function_app.name",
    )?;
    Ok(health::default_health_url(&app))
}

/// A degraded service is reported, not failed.
pub(crate) fn check_url(url: &str, timeout: Duration) -> secagent_core::Result<HealthReport> {
    output::step(&format!("Checking {url}"));
    let report = health::check(url, timeout)?;
    if report.is_healthy() {
        output::ok("service is healthy");
    } else {
        output::warn(&format!("service reports status '{}'", report.status));
    }
    Ok(report)
}
