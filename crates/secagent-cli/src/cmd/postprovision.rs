use crate::cmd::{deploy, health, settings};
use crate::output::{self, print_json};
use anyhow::Context;
use secagent_core::{
    config::Config,
    shell,
    steps::{self, Step, StepDefinition, StepKind},
    template::DeploymentOutputs,
};
use std::path::Path;
use std::time::Duration;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(30);

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let outputs = DeploymentOutputs::load(root).context("failed to load deployment outputs")?;

    let definitions = &config.postprovision.steps;
    let total = definitions.len();
    let plan: Vec<Step<'_>> = definitions
        .iter()
        .map(|def| build_step(root, &config, &outputs, def))
        .collect();

    let results = steps::run_steps(plan, |index, name| {
        output::step(&format!("[{index}/{total}] {name}"));
    })?;

    output::ok(&format!("post-provision complete ({} step(s))", results.len()));
    if json {
        print_json(&results)?;
    }
    Ok(())
}

/// Bind a configured step to the action it names.
fn build_step<'a>(
    root: &'a Path,
    config: &'a Config,
    outputs: &'a DeploymentOutputs,
    def: &'a StepDefinition,
) -> Step<'a> {
    match &def.step_type {
        StepKind::GenerateSettings => Step::new(&def.name, move || {
            settings::generate(root, config, outputs, None).map(|_| ())
        }),
        StepKind::DeployPackage => Step::new(&def.name, move || {
            deploy::build_and_deploy(root, config, outputs, &deploy::DeployArgs::default())
                .map(|_| ())
        }),
        StepKind::HealthCheck { url } => Step::new(&def.name, move || {
            let url = health::health_url(config, outputs, url.clone(), None)?;
            health::check_url(&url, HEALTH_TIMEOUT).map(|_| ())
        }),
        StepKind::Shell {
            command,
            timeout_seconds,
        } => Step::new(&def.name, move || {
            let timeout = Duration::from_secs(u64::from(*timeout_seconds));
            let outcome = shell::run_shell(command, root, timeout)?;
            for stream in [&outcome.stdout, &outcome.stderr] {
                if !stream.trim().is_empty() {
                    eprintln!("{}", stream.trim_end());
                }
            }
            outcome.check(command).map(|_| ())
        }),
    }
}
