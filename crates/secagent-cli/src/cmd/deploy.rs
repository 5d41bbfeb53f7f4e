use crate::cmd::{package, pick};
use crate::output::{self, print_json};
use anyhow::Context;
use clap::Args;
use secagent_core::{az::AzCli, config::Config, deploy, paths, template::DeploymentOutputs};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Args, Default)]
pub struct DeployArgs {
    /// Function App name
    #[arg(long, env = "SECAGENT_FUNCTION_APP")]
    pub app: Option<String>,

    /// Resource group holding the Function App
    #[arg(long, env = "AZURE_RESOURCE_GROUP")]
    pub resource_group: Option<String>,

    /// Deploy this existing archive instead of building one
    #[arg(long)]
    pub archive: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeploySummary {
    pub app: String,
    pub resource_group: String,
    pub archive: PathBuf,
}

pub fn run(root: &Path, args: DeployArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let outputs = DeploymentOutputs::load(root).context("failed to load deployment outputs")?;
    let summary = build_and_deploy(root, &config, &outputs, &args)?;
    if json {
        print_json(&summary)?;
    }
    Ok(())
}

/// Resolve the target, build the package unless an archive was given, then
/// zip-deploy it. Target names are resolved before any filesystem work.
pub(crate) fn build_and_deploy(
    root: &Path,
    config: &Config,
    outputs: &DeploymentOutputs,
    args: &DeployArgs,
) -> secagent_core::Result<DeploySummary> {
    let app = pick(
        args.app.clone(),
        config.function_app.name.as_deref(),
        outputs,
        "FUNCTION_APP_NAME",
        "--app / function_app.name",
    )?;
    let resource_group = pick(
        args.resource_group.clone(),
        config.azure.resource_group.as_deref(),
        outputs,
        "AZURE_RESOURCE_GROUP",
        "--resource-group / azure.resource_group",
    )?;

    let archive = match &args.archive {
        Some(a) => paths::resolve(root, a),
        None => package::build(root, config, &package::PackageArgs::default())?.archive,
    };

    output::step(&format!("Deploying {} to {app}", archive.display()));
    let runner = AzCli::detect()?;
    deploy::zip_deploy(&runner, &resource_group, &app, &archive)?;
    output::ok(&format!("deployed to {app}"));

    Ok(DeploySummary {
        app,
        resource_group,
        archive,
    })
}
