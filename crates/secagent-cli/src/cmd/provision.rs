use crate::cmd::{parse_kv, pick};
use crate::output::{self, print_json, print_table};
use anyhow::Context;
use clap::Args;
use secagent_core::{
    az::AzCli,
    config::Config,
    paths,
    template::{self, DeploymentOutputs, TemplateDeployment},
    DeployError,
};
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct ProvisionArgs {
    /// Template file (default: template.file in config)
    #[arg(long)]
    template: Option<PathBuf>,

    /// Target resource group
    #[arg(long, env = "AZURE_RESOURCE_GROUP")]
    resource_group: Option<String>,

    /// Deployment name (default: template.deployment_name in config)
    #[arg(long)]
    deployment_name: Option<String>,

    /// Template parameter as KEY=VALUE; repeatable, overrides config
    #[arg(long = "param", value_parser = parse_kv)]
    params: Vec<(String, String)>,
}

pub fn run(root: &Path, args: ProvisionArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let configured = config.template.as_ref();

    let template_file = args
        .template
        .or_else(|| configured.map(|t| t.file.clone()))
        .ok_or_else(|| DeployError::MissingParameter("--template / template.file".into()))?;
    let resource_group = pick(
        args.resource_group,
        config.azure.resource_group.as_deref(),
        &DeploymentOutputs::default(),
        "AZURE_RESOURCE_GROUP",
        "--resource-group / azure.resource_group",
    )?;

    let mut parameters = configured
        .map(|t| t.parameters.clone())
        .unwrap_or_default();
    parameters.extend(args.params);

    let deployment = TemplateDeployment {
        name: args
            .deployment_name
            .or_else(|| configured.map(|t| t.deployment_name.clone()))
            .unwrap_or_else(|| "secagent".to_string()),
        resource_group,
        template_file: paths::resolve(root, &template_file),
        parameters,
    };

    output::step(&format!(
        "Deploying {} to {}",
        template_file.display(),
        deployment.resource_group
    ));
    let runner = AzCli::detect()?;
    let outputs = template::deploy(&runner, &deployment)?;
    outputs
        .save(root)
        .context("failed to write deployment outputs")?;
    output::ok(&format!(
        "deployment '{}' succeeded; {} output(s) saved to {}",
        deployment.name,
        outputs.0.len(),
        paths::OUTPUTS_FILE
    ));

    if json {
        return print_json(&outputs);
    }
    if !outputs.is_empty() {
        let rows = outputs
            .0
            .iter()
            .map(|(k, v)| {
                let shown = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                vec![k.clone(), shown]
            })
            .collect();
        print_table(&["OUTPUT", "VALUE"], rows);
    }
    Ok(())
}
