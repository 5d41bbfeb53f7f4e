use crate::cmd::pick;
use crate::output::{self, print_json};
use anyhow::Context;
use clap::Subcommand;
use secagent_core::{
    az::AzCli,
    config::Config,
    paths,
    rule::{self, AutomationRule, AzCliToken, RuleClient, RuleTarget, StaticToken, TokenSource},
    template::DeploymentOutputs,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Subcommand)]
pub enum RuleSubcommand {
    /// Create or update an automation rule, then read it back to confirm
    Deploy {
        /// Rule definition (JSON)
        #[arg(long)]
        file: PathBuf,

        /// Rule id (default: a fresh UUID)
        #[arg(long)]
        rule_id: Option<String>,

        /// Subscription id
        #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
        subscription: Option<String>,

        /// Resource group holding the workspace
        #[arg(long, env = "AZURE_RESOURCE_GROUP")]
        resource_group: Option<String>,

        /// Log Analytics workspace with Sentinel enabled
        #[arg(long, env = "SENTINEL_WORKSPACE_NAME")]
        workspace: Option<String>,

        /// Management API version (default: sentinel.api_version in config)
        #[arg(long)]
        api_version: Option<String>,

        /// Management endpoint (default: sentinel.management_endpoint in config)
        #[arg(long)]
        endpoint: Option<String>,

        /// Bearer token; when unset, one is requested from the az session
        #[arg(long, env = "SECAGENT_MANAGEMENT_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Seconds to wait before reading the rule back
        #[arg(long)]
        delay_secs: Option<u64>,
    },
}

pub fn run(root: &Path, subcmd: RuleSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        RuleSubcommand::Deploy {
            file,
            rule_id,
            subscription,
            resource_group,
            workspace,
            api_version,
            endpoint,
            token,
            delay_secs,
        } => {
            // A malformed rule must fail before anything touches the network.
            let rule_path = paths::resolve(root, &file);
            let definition = AutomationRule::load(&rule_path)?;

            let config = Config::load(root).context("failed to load config")?;
            let outputs =
                DeploymentOutputs::load(root).context("failed to load deployment outputs")?;
            let sentinel = &config.sentinel;

            let target = RuleTarget {
                endpoint: endpoint.unwrap_or_else(|| sentinel.management_endpoint.clone()),
                subscription_id: pick(
                    subscription,
                    config.azure.subscription_id.as_deref(),
                    &outputs,
                    "AZURE_SUBSCRIPTION_ID",
                    "--subscription / azure.subscription_id",
                )?,
                resource_group: pick(
                    resource_group,
                    config.azure.resource_group.as_deref(),
                    &outputs,
                    "AZURE_RESOURCE_GROUP",
                    "--resource-group / azure.resource_group",
                )?,
                workspace: pick(
                    workspace,
                    sentinel.workspace.as_deref(),
                    &outputs,
                    "SENTINEL_WORKSPACE_NAME",
                    "--workspace / sentinel.workspace",
                )?,
                rule_id: rule::rule_id_or_generate(rule_id.as_deref())?,
                api_version: api_version.unwrap_or_else(|| sentinel.api_version.clone()),
            };
            let delay = Duration::from_secs(delay_secs.unwrap_or(sentinel.validate_delay_secs));

            output::step(&format!(
                "Deploying automation rule '{}' ({})",
                definition.display_name, target.rule_id
            ));

            let client = RuleClient::new(target)?;
            let deployment = match token {
                Some(t) => rule::deploy_rule(&client, &StaticToken(t), &definition, delay)?,
                None => {
                    let runner = AzCli::detect()?;
                    let tokens: &dyn TokenSource = &AzCliToken {
                        runner: &runner,
                        resource: client.target().endpoint.clone(),
                    };
                    rule::deploy_rule(&client, tokens, &definition, delay)?
                }
            };

            match deployment.mismatch_warning() {
                None => output::ok(&format!(
                    "rule '{}' confirmed as '{}'",
                    deployment.rule_id, deployment.display_name
                )),
                Some(w) => output::warn(&w),
            }

            if json {
                print_json(&deployment)?;
            } else {
                println!("{}", deployment.rule_id);
            }
            Ok(())
        }
    }
}
