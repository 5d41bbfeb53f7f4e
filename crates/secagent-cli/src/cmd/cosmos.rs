use crate::cmd::pick;
use crate::output::{self, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use secagent_core::{
    az::AzCli,
    config::Config,
    cosmos::{self, ContainerSpec, CosmosTarget, EnsureStatus},
    template::DeploymentOutputs,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum CosmosSubcommand {
    /// Create the database and containers; existing ones are left alone
    Setup {
        /// Cosmos DB account name
        #[arg(long, env = "COSMOS_ACCOUNT_NAME")]
        account: Option<String>,

        /// Resource group holding the account
        #[arg(long, env = "AZURE_RESOURCE_GROUP")]
        resource_group: Option<String>,

        /// Database name (default: cosmos.database in config)
        #[arg(long)]
        database: Option<String>,

        /// Shared database throughput in RU/s
        #[arg(long)]
        throughput: Option<u32>,

        /// Container as NAME[:/PARTITION/KEY[:THROUGHPUT]]; repeatable,
        /// replaces the configured list
        #[arg(long = "container")]
        containers: Vec<ContainerSpec>,
    },
}

pub fn run(root: &Path, subcmd: CosmosSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CosmosSubcommand::Setup {
            account,
            resource_group,
            database,
            throughput,
            containers,
        } => setup(
            root,
            account,
            resource_group,
            database,
            throughput,
            containers,
            json,
        ),
    }
}

fn setup(
    root: &Path,
    account: Option<String>,
    resource_group: Option<String>,
    database: Option<String>,
    throughput: Option<u32>,
    containers: Vec<ContainerSpec>,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let outputs = DeploymentOutputs::load(root).context("failed to load deployment outputs")?;

    let target = CosmosTarget {
        account: pick(
            account,
            config.cosmos.account.as_deref(),
            &outputs,
            "COSMOS_ACCOUNT_NAME",
            "--account / cosmos.account",
        )?,
        resource_group: pick(
            resource_group,
            config.azure.resource_group.as_deref(),
            &outputs,
            "AZURE_RESOURCE_GROUP",
            "--resource-group / azure.resource_group",
        )?,
        database: database.unwrap_or_else(|| config.cosmos.database.clone()),
        database_throughput: throughput.or(config.cosmos.throughput),
    };
    let containers = if containers.is_empty() {
        config.cosmos.containers.clone()
    } else {
        containers
    };

    output::step(&format!(
        "Ensuring database '{}' on account '{}'",
        target.database, target.account
    ));
    let runner = AzCli::detect()?;
    let outcomes = cosmos::ensure_all(&runner, &target, &containers)?;

    for o in &outcomes {
        match o.status {
            EnsureStatus::Created => output::ok(&format!("{:?} '{}' created", o.kind, o.name)),
            EnsureStatus::AlreadyExists => {
                output::ok(&format!("{:?} '{}' already exists", o.kind, o.name))
            }
        }
    }

    if json {
        return print_json(&outcomes);
    }
    let rows = outcomes
        .iter()
        .map(|o| {
            let status = match o.status {
                EnsureStatus::Created => "created",
                EnsureStatus::AlreadyExists => "exists",
            };
            vec![format!("{:?}", o.kind).to_lowercase(), o.name.clone(), status.to_string()]
        })
        .collect();
    print_table(&["KIND", "NAME", "STATUS"], rows);
    Ok(())
}
