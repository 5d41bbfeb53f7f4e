//! Cosmos DB database and container setup through `az cosmosdb sql`.
//!
//! Every run re-issues every create call. The CLI's create commands are
//! idempotent on the service side; a create that reports the resource
//! already exists is treated as success.

use crate::az::{self, AzRunner};
use crate::error::{DeployError, Result};
use crate::paths::validate_name;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATABASE: &str = "securitydata";
pub const DEFAULT_CONTAINER: &str = "incidents";
pub const DEFAULT_PARTITION_KEY: &str = "/id";
pub const DEFAULT_THROUGHPUT: u32 = 400;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    #[serde(default = "default_partition_key")]
    pub partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<u32>,
}

fn default_partition_key() -> String {
    DEFAULT_PARTITION_KEY.to_string()
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            throughput: None,
        }
    }
}

impl std::str::FromStr for ContainerSpec {
    type Err = String;

    /// `name`, `name:/path` or `name:/path:throughput`.
    fn from_str(s: &str) -> std::result::Result<Self, String> {
        let mut parts = s.splitn(3, ':');
        let name = parts.next().unwrap_or("").trim();
        if name.is_empty() {
            return Err(format!("container name cannot be empty in: {s}"));
        }
        let partition_key = parts
            .next()
            .map(|p| p.trim().to_string())
            .unwrap_or_else(default_partition_key);
        let throughput = match parts.next() {
            Some(t) => Some(
                t.trim()
                    .parse::<u32>()
                    .map_err(|_| format!("invalid throughput '{t}' in: {s}"))?,
            ),
            None => None,
        };
        Ok(Self {
            name: name.to_string(),
            partition_key,
            throughput,
        })
    }
}

/// The account and database every container call targets.
#[derive(Debug, Clone)]
pub struct CosmosTarget {
    pub account: String,
    pub resource_group: String,
    pub database: String,
    /// Shared database throughput. `None` leaves throughput to containers.
    pub database_throughput: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Database,
    Container,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureStatus {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureOutcome {
    pub kind: ResourceKind,
    pub name: String,
    pub status: EnsureStatus,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

pub fn ensure_database(runner: &dyn AzRunner, target: &CosmosTarget) -> Result<EnsureOutcome> {
    let mut args = az::args([
        "cosmosdb",
        "sql",
        "database",
        "create",
        "--account-name",
        target.account.as_str(),
        "--resource-group",
        target.resource_group.as_str(),
        "--name",
        target.database.as_str(),
        "--output",
        "none",
    ]);
    if let Some(t) = target.database_throughput {
        args.push("--throughput".into());
        args.push(t.to_string());
    }
    let status = ensure(runner, &args)?;
    tracing::info!(database = %target.database, ?status, "database ensured");
    Ok(EnsureOutcome {
        kind: ResourceKind::Database,
        name: target.database.clone(),
        status,
    })
}

pub fn ensure_container(
    runner: &dyn AzRunner,
    target: &CosmosTarget,
    spec: &ContainerSpec,
) -> Result<EnsureOutcome> {
    let mut args = az::args([
        "cosmosdb",
        "sql",
        "container",
        "create",
        "--account-name",
        target.account.as_str(),
        "--resource-group",
        target.resource_group.as_str(),
        "--database-name",
        target.database.as_str(),
        "--name",
        spec.name.as_str(),
        "--partition-key-path",
        spec.partition_key.as_str(),
        "--output",
        "none",
    ]);
    if let Some(t) = spec.throughput {
        args.push("--throughput".into());
        args.push(t.to_string());
    }
    let status = ensure(runner, &args)?;
    tracing::info!(
        container = %spec.name,
        partition_key = %spec.partition_key,
        ?status,
        "container ensured"
    );
    Ok(EnsureOutcome {
        kind: ResourceKind::Container,
        name: spec.name.clone(),
        status,
    })
}

/// Ensure the database, then each container in order. Input is validated
/// before the first CLI call; the first hard failure aborts the run.
pub fn ensure_all(
    runner: &dyn AzRunner,
    target: &CosmosTarget,
    containers: &[ContainerSpec],
) -> Result<Vec<EnsureOutcome>> {
    validate_name(&target.database)?;
    for spec in containers {
        validate_name(&spec.name)?;
        if !spec.partition_key.starts_with('/') {
            return Err(DeployError::InvalidPartitionKey(spec.partition_key.clone()));
        }
    }

    let mut outcomes = Vec::with_capacity(containers.len() + 1);
    outcomes.push(ensure_database(runner, target)?);
    for spec in containers {
        outcomes.push(ensure_container(runner, target, spec)?);
    }
    Ok(outcomes)
}

fn ensure(runner: &dyn AzRunner, args: &[String]) -> Result<EnsureStatus> {
    let output = runner.run(args)?;
    if output.success {
        return Ok(EnsureStatus::Created);
    }
    let message = output.message();
    if already_exists(&message) {
        tracing::debug!(command = %az::display_args(args), "resource already exists");
        return Ok(EnsureStatus::AlreadyExists);
    }
    Err(DeployError::AzFailed {
        command: az::display_args(args),
        message,
    })
}

fn already_exists(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("already exists") || lower.contains("(conflict)")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
