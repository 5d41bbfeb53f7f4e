//! Resource template deployment.
//!
//! Templates are interpreted by the Azure Resource Manager; this module only
//! hands one over with its parameters and captures the named outputs so later
//! steps (settings generation, deploys) can read endpoints and resource names.

use crate::az::{self, AzRunner};
use crate::error::{DeployError, Result};
use crate::io;
use crate::paths;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TemplateDeployment {
    pub name: String,
    pub resource_group: String,
    pub template_file: PathBuf,
    pub parameters: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// DeploymentOutputs
// ---------------------------------------------------------------------------

/// Flattened template outputs: `name -> value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentOutputs(pub BTreeMap<String, Value>);

impl DeploymentOutputs {
    /// Flatten ARM's `{"name": {"type": "String", "value": ...}}` shape. Entries
    /// without a `value` are kept as-is.
    pub fn from_arm(outputs: &Value) -> Self {
        let mut map = BTreeMap::new();
        if let Some(obj) = outputs.as_object() {
            for (k, v) in obj {
                let value = v.get("value").cloned().unwrap_or_else(|| v.clone());
                map.insert(k.clone(), value);
            }
        }
        Self(map)
    }

    /// Look up an output by name ignoring case and underscores, so a setting
    /// key like `COSMOS_ENDPOINT` finds an output named `cosmosEndpoint`.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let wanted = normalize(key);
        self.0
            .iter()
            .find(|(k, _)| normalize(k) == wanted)
            .and_then(|(_, v)| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::outputs_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        io::atomic_write(&paths::outputs_path(root), data.as_bytes())
    }
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ---------------------------------------------------------------------------
// deploy
// ---------------------------------------------------------------------------

pub fn deploy(runner: &dyn AzRunner, deployment: &TemplateDeployment) -> Result<DeploymentOutputs> {
    if !deployment.template_file.is_file() {
        return Err(DeployError::TemplateNotFound(
            deployment.template_file.display().to_string(),
        ));
    }

    let mut args = az::args([
        "deployment",
        "group",
        "create",
        "--name",
        deployment.name.as_str(),
        "--resource-group",
        deployment.resource_group.as_str(),
    ]);
    args.push("--template-file".into());
    args.push(deployment.template_file.display().to_string());
    if !deployment.parameters.is_empty() {
        args.push("--parameters".into());
        for (k, v) in &deployment.parameters {
            args.push(format!("{k}={v}"));
        }
    }
    args.push("--output".into());
    args.push("json".into());

    tracing::info!(
        deployment = %deployment.name,
        resource_group = %deployment.resource_group,
        "deploying template"
    );
    let stdout = az::run_checked(runner, &args)?;
    let doc: Value = serde_json::from_str(&stdout).map_err(|e| DeployError::AzOutput {
        command: az::display_args(&args),
        message: format!("expected JSON: {e}"),
    })?;
    let outputs = doc
        .pointer("/properties/outputs")
        .map(DeploymentOutputs::from_arm)
        .unwrap_or_default();
    tracing::info!(count = outputs.0.len(), "captured deployment outputs");
    Ok(outputs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
