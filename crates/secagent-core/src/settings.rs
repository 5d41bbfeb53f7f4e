//! Function App settings generation (`local.settings.json`).
//!
//! Values are layered, later sources winning:
//! built-in defaults, template outputs, process environment, config overrides.

use crate::error::{DeployError, Result};
use crate::io;
use crate::template::DeploymentOutputs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A setting the Function App reads at startup.
#[derive(Debug, Clone, Copy)]
pub struct KnownSetting {
    pub key: &'static str,
    pub default: Option<&'static str>,
}

impl KnownSetting {
    pub fn required(&self) -> bool {
        self.default.is_none()
    }
}

pub const KNOWN_SETTINGS: &[KnownSetting] = &[
    KnownSetting {
        key: "AzureWebJobsStorage",
        default: Some("UseDevelopmentStorage=true"),
    },
    KnownSetting {
        key: "FUNCTIONS_WORKER_RUNTIME",
        default: Some("python"),
    },
    KnownSetting {
        key: "COSMOS_ENDPOINT",
        default: None,
    },
    KnownSetting {
        key: "COSMOSDB_DATABASE_NAME",
        default: Some("securitydata"),
    },
    KnownSetting {
        key: "COSMOSDB_CONTAINER_NAME",
        default: Some("incidents"),
    },
    KnownSetting {
        key: "AZURE_OPENAI_ENDPOINT",
        default: None,
    },
    KnownSetting {
        key: "OPENAI_MODEL_NAME",
        default: Some("gpt-5"),
    },
    KnownSetting {
        key: "AZURE_OPENAI_API_VERSION",
        default: Some("2024-02-15-preview"),
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSettings {
    #[serde(rename = "IsEncrypted")]
    pub is_encrypted: bool,
    #[serde(rename = "Values")]
    pub values: BTreeMap<String, String>,
}

/// Resolve every known setting plus any extra config values.
///
/// `env` is injected so callers (and tests) control which environment is
/// consulted; the CLI passes `|k| std::env::var(k).ok()`.
pub fn resolve(
    outputs: &DeploymentOutputs,
    env: impl Fn(&str) -> Option<String>,
    overrides: &BTreeMap<String, String>,
) -> Result<LocalSettings> {
    let mut values = BTreeMap::new();
    let mut missing = Vec::new();

    for setting in KNOWN_SETTINGS {
        let value = overrides
            .get(setting.key)
            .cloned()
            .or_else(|| env(setting.key).filter(|v| !v.is_empty()))
            .or_else(|| outputs.lookup(setting.key))
            .or_else(|| setting.default.map(str::to_string));
        match value {
            Some(v) => {
                values.insert(setting.key.to_string(), v);
            }
            None => missing.push(setting.key.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(DeployError::MissingSettings(missing));
    }

    for (k, v) in overrides {
        values.entry(k.clone()).or_insert_with(|| v.clone());
    }

    Ok(LocalSettings {
        is_encrypted: false,
        values,
    })
}

pub fn write(path: &Path, settings: &LocalSettings) -> Result<()> {
    let mut data = serde_json::to_string_pretty(settings)?;
    data.push('\n');
    io::atomic_write(path, data.as_bytes())?;
    tracing::info!(path = %path.display(), keys = settings.values.len(), "wrote settings");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
