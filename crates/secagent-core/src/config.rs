use crate::cosmos::{ContainerSpec, DEFAULT_CONTAINER, DEFAULT_DATABASE, DEFAULT_THROUGHPUT};
use crate::error::Result;
use crate::package;
use crate::paths;
use crate::rule::{DEFAULT_API_VERSION, DEFAULT_MANAGEMENT_ENDPOINT, DEFAULT_VALIDATE_DELAY_SECS};
use crate::steps::{default_postprovision_steps, StepDefinition, StepKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// AzureConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

// ---------------------------------------------------------------------------
// PackageConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_archive")]
    pub archive: PathBuf,
    #[serde(default = "package::default_exclude_extensions")]
    pub exclude_extensions: Vec<String>,
    #[serde(default = "package::default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_SOURCE_DIR)
}

fn default_archive() -> PathBuf {
    PathBuf::from(paths::DEFAULT_ARCHIVE)
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            archive: default_archive(),
            exclude_extensions: package::default_exclude_extensions(),
            exclude_dirs: package::default_exclude_dirs(),
        }
    }
}

// ---------------------------------------------------------------------------
// FunctionAppConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionAppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Overrides `https://<name>.azurewebsites.net/api/health`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_url: Option<String>,
}

// ---------------------------------------------------------------------------
// CosmosConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CosmosConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<u32>,
    #[serde(default = "default_containers")]
    pub containers: Vec<ContainerSpec>,
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_containers() -> Vec<ContainerSpec> {
    vec![ContainerSpec {
        name: DEFAULT_CONTAINER.to_string(),
        partition_key: "/id".to_string(),
        throughput: Some(DEFAULT_THROUGHPUT),
    }]
}

impl Default for CosmosConfig {
    fn default() -> Self {
        Self {
            account: None,
            database: default_database(),
            throughput: None,
            containers: default_containers(),
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub file: PathBuf,
    #[serde(default = "default_deployment_name")]
    pub deployment_name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

fn default_deployment_name() -> String {
    "secagent".to_string()
}

// ---------------------------------------------------------------------------
// SettingsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_settings_path")]
    pub path: PathBuf,
    /// Highest-priority values, written verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
}

fn default_settings_path() -> PathBuf {
    PathBuf::from(paths::DEFAULT_SETTINGS_FILE)
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
            values: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SentinelConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_management_endpoint")]
    pub management_endpoint: String,
    #[serde(default = "default_validate_delay")]
    pub validate_delay_secs: u64,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_management_endpoint() -> String {
    DEFAULT_MANAGEMENT_ENDPOINT.to_string()
}

fn default_validate_delay() -> u64 {
    DEFAULT_VALIDATE_DELAY_SECS
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            api_version: default_api_version(),
            management_endpoint: default_management_endpoint(),
            validate_delay_secs: default_validate_delay(),
        }
    }
}

// ---------------------------------------------------------------------------
// PostProvisionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostProvisionConfig {
    #[serde(default = "default_postprovision_steps")]
    pub steps: Vec<StepDefinition>,
}

impl Default for PostProvisionConfig {
    fn default() -> Self {
        Self {
            steps: default_postprovision_steps(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default)]
    pub package: PackageConfig,
    #[serde(default)]
    pub function_app: FunctionAppConfig,
    #[serde(default)]
    pub cosmos: CosmosConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateConfig>,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub sentinel: SentinelConfig,
    #[serde(default)]
    pub postprovision: PostProvisionConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                environment: None,
            },
            azure: AzureConfig::default(),
            package: PackageConfig::default(),
            function_app: FunctionAppConfig::default(),
            cosmos: CosmosConfig::default(),
            template: None,
            settings: SettingsConfig::default(),
            sentinel: SentinelConfig::default(),
            postprovision: PostProvisionConfig::default(),
        }
    }

    pub fn exists(root: &Path) -> bool {
        paths::config_path(root).exists()
    }

    /// Load `.secagent/config.yaml`, falling back to defaults named after the
    /// root directory when the project has no config yet.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::new(default_project_name(root)));
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        // Containers: partition key shape, duplicates, throughput range
        let mut seen = HashSet::new();
        for c in &self.cosmos.containers {
            if !c.partition_key.starts_with('/') {
                warn(
                    WarnLevel::Error,
                    format!(
                        "container '{}' has partition key '{}' (must start with '/')",
                        c.name, c.partition_key
                    ),
                );
            }
            if !seen.insert(c.name.as_str()) {
                warn(
                    WarnLevel::Error,
                    format!("container '{}' is declared more than once", c.name),
                );
            }
            if let Some(t) = c.throughput {
                check_throughput(&mut warn, &format!("container '{}'", c.name), t);
            }
        }
        if let Some(t) = self.cosmos.throughput {
            check_throughput(&mut warn, "database", t);
        }
        if self.cosmos.containers.is_empty() {
            warn(
                WarnLevel::Warning,
                "cosmos.containers is empty; 'cosmos setup' will only create the database"
                    .to_string(),
            );
        }

        // Post-provision steps
        if self.postprovision.steps.is_empty() {
            warn(
                WarnLevel::Warning,
                "postprovision.steps is empty; 'postprovision' will do nothing".to_string(),
            );
        }
        let mut step_names = HashSet::new();
        for step in &self.postprovision.steps {
            if !step_names.insert(step.name.as_str()) {
                warn(
                    WarnLevel::Warning,
                    format!("step name '{}' is used more than once", step.name),
                );
            }
            if let StepKind::Shell { command, .. } = &step.step_type {
                if command.trim().is_empty() {
                    warn(
                        WarnLevel::Error,
                        format!("step '{}' has an empty command", step.name),
                    );
                }
            }
        }

        // Package exclusions
        for ext in &self.package.exclude_extensions {
            if ext.contains('/') || ext.contains('\\') {
                warn(
                    WarnLevel::Warning,
                    format!("exclude extension '{ext}' looks like a path"),
                );
            }
        }

        // Sentinel
        if self.sentinel.api_version.trim().is_empty() {
            warn(
                WarnLevel::Error,
                "sentinel.api_version is empty".to_string(),
            );
        }
        if !self.sentinel.management_endpoint.starts_with("https://")
            && !self.sentinel.management_endpoint.starts_with("http://")
        {
            warn(
                WarnLevel::Error,
                format!(
                    "sentinel.management_endpoint '{}' is not an http(s) URL",
                    self.sentinel.management_endpoint
                ),
            );
        }

        warnings
    }
}

fn check_throughput(warn: &mut impl FnMut(WarnLevel, String), what: &str, t: u32) {
    if t < 400 {
        warn(
            WarnLevel::Warning,
            format!("{what} throughput {t} is below the 400 RU/s minimum"),
        );
    } else if t % 100 != 0 {
        warn(
            WarnLevel::Warning,
            format!("{what} throughput {t} is not a multiple of 100"),
        );
    }
}

fn default_project_name(root: &Path) -> String {
    root.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("secagent")
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
