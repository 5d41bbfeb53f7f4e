use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("source directory not found: {0}")]
    SourceNotFound(String),

    #[error("archive not found: {0}; run 'secagent package' first")]
    ArchiveNotFound(String),

    #[error("template file not found: {0}")]
    TemplateNotFound(String),

    #[error("rule file not found: {0}")]
    RuleFileNotFound(String),

    #[error("malformed rule file {path}: {source}")]
    RuleParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid partition key path '{0}': must start with '/'")]
    InvalidPartitionKey(String),

    #[error("invalid resource name '{0}'")]
    InvalidName(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("missing required settings: {}", .0.join(", "))]
    MissingSettings(Vec<String>),

    #[error("azure CLI not found on PATH: install it from https://aka.ms/azure-cli")]
    AzNotFound,

    #[error("failed to spawn '{command}': {message}")]
    SpawnFailed { command: String, message: String },

    #[error("'az {command}' failed: {message}")]
    AzFailed { command: String, message: String },

    #[error("unexpected output from 'az {command}': {message}")]
    AzOutput { command: String, message: String },

    #[error("{method} {url} returned {status}: {body}")]
    HttpStatus {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("command '{command}' {reason}")]
    ShellFailed { command: String, reason: String },

    #[error("step {index} '{step}' failed: {message}")]
    StepFailed {
        index: usize,
        step: String,
        message: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DeployError>;
