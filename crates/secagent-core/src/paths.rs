use crate::error::{DeployError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SECAGENT_DIR: &str = ".secagent";
pub const CONFIG_FILE: &str = ".secagent/config.yaml";
pub const OUTPUTS_FILE: &str = ".secagent/outputs.json";

pub const DEFAULT_SOURCE_DIR: &str = "src";
pub const DEFAULT_ARCHIVE: &str = "function_app.zip";
pub const DEFAULT_SETTINGS_FILE: &str = "src/local.settings.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn secagent_dir(root: &Path) -> PathBuf {
    root.join(SECAGENT_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn outputs_path(root: &Path) -> PathBuf {
    root.join(OUTPUTS_FILE)
}

/// Resolve `path` against `root` unless it is already absolute.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

// ---------------------------------------------------------------------------
// Resource name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-_]*$").unwrap())
}

/// Cosmos database/container names and rule ids share this shape.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 255 || !name_re().is_match(name) {
        return Err(DeployError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
