use crate::output::{self, print_json};
use anyhow::Context;
use clap::Subcommand;
use secagent_core::{
    config::Config,
    paths,
    settings::{self, LocalSettings},
    template::DeploymentOutputs,
};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum SettingsSubcommand {
    /// Write local.settings.json from config, environment and template outputs
    Generate {
        /// File to write (default: settings.path in config)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

pub fn run(root: &Path, subcmd: SettingsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SettingsSubcommand::Generate { output } => {
            let config = Config::load(root).context("failed to load config")?;
            let outputs =
                DeploymentOutputs::load(root).context("failed to load deployment outputs")?;
            let (path, generated) = generate(root, &config, &outputs, output.as_deref())?;

            if json {
                return print_json(&serde_json::json!({
                    "path": path,
                    "keys": generated.values.keys().collect::<Vec<_>>(),
                }));
            }
            // Values can carry connection strings; list keys only.
            for key in generated.values.keys() {
                println!("{key}");
            }
            Ok(())
        }
    }
}

pub(crate) fn generate(
    root: &Path,
    config: &Config,
    outputs: &DeploymentOutputs,
    output_override: Option<&Path>,
) -> secagent_core::Result<(PathBuf, LocalSettings)> {
    let path = paths::resolve(root, output_override.unwrap_or(config.settings.path.as_path()));
    output::step(&format!("Generating settings -> {}", path.display()));

    let generated = settings::resolve(
        outputs,
        |key| std::env::var(key).ok(),
        &config.settings.values,
    )?;
    settings::write(&path, &generated)?;
    output::ok(&format!(
        "wrote {} setting(s) to {}",
        generated.values.len(),
        path.display()
    ));
    Ok((path, generated))
}
