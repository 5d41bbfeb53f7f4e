use crate::output::{self, human_size, print_json};
use anyhow::Context;
use clap::Args;
use secagent_core::{
    config::Config,
    package::{self, Exclusions, PackageReport},
    paths,
};
use std::path::{Path, PathBuf};

#[derive(Args, Default)]
pub struct PackageArgs {
    /// Source directory (default: package.source_dir in config)
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Archive to write (default: package.archive in config)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Extra file extension to exclude; repeatable or comma-separated
    #[arg(long = "exclude-ext", value_delimiter = ',')]
    pub exclude_ext: Vec<String>,

    /// Extra directory name to exclude; repeatable or comma-separated
    #[arg(long = "exclude-dir", value_delimiter = ',')]
    pub exclude_dir: Vec<String>,
}

pub fn run(root: &Path, args: PackageArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let report = build(root, &config, &args)?;

    if json {
        return print_json(&report);
    }
    for entry in &report.entries {
        println!("{entry}");
    }
    Ok(())
}

/// Build the archive for `config`, with `args` overriding paths and adding
/// exclusions. Shared with `deploy` and the post-provision runner.
pub(crate) fn build(
    root: &Path,
    config: &Config,
    args: &PackageArgs,
) -> secagent_core::Result<PackageReport> {
    let source = paths::resolve(
        root,
        args.source.as_deref().unwrap_or(config.package.source_dir.as_path()),
    );
    let archive = paths::resolve(
        root,
        args.output.as_deref().unwrap_or(config.package.archive.as_path()),
    );

    let mut extensions = config.package.exclude_extensions.clone();
    extensions.extend(args.exclude_ext.iter().cloned());
    let mut dirs = config.package.exclude_dirs.clone();
    dirs.extend(args.exclude_dir.iter().cloned());

    output::step(&format!(
        "Packaging {} -> {}",
        source.display(),
        archive.display()
    ));
    let report = package::build_archive(&source, &archive, &Exclusions::new(&extensions, &dirs))?;
    output::ok(&format!(
        "created {} ({}, {} file(s), {} skipped)",
        report.archive.display(),
        human_size(report.size_bytes),
        report.entries.len(),
        report.skipped
    ));
    Ok(report)
}
