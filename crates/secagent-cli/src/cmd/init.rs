use anyhow::Context;
use secagent_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let project_name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "secagent".to_string())
    });

    println!("Initializing secagent in: {}", root.display());

    let dir = paths::secagent_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    if Config::exists(root) {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        Config::new(&project_name)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    let gitignore = dir.join(".gitignore");
    if io::write_if_missing(&gitignore, b"outputs.json\n")
        .context("failed to write .gitignore")?
    {
        println!("  created: {}/.gitignore", paths::SECAGENT_DIR);
    }

    println!(
        "\nNext: set azure.resource_group and function_app.name, then run 'secagent config validate'."
    );
    Ok(())
}
