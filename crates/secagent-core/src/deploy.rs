use crate::az::{self, AzRunner};
use crate::error::{DeployError, Result};
use std::path::Path;

/// Push a package archive to a Function App via zip deploy.
pub fn zip_deploy(
    runner: &dyn AzRunner,
    resource_group: &str,
    app: &str,
    archive: &Path,
) -> Result<()> {
    if !archive.is_file() {
        return Err(DeployError::ArchiveNotFound(archive.display().to_string()));
    }
    let mut args = az::args([
        "functionapp",
        "deployment",
        "source",
        "config-zip",
        "--resource-group",
        resource_group,
        "--name",
        app,
    ]);
    args.push("--src".into());
    args.push(archive.display().to_string());
    args.push("--output".into());
    args.push("none".into());

    tracing::info!(app, archive = %archive.display(), "zip deploying package");
    az::run_checked(runner, &args)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::az::testing::FakeAz;
    use tempfile::TempDir;

    #[test]
    fn deploys_existing_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("function_app.zip");
        std::fs::write(&archive, b"PK").unwrap();
        let fake = FakeAz::new();

        zip_deploy(&fake, "rg-secagent", "func-secagent", &archive).unwrap();

        let call = fake.call(0);
        assert_eq!(az::display_args(&call), "functionapp deployment source config-zip");
        assert!(call.contains(&"func-secagent".to_string()));
        assert!(call.contains(&archive.display().to_string()));
    }

    #[test]
    fn missing_archive_issues_no_calls() {
        let dir = TempDir::new().unwrap();
        let fake = FakeAz::new();
        let err = zip_deploy(&fake, "rg", "app", &dir.path().join("none.zip")).unwrap_err();
        assert!(matches!(err, DeployError::ArchiveNotFound(_)));
        assert_eq!(fake.call_count(), 0);
    }

    #[test]
    fn cli_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("function_app.zip");
        std::fs::write(&archive, b"PK").unwrap();
        let fake = FakeAz::new();
        fake.respond(false, "", "ERROR: Zip deployment failed.");
        let err = zip_deploy(&fake, "rg", "app", &archive).unwrap_err();
        assert!(err.to_string().contains("Zip deployment failed"));
    }
}
