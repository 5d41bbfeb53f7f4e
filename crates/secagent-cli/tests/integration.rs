#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const SCRUBBED_ENV: &[&str] = &[
    "AZURE_RESOURCE_GROUP",
    "AZURE_SUBSCRIPTION_ID",
    "SECAGENT_FUNCTION_APP",
    "SECAGENT_MANAGEMENT_TOKEN",
    "SENTINEL_WORKSPACE_NAME",
    "COSMOS_ACCOUNT_NAME",
    "COSMOS_ENDPOINT",
    "COSMOSDB_DATABASE_NAME",
    "AZURE_OPENAI_ENDPOINT",
];

fn secagent(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("secagent").unwrap();
    cmd.current_dir(dir.path())
        .env("SECAGENT_ROOT", dir.path())
        .env("NO_COLOR", "1");
    for key in SCRUBBED_ENV {
        cmd.env_remove(key);
    }
    cmd
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn write_config(dir: &TempDir, body: &str) {
    write(
        dir.path(),
        ".secagent/config.yaml",
        &format!("version: 1\nproject:\n  name: sa\n{body}"),
    );
}

// ---------------------------------------------------------------------------
// secagent init / config
// ---------------------------------------------------------------------------

#[test]
fn init_writes_config() {
    let dir = TempDir::new().unwrap();
    secagent(&dir).arg("init").assert().success();

    assert!(dir.path().join(".secagent/config.yaml").exists());
    assert!(dir.path().join(".secagent/.gitignore").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    secagent(&dir).args(["init", "--name", "first"]).assert().success();
    secagent(&dir)
        .args(["init", "--name", "second"])
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:"));

    let cfg = std::fs::read_to_string(dir.path().join(".secagent/config.yaml")).unwrap();
    assert!(cfg.contains("first"));
}

#[test]
fn config_validate_after_init_is_clean() {
    let dir = TempDir::new().unwrap();
    secagent(&dir).arg("init").assert().success();
    secagent(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_bad_partition_key() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        "cosmos:\n  containers:\n    - name: incidents\n      partition_key: id\n",
    );
    secagent(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("must start with '/'"));
}

#[test]
fn config_show_without_file_prints_defaults() {
    let dir = TempDir::new().unwrap();
    secagent(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("securitydata"));
}

// ---------------------------------------------------------------------------
// secagent package
// ---------------------------------------------------------------------------

#[test]
fn package_builds_archive_and_lists_entries() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/function_app.py", "import azure.functions\n");
    write(dir.path(), "src/requirements.txt", "azure-functions\n");
    write(dir.path(), "src/shared/cosmos.py", "# client\n");
    write(dir.path(), "src/__pycache__/function_app.cpython-311.pyc", "x");
    write(dir.path(), "src/stale.pyc", "x");
    write(dir.path(), "src/.venv/lib/site.py", "x");

    let assert = secagent(&dir).arg("package").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

    assert!(stdout.contains("function_app.py"));
    assert!(stdout.contains("requirements.txt"));
    assert!(stdout.contains("shared/cosmos.py"));
    assert!(!stdout.contains("__pycache__"));
    assert!(!stdout.contains("stale.pyc"));
    assert!(!stdout.contains(".venv"));
    assert!(dir.path().join("function_app.zip").is_file());
}

#[test]
fn package_honours_extra_exclusions() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/function_app.py", "x");
    write(dir.path(), "src/notes.md", "x");
    write(dir.path(), "src/fixtures/sample.json", "{}");

    secagent(&dir)
        .args(["package", "--exclude-ext", ".md", "--exclude-dir", "fixtures"])
        .assert()
        .success()
        .stdout(predicate::str::contains("function_app.py"))
        .stdout(predicate::str::contains("notes.md").not())
        .stdout(predicate::str::contains("sample.json").not());
}

#[test]
fn package_missing_source_fails_without_archive() {
    let dir = TempDir::new().unwrap();
    secagent(&dir)
        .args(["package", "--source", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("source directory not found"));

    assert!(!dir.path().join("function_app.zip").exists());
}

#[test]
fn package_json_reports_entries() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/function_app.py", "x");

    let assert = secagent(&dir).args(["package", "--json"]).assert().success();
    let value: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(value["entries"], serde_json::json!(["function_app.py"]));
    assert!(value["size_bytes"].as_u64().unwrap() > 0);
}

// ---------------------------------------------------------------------------
// secagent settings generate
// ---------------------------------------------------------------------------

#[test]
fn settings_generate_from_environment() {
    let dir = TempDir::new().unwrap();
    secagent(&dir)
        .args(["settings", "generate"])
        .env("COSMOS_ENDPOINT", "https://cosmos-sa.documents.azure.com:443/")
        .env("AZURE_OPENAI_ENDPOINT", "https://oai-sa.openai.azure.com/")
        .assert()
        .success()
        .stdout(predicate::str::contains("COSMOS_ENDPOINT"));

    let written = std::fs::read_to_string(dir.path().join("src/local.settings.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(value["IsEncrypted"], false);
    assert_eq!(
        value["Values"]["COSMOS_ENDPOINT"],
        "https://cosmos-sa.documents.azure.com:443/"
    );
    assert_eq!(value["Values"]["COSMOSDB_DATABASE_NAME"], "securitydata");
}

#[test]
fn settings_generate_reads_saved_outputs() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        ".secagent/outputs.json",
        r#"{"cosmosEndpoint": "https://from-outputs/", "azureOpenAiEndpoint": "https://oai/"}"#,
    );
    secagent(&dir).args(["settings", "generate"]).assert().success();

    let written = std::fs::read_to_string(dir.path().join("src/local.settings.json")).unwrap();
    assert!(written.contains("https://from-outputs/"));
}

#[test]
fn settings_generate_names_missing_keys() {
    let dir = TempDir::new().unwrap();
    secagent(&dir)
        .args(["settings", "generate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("COSMOS_ENDPOINT"))
        .stderr(predicate::str::contains("AZURE_OPENAI_ENDPOINT"));

    assert!(!dir.path().join("src/local.settings.json").exists());
}

// ---------------------------------------------------------------------------
// secagent deploy
// ---------------------------------------------------------------------------

#[test]
fn deploy_without_app_fails_before_packaging() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/function_app.py", "x");
    secagent(&dir)
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--app / function_app.name"));

    assert!(!dir.path().join("function_app.zip").exists());
}

// ---------------------------------------------------------------------------
// secagent postprovision
// ---------------------------------------------------------------------------

const SHELL_STEPS_FAILING: &str = r#"postprovision:
  steps:
    - name: prepare
      step_type:
        type: shell
        command: "true"
    - name: migrate
      step_type:
        type: shell
        command: "echo migration exploded >&2; false"
    - name: mark
      step_type:
        type: shell
        command: touch marker
"#;

#[test]
fn postprovision_stops_at_first_failure() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, SHELL_STEPS_FAILING);

    secagent(&dir)
        .arg("postprovision")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[1/3] prepare"))
        .stderr(predicate::str::contains("step 2 'migrate' failed"))
        .stderr(predicate::str::contains("exited with code 1: migration exploded"))
        .stderr(predicate::str::contains("migration exploded"))
        .stderr(predicate::str::contains("[3/3]").not());

    assert!(!dir.path().join("marker").exists());
}

#[test]
fn postprovision_runs_every_step_in_order() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        r#"postprovision:
  steps:
    - name: first
      step_type:
        type: shell
        command: echo one >> order.log
    - name: second
      step_type:
        type: shell
        command: echo two >> order.log
"#,
    );

    secagent(&dir)
        .arg("postprovision")
        .assert()
        .success()
        .stderr(predicate::str::contains("post-provision complete (2 step(s))"));

    let log = std::fs::read_to_string(dir.path().join("order.log")).unwrap();
    assert_eq!(log, "one\ntwo\n");
}

#[test]
fn postprovision_default_sequence_fails_at_settings() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/function_app.py", "x");

    secagent(&dir)
        .arg("postprovision")
        .assert()
        .failure()
        .stderr(predicate::str::contains("step 1 'generate-settings' failed"));

    assert!(!dir.path().join("function_app.zip").exists());
}

#[test]
fn postprovision_rejects_unknown_step_fields() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        "postprovision:\n  steps:\n    - name: x\n      step_type:\n        type: deploy_package\n      retries: 3\n",
    );
    secagent(&dir).arg("postprovision").assert().failure();
}

// ---------------------------------------------------------------------------
// secagent rule deploy
// ---------------------------------------------------------------------------

fn rule_args(file: &str) -> Vec<&str> {
    vec![
        "rule",
        "deploy",
        "--file",
        file,
        "--subscription",
        "00000000-0000-0000-0000-000000000000",
        "--resource-group",
        "rg",
        "--workspace",
        "ws",
        "--token",
        "t",
        // Nothing listens here; reaching the network would fail differently.
        "--endpoint",
        "http://127.0.0.1:9",
        "--delay-secs",
        "0",
    ]
}

#[test]
fn rule_deploy_malformed_json_fails_before_network() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "rules/close.json", "{ \"displayName\": ");

    secagent(&dir)
        .args(rule_args("rules/close.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed rule file"))
        .stderr(predicate::str::contains("127.0.0.1").not());
}

#[test]
fn rule_deploy_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    secagent(&dir)
        .args(rule_args("rules/missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("rule file not found"));
}

#[test]
fn rule_deploy_rejects_invalid_rule() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "rules/empty.json",
        r#"{"displayName": "Close low", "order": 1, "triggeringLogic": {}, "actions": []}"#,
    );
    secagent(&dir)
        .args(rule_args("rules/empty.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("actions is empty"));
}
