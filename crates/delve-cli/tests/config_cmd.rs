use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

const LOCAL_PROVIDER: &str = r#"
default_provider = "openai"

[providers.local]
kind = "custom"
base_url = "http://localhost:11434/v1"
model = "llama3.1"
api_key = "sk-local-secret"
"#;

#[test]
fn test_config_path_command() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_creates_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");

    assert!(!config_path.exists());

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config at"));

    let contents = fs::read_to_string(&config_path).unwrap();
    assert!(contents.contains("[reasoning]"));
    assert!(contents.contains("max_steps = 3"));
}

#[test]
fn test_config_init_fails_if_exists() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), "# existing config").unwrap();

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", dir.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_path_works_with_broken_config() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), "not = [valid").unwrap();

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", dir.path())
        .args(["config", "path"])
        .assert()
        .success();

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", dir.path())
        .args(["config", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("load config"));
}

#[test]
fn test_config_list_marks_default() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), LOCAL_PROVIDER).unwrap();

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", dir.path())
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("  local (llama3.1)"))
        .stdout(predicate::str::contains("* openai"));
}

#[test]
fn test_config_show_never_prints_key() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), LOCAL_PROVIDER).unwrap();

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", dir.path())
        .args(["config", "show", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kind:     custom"))
        .stdout(predicate::str::contains("base_url: http://localhost:11434/v1"))
        .stdout(predicate::str::contains("api_key:  set in config"))
        .stdout(predicate::str::contains("sk-local-secret").not());
}

#[test]
fn test_config_show_reports_missing_key() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", dir.path())
        .env_remove("OPENAI_API_KEY")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("name:     openai"))
        .stdout(predicate::str::contains("base_url: https://api.openai.com/v1"))
        .stdout(predicate::str::contains("missing (set api_key or OPENAI_API_KEY)"));
}

#[test]
fn test_config_set_default_persists() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, LOCAL_PROVIDER).unwrap();

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", dir.path())
        .args(["config", "set-default", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Default provider set to 'local'"));

    let contents = fs::read_to_string(&config_path).unwrap();
    assert!(contents.contains("default_provider = \"local\""));
    assert!(contents.contains("sk-local-secret"));

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", dir.path())
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* local"));
}

#[test]
fn test_config_set_default_rejects_unknown_provider() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("delve")
        .env("DELVE_HOME", dir.path())
        .args(["config", "set-default", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown provider 'nope'"));

    assert!(!dir.path().join("config.toml").exists());
}
