//! Integration tests for the CLI.
//!
//! These tests drive commands against the in-memory backend and its
//! inventory file.

use std::path::Path;
use std::process::{Command as Process, Output};

use serde_json::{json, Value};
use unistore_backend::MemoryBackend;
use unistore_cli::cli::Command;
use unistore_cli::commands;
use unistore_cli::config::{BackendKind, Config};
use unistore_cli::inventory;
use unistore_common::LogFormat;

/// Test that default configuration is valid.
#[test]
fn test_default_config_is_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
}

/// Test configuration loading from YAML.
#[test]
fn test_config_yaml_parsing() {
    let yaml = r#"
log_level: debug
log_format: json
backend: memory

memory:
  filer_address: filer-lab-01
  inventory_path: /srv/unistore/inventory.yaml
"#;

    let config: Config = serde_yaml::from_str(yaml).expect("Failed to parse YAML");

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.log_format, LogFormat::Json);
    assert_eq!(config.backend, BackendKind::Memory);
    assert_eq!(config.memory.filer_address, "filer-lab-01");
    assert!(config.validate().is_ok());
}

/// Test that missing sections fall back to defaults.
#[test]
fn test_partial_config_uses_defaults() {
    let config: Config = serde_yaml::from_str("backend: netapp\n").expect("Failed to parse YAML");
    assert_eq!(config.backend, BackendKind::Netapp);
    assert_eq!(config.log_level, "info");
    assert_eq!(config.memory, Config::default().memory);
}

/// Test loading a config file from disk.
#[test]
fn test_config_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unistore.yaml");
    std::fs::write(&path, "log_level: warn\n").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.log_level, "warn");

    assert!(Config::load(dir.path().join("missing.yaml")).is_err());
}

/// Test that state survives between invocations through the inventory file.
#[tokio::test]
async fn test_inventory_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("inventory.yaml");

    // First invocation: create a volume, a snapshot and a policy.
    let backend = MemoryBackend::from_inventory(inventory::load(&path).unwrap());
    let steps = [
        Command::CreateVolume {
            volume: "vol1".into(),
            fields: vec![("size_total".into(), json!(100))],
        },
        Command::CreateSnapshot {
            volume: "vol1".into(),
            snapshot: "snap1".into(),
        },
        Command::CreatePolicy {
            volume: "vol1".into(),
            policy: "p1".into(),
            rules: vec!["10.0.0.0/24".into()],
        },
        Command::CreateLock {
            volume: "vol1".into(),
            owner: "hostA".into(),
        },
    ];
    for step in &steps {
        commands::run(&backend, step).await.unwrap();
    }
    inventory::save(&path, &backend.inventory().unwrap()).unwrap();

    // Second invocation sees the same state.
    let backend = MemoryBackend::from_inventory(inventory::load(&path).unwrap());
    let add = Command::AddRule {
        volume: "vol1".into(),
        policy: "p1".into(),
        rule: "10.0.0.5".into(),
    };
    commands::run(&backend, &add).await.unwrap();

    let rules = commands::run(
        &backend,
        &Command::GetPolicy {
            volume: "vol1".into(),
            policy: "p1".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(rules, json!(["10.0.0.0/24", "10.0.0.5"]));

    let snapshots = commands::run(&backend, &Command::Snapshots { volume: "vol1".into() })
        .await
        .unwrap();
    assert_eq!(snapshots[0]["name"], json!("snap1"));

    let locks = commands::run(&backend, &Command::Locks { volume: "vol1".into() })
        .await
        .unwrap();
    assert_eq!(locks, json!({"owner": "hostA"}));
}

/// Test that a missing inventory file starts empty.
#[test]
fn test_missing_inventory_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let inventory = inventory::load(&dir.path().join("none.yaml")).unwrap();
    assert!(inventory.volumes.is_empty());
}

/// Run the `unistore` binary with a config file and the given arguments.
fn run_binary(config: &Path, args: &[&str]) -> Output {
    let output = Process::new(env!("CARGO_BIN_EXE_unistore"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("UNISTORE_INVENTORY")
        .output()
        .expect("Failed to run unistore");
    assert!(
        output.status.success(),
        "unistore {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

/// Test that stdout carries only the JSON result while logs go to stderr.
#[test]
fn test_binary_stdout_is_json() {
    for format in ["pretty", "json"] {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("unistore.yaml");
        let inventory = dir.path().join("inventory.yaml");
        std::fs::write(
            &config,
            format!(
                "log_level: info\nlog_format: {}\nmemory:\n  inventory_path: {}\n",
                format,
                inventory.display()
            ),
        )
        .unwrap();

        let created = run_binary(&config, &["create-volume", "vol1", "--field", "size_total=100"]);
        let status: Value = serde_json::from_slice(&created.stdout).unwrap();
        assert_eq!(status, json!({"status": "ok"}));
        assert!(String::from_utf8_lossy(&created.stderr).contains("Configuration loaded"));

        let listed = run_binary(&config, &["volumes"]);
        let volumes: Value = serde_json::from_slice(&listed.stdout).unwrap();
        assert_eq!(volumes[0]["name"], json!("vol1"), "{}", format);
        assert_eq!(volumes[0]["size_total"], json!(100), "{}", format);
    }
}
