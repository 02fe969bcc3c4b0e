use assert_cmd::prelude::*;
use hcv_model::HostState;
use hcv_testkit::{write_host_snapshot, write_yaml, BASE_YAML};
use predicates::prelude::*;
use std::process::Command;

fn prefork_host() -> HostState {
    HostState {
        active_concurrency_model: Some("prefork".to_string()),
        enabled_modules: ["mpm_prefork", "rewrite", "deflate"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        ..HostState::default()
    }
}

/// Offline planning against a captured snapshot never touches the host and
/// lists the switch first and the restart last.
#[test]
fn cli_plan_against_snapshot_orders_switch_first() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let doc = write_yaml(dir.path(), "base.yaml", BASE_YAML)?;
    let snap = write_host_snapshot(dir.path(), "host.json", &prefork_host())?;

    let out = Command::cargo_bin("hcv")?
        .arg("plan")
        .arg("--config")
        .arg(&doc)
        .arg("--assume-host")
        .arg(&snap)
        .output()?;
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout)?;

    assert!(stdout.contains("action.0=switch_concurrency_model(prefork -> event)"));
    assert!(stdout.contains("enable_module(headers)"));
    assert!(stdout.contains("enable_module(cache)"));
    assert!(stdout.contains("disable_module(deflate)"));
    assert!(stdout.contains("write_fragment(php)"));

    let last = stdout
        .lines()
        .filter(|l| l.starts_with("action."))
        .last()
        .expect("at least one action");
    assert!(last.ends_with("=restart_service"));
    Ok(())
}

#[test]
fn cli_plan_json_is_machine_readable() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let doc = write_yaml(dir.path(), "base.yaml", BASE_YAML)?;
    let snap = write_host_snapshot(dir.path(), "host.json", &prefork_host())?;

    let out = Command::cargo_bin("hcv")?
        .arg("plan")
        .arg("--config")
        .arg(&doc)
        .arg("--assume-host")
        .arg(&snap)
        .arg("--json")
        .output()?;
    assert!(out.status.success());

    let v: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(v["actions"][0]["kind"], "switch_concurrency_model");
    assert_eq!(v["actions"][0]["to"], "event");
    Ok(())
}

#[test]
fn cli_plan_strict_keys_rejects_typos() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let doc = write_yaml(dir.path(), "base.yaml", BASE_YAML)?;
    let typo = write_yaml(dir.path(), "typo.yaml", "HostnameLookup: \"On\"\n")?;
    let snap = write_host_snapshot(dir.path(), "host.json", &prefork_host())?;

    Command::cargo_bin("hcv")?
        .arg("plan")
        .arg("--config")
        .arg(&doc)
        .arg("--config")
        .arg(&typo)
        .arg("--assume-host")
        .arg(&snap)
        .arg("--strict-keys")
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_UNUSED_KEYS"));

    // Without --strict-keys the same document only warns.
    Command::cargo_bin("hcv")?
        .arg("plan")
        .arg("--config")
        .arg(&doc)
        .arg("--config")
        .arg(&typo)
        .arg("--assume-host")
        .arg(&snap)
        .assert()
        .success()
        .stderr(predicate::str::contains("/HostnameLookup"));
    Ok(())
}

#[test]
fn cli_plan_rejects_unknown_concurrency_model() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let doc = write_yaml(dir.path(), "base.yaml", BASE_YAML)?;
    let bad = write_yaml(dir.path(), "bad.yaml", "Modules:\n  mpm: threadpool\n")?;
    let snap = write_host_snapshot(dir.path(), "host.json", &prefork_host())?;

    Command::cargo_bin("hcv")?
        .arg("plan")
        .arg("--config")
        .arg(&doc)
        .arg("--config")
        .arg(&bad)
        .arg("--assume-host")
        .arg(&snap)
        .assert()
        .failure()
        .stderr(predicate::str::contains("threadpool"));
    Ok(())
}
