//! Tests for the config and policy commands

use anyhow::Result;
use std::process::Command;
use tempfile::TempDir;

fn wsnap() -> Command {
    Command::new(env!("CARGO_BIN_EXE_wsnap"))
}

#[test]
fn test_config_example() -> Result<()> {
    let output = wsnap().args(["config", "--example"]).output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[backup]"));
    assert!(stdout.contains("[retention]"));
    assert!(stdout.contains("autoback_wait_minutes"));

    Ok(())
}

#[test]
fn test_config_defaults_when_file_missing() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("missing.toml");

    let output = wsnap().arg("config").arg("--config").arg(&path).output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("local = \"gfs\""));
    assert!(stdout.contains("name = \"origin\""));

    Ok(())
}

#[test]
fn test_config_file_overrides() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("config.toml");
    std::fs::write(
        &path,
        "[retention]\nlocal = \"fixed count=5\"\n\n[remote]\nname = \"backup\"\n",
    )?;

    let output = wsnap().arg("config").arg("--config").arg(&path).output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("local = \"fixed count=5\""));
    assert!(stdout.contains("name = \"backup\""));
    // Untouched sections keep their defaults
    assert!(stdout.contains("autoback_wait_minutes = 30"));

    Ok(())
}

#[test]
fn test_config_parse_error() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "[backup]\nenabled = \"yes please\"\n")?;

    let output = wsnap().arg("config").arg("--config").arg(&path).output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to parse config"));

    Ok(())
}

#[test]
fn test_policy_describe() -> Result<()> {
    let output = wsnap().args(["policy", "describe", "fixed count=5"]).output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains('5'));

    Ok(())
}

#[test]
fn test_policy_describe_unknown() -> Result<()> {
    let output = wsnap().args(["policy", "describe", "hourly"]).output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown retention policy"));

    Ok(())
}

#[test]
fn test_policy_encode_sorts_keys() -> Result<()> {
    let output = wsnap()
        .args(["policy", "encode", "daily", "grace_days=4"])
        .output()?;

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "daily grace_days=4");

    Ok(())
}

#[test]
fn test_policy_list() -> Result<()> {
    let output = wsnap().args(["policy", "list"]).output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for kind in ["all", "fixed", "daily", "gfs"] {
        assert!(stdout.contains(kind), "missing {} in {}", kind, stdout);
    }
    assert!(stdout.contains("grace_days"));

    Ok(())
}
