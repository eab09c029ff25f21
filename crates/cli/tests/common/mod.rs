//! World fixtures for integration tests

#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub fn git_available() -> bool {
    let found = Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !found {
        eprintln!("git not found on PATH, skipping");
    }
    found
}

/// A temp root holding a world directory and a bare remote
pub struct WorldFixture {
    pub temp: TempDir,
    pub world: PathBuf,
    pub remote: PathBuf,
}

impl WorldFixture {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let world = temp.path().join("Survival");
        fs::create_dir_all(world.join("region"))?;
        fs::create_dir_all(world.join("playerdata"))?;
        fs::write(world.join("level.dat"), b"level-v1")?;
        fs::write(world.join("session.lock"), b"lock")?;
        // Deterministic region content
        let region: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
        fs::write(world.join("region/r.0.0.mca"), region)?;
        fs::write(world.join("playerdata/player.dat"), b"player")?;

        let remote = temp.path().join("remote.git");
        let status = Command::new("git")
            .args(["init", "--bare", "--quiet"])
            .arg(&remote)
            .status();
        if !matches!(status, Ok(s) if s.success()) {
            anyhow::bail!("git init --bare failed");
        }

        Ok(Self {
            temp,
            world,
            remote,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Path of a config file in the temp root (created on demand)
    pub fn config_path(&self) -> PathBuf {
        self.temp.path().join("config.toml")
    }

    pub fn write_config(&self, content: &str) -> Result<PathBuf> {
        let path = self.config_path();
        fs::write(&path, content)?;
        Ok(path)
    }

    pub fn remote_url(&self) -> String {
        self.remote.to_string_lossy().into_owned()
    }

    /// Branch names present on the bare remote
    pub fn remote_branches(&self) -> Result<Vec<String>> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.remote)
            .args(["for-each-ref", "--format=%(refname:short)", "refs/heads/"])
            .output()?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }
}
