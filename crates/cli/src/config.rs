//! Configuration for worldsnap
//!
//! Config is stored at `~/.config/worldsnap/config.toml` (Linux/macOS)
//! or `%APPDATA%\worldsnap\config.toml` (Windows), unless `--config`
//! points somewhere else. Every field has a default, so a partial or
//! missing file is fine.

use anyhow::{Context, Result};
use gitstore::{CleanupOptions, Identity, PushOptions};
use serde::{Deserialize, Serialize};
use snapshot::{policy, RetentionPolicy};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backup: BackupConfig,
    pub retention: RetentionConfig,
    pub remote: RemoteConfig,
    pub schedule: ScheduleConfig,
    pub restore: RestoreConfig,
    pub push: PushConfig,
    pub repo: RepoConfig,
    pub gate: GateConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Master switch; when off, commit/backup are no-ops
    pub enabled: bool,

    /// Use the system git binary (the only backend currently available)
    pub native_git: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            native_git: true,
        }
    }
}

/// Retention selections in their persisted `<kind> k=v` form
///
/// An empty string means retention is unset and nothing is pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub local: String,
    pub remote: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            local: "gfs".to_string(),
            remote: String::new(),
        }
    }
}

impl RetentionConfig {
    pub fn local_policy(&self) -> Option<RetentionPolicy> {
        policy::decode(&self.local)
    }

    pub fn remote_policy(&self) -> Option<RetentionPolicy> {
        policy::decode(&self.remote)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Name of the git remote snapshots are pushed to
    pub name: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            name: "origin".to_string(),
        }
    }
}

/// What a scheduled trigger does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleAction {
    None,
    /// Snapshot only
    Commit,
    /// Snapshot, push and prune
    Backup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub autoback_action: ScheduleAction,

    /// Minutes between scheduled runs (default: 30)
    pub autoback_wait_minutes: u64,

    /// Run when the autoback loop is interrupted
    pub shutdown_action: ScheduleAction,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            autoback_action: ScheduleAction::Backup,
            autoback_wait_minutes: 30,
            shutdown_action: ScheduleAction::Commit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Parent for restored worlds; defaults to the world's parent directory
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub smart: bool,

    /// Refuse pushes into a remote that belongs to another world
    pub uuid_check: bool,

    pub cleanup_tracking_refs: bool,
    pub cleanup_local_temp_branch: bool,
    pub cleanup_remote_temp_branch: bool,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            smart: true,
            uuid_check: true,
            cleanup_tracking_refs: true,
            cleanup_local_temp_branch: true,
            cleanup_remote_temp_branch: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub update_gitignore: bool,
    pub update_gitattributes: bool,
    pub identity_name: String,
    pub identity_email: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        let identity = Identity::default();
        Self {
            update_gitignore: true,
            update_gitattributes: true,
            identity_name: identity.name,
            identity_email: identity.email,
        }
    }
}

impl RepoConfig {
    pub fn identity(&self) -> Identity {
        Identity {
            name: self.identity_name.clone(),
            email: self.identity_email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Worker threads (default: 2)
    pub workers: usize,

    /// How long shutdown waits for an in-flight write (default: 60)
    pub shutdown_timeout_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            shutdown_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Options for the sync engine
    pub fn push_options(&self) -> PushOptions {
        PushOptions {
            remote: self.remote.name.clone(),
            smart: self.push.smart,
            check_world: self.push.uuid_check,
            cleanup: CleanupOptions {
                tracking_refs: self.push.cleanup_tracking_refs,
                local_temp_branch: self.push.cleanup_local_temp_branch,
                remote_temp_branch: self.push.cleanup_remote_temp_branch,
            },
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir().map(|h| h.join(".config/worldsnap"))
    }

    #[cfg(not(target_os = "macos"))]
    {
        dirs::config_dir().map(|c| c.join("worldsnap"))
    }
}

/// Get the default config file path
pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from `path`, or from the default location
///
/// A missing file yields the defaults.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let config_path = match path.map(Path::to_path_buf).or_else(config_file_path) {
        Some(p) => p,
        None => {
            tracing::debug!("Could not determine config directory, using defaults");
            return Ok(Config::default());
        }
    };

    if !config_path.exists() {
        tracing::debug!("Config not found at {}, using defaults", config_path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config at {}", config_path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config at {}", config_path.display()))?;

    config.validate();
    tracing::debug!("Loaded config from {}", config_path.display());
    Ok(config)
}

/// Save configuration to `path`
pub fn save(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory at {}", dir.display()))?;
    }

    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(path, &content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    tracing::info!("Saved config to {}", path.display());
    Ok(())
}

impl Config {
    /// Log settings that will be ignored or replaced at runtime
    fn validate(&self) {
        for (label, text) in [("local", &self.retention.local), ("remote", &self.retention.remote)] {
            if !text.trim().is_empty() && policy::decode(text).is_none() {
                tracing::warn!("retention.{} = {:?} is not a known policy; retention disabled", label, text);
            }
        }
        if !self.backup.native_git {
            tracing::warn!("backup.native_git = false is not supported; using the git binary");
        }
        if self.gate.workers == 0 {
            tracing::warn!("gate.workers = 0, using 1 worker");
        }
    }
}

/// Generate example config content for display
pub fn example_config() -> String {
    let mut content = String::from("# worldsnap configuration\n");
    content.push_str("#\n");
    content.push_str("# Retention policies: all | fixed count=N | daily grace_days=N | gfs\n");
    content.push_str("# An empty retention string disables pruning.\n\n");
    content.push_str(&toml::to_string_pretty(&Config::default()).unwrap_or_default());
    content
}
