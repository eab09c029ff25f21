//! Capabilities the hosting application exposes to the backup engine
//!
//! A game server would implement [`WorldHost`] to flush the world to disk,
//! pause autosaving while a snapshot is taken and relay messages to
//! players. The standalone CLI uses [`DirectoryHost`], where the world is
//! just a directory that is already on disk.

use anyhow::Result;
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

pub trait WorldHost: Send + Sync {
    /// Flush pending world state to disk
    fn trigger_save(&self) -> Result<()>;

    /// Root of the world tree
    fn world_dir(&self) -> &Path;

    /// Human-readable world name
    fn world_name(&self) -> String;

    /// Message for whoever is watching (players, console)
    fn send_message(&self, message: &str);

    /// Short progress status; `None` clears it
    fn set_status(&self, status: Option<&str>);

    /// Pause or resume the host's own saving
    fn set_saving_enabled(&self, enabled: bool);
}

/// Pauses host saving for its lifetime
pub struct SavingPaused<'a> {
    host: &'a dyn WorldHost,
}

impl<'a> SavingPaused<'a> {
    pub fn new(host: &'a dyn WorldHost) -> Self {
        host.set_saving_enabled(false);
        Self { host }
    }
}

impl Drop for SavingPaused<'_> {
    fn drop(&mut self) {
        self.host.set_saving_enabled(true);
    }
}

/// A world that is a plain directory
pub struct DirectoryHost {
    dir: PathBuf,
    name: String,
    quiet: bool,
    saving_enabled: AtomicBool,
    status: Mutex<Option<String>>,
    messages: Mutex<Vec<String>>,
}

impl DirectoryHost {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "world".to_string());

        Self {
            dir,
            name,
            quiet: false,
            saving_enabled: AtomicBool::new(true),
            status: Mutex::new(None),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Record messages instead of printing them
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn saving_enabled(&self) -> bool {
        self.saving_enabled.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> Option<String> {
        self.status.lock().clone()
    }

    /// Messages recorded so far; always empty unless [`quiet`](Self::quiet)
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl WorldHost for DirectoryHost {
    fn trigger_save(&self) -> Result<()> {
        // Nothing buffered: the directory is the world
        tracing::debug!("Save requested for {}", self.dir.display());
        Ok(())
    }

    fn world_dir(&self) -> &Path {
        &self.dir
    }

    fn world_name(&self) -> String {
        self.name.clone()
    }

    fn send_message(&self, message: &str) {
        if self.quiet {
            self.messages.lock().push(message.to_string());
        } else {
            println!("{} {}", "»".cyan(), message);
        }
    }

    fn set_status(&self, status: Option<&str>) {
        if let Some(text) = status {
            tracing::debug!("Status: {}", text);
        }
        *self.status.lock() = status.map(str::to_string);
    }

    fn set_saving_enabled(&self, enabled: bool) {
        tracing::trace!("Saving {}", if enabled { "enabled" } else { "disabled" });
        self.saving_enabled.store(enabled, Ordering::SeqCst);
    }
}
