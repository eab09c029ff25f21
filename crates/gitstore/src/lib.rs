//! Git-backed snapshot storage
//!
//! This crate provides:
//! - The [`SnapshotStore`] contract consumed by the backup engine
//! - [`GitRepo`], an implementation that drives the `git` binary
//! - Progress translation for git's stderr progress output
//! - Smart push (shared-history synthesis before transfer)
//! - Restore of a snapshot into a fresh directory
//!
//! Authentication and transport are left entirely to the real git binary,
//! so every credential helper and SSH agent setup keeps working.

pub mod git;
pub mod progress;
pub mod restore;
pub mod sync;

#[cfg(test)]
pub(crate) mod memory;

pub use git::{GitRepo, Identity};
pub use progress::{CombinedProgress, NoProgress, PercentProgress, ProgressMonitor};
pub use restore::{restore_snapshot, restore_target_dir, RestoreError, RestoreSource};
pub use sync::{CleanupOptions, PushOptions, PushOutcome, PushStrategy, SmartPush, SyncError};

use snapshot::{SnapshotId, WorldId};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Errors from the backing store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit; the captured output is kept for diagnostics
    #[error("`{}` failed ({}): {}", .command, exit_label(.code), .stderr.trim())]
    Command {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Ref already exists: {0}")]
    RefExists(String),

    #[error("Ref not found: {0}")]
    RefNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "killed by signal".to_string(),
    }
}

/// Operations the backup engine needs from a version-control store
///
/// Ref names are branch names without the `refs/heads/` prefix.
pub trait SnapshotStore: Send + Sync {
    /// Directory the store tracks
    fn work_dir(&self) -> &Path;

    /// All local branch names
    fn local_refs(&self) -> Result<Vec<String>, StoreError>;

    /// All branch names on `remote`
    fn remote_refs(&self, remote: &str) -> Result<Vec<String>, StoreError>;

    /// Commit id a branch points at
    fn resolve_ref(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Record the current tree under a new branch `name`
    fn commit_snapshot(&self, name: &str, message: &str) -> Result<String, StoreError>;

    /// Create (or reset) branch `name` at the commit of branch `target`
    fn create_branch(&self, name: &str, target: &str) -> Result<(), StoreError>;

    /// Merge `other` into `branch` keeping `branch`'s tree unchanged
    fn merge_ours(&self, branch: &str, other: &str, message: &str) -> Result<String, StoreError>;

    /// Push branches to `remote` in one transfer
    fn push(
        &self,
        remote: &str,
        branches: &[String],
        progress: &mut dyn ProgressMonitor,
    ) -> Result<(), StoreError>;

    fn delete_local_ref(&self, name: &str) -> Result<(), StoreError>;

    /// Delete `refs/remotes/<remote>/<name>`; false if it didn't exist
    fn delete_tracking_ref(&self, remote: &str, name: &str) -> Result<bool, StoreError>;

    /// Delete branches on `remote` in one push
    fn delete_remote_refs(&self, remote: &str, names: &[String]) -> Result<(), StoreError>;

    /// URL of `remote`, `None` when it isn't configured
    fn remote_url(&self, remote: &str) -> Result<Option<String>, StoreError>;

    fn config_get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn config_set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Clone only `branch` of `source` into `target`
    fn clone_branch(
        &self,
        source: &str,
        branch: &str,
        target: &Path,
        progress: &mut dyn ProgressMonitor,
    ) -> Result<(), StoreError>;

    /// Reclaim space held by objects no snapshot references anymore
    fn collect_garbage(&self) -> Result<(), StoreError>;
}

/// Local snapshots of `world`
pub fn list_snapshots<S: SnapshotStore + ?Sized>(
    store: &S,
    world: &WorldId,
) -> Result<BTreeSet<SnapshotId>, StoreError> {
    let refs = store.local_refs()?;
    Ok(snapshot::snapshots_for_world(refs.iter().map(String::as_str), world))
}

/// Snapshots of `world` present on `remote`
pub fn list_remote_snapshots<S: SnapshotStore + ?Sized>(
    store: &S,
    remote: &str,
    world: &WorldId,
) -> Result<BTreeSet<SnapshotId>, StoreError> {
    let refs = store.remote_refs(remote)?;
    Ok(snapshot::snapshots_for_world(refs.iter().map(String::as_str), world))
}
