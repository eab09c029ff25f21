//! Pushing snapshots to a remote
//!
//! Snapshots are unrelated orphan commits, so a plain push of a new
//! snapshot transfers every object it references even when the remote
//! already holds an almost identical older snapshot. Smart push links the
//! new snapshot to the newest snapshot both sides share through a merge
//! commit that keeps the new tree, which lets git negotiate a thin pack.

use crate::progress::ProgressMonitor;
use crate::{list_snapshots, SnapshotStore, StoreError};
use snapshot::{snapshots_by_world, SnapshotId, WorldId};
use std::collections::{BTreeMap, BTreeSet};

/// Scratch branch carrying the synthesized merge
pub const TEMP_BRANCH: &str = "worldsnap/push-tmp";

/// Git config key recording which world pushes to `remote`
pub fn world_marker_key(remote: &str) -> String {
    format!("worldsnap.{}.world", remote)
}

/// Which transient artifacts to remove after a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOptions {
    pub tracking_refs: bool,
    pub local_temp_branch: bool,
    pub remote_temp_branch: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            tracking_refs: true,
            local_temp_branch: true,
            remote_temp_branch: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOptions {
    pub remote: String,
    /// Synthesize shared history when possible
    pub smart: bool,
    /// Refuse to push into a remote that belongs to another world
    pub check_world: bool,
    pub cleanup: CleanupOptions,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            smart: true,
            check_world: true,
            cleanup: CleanupOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStrategy {
    Naive,
    Smart { base: SnapshotId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// No remote configured; nothing was sent
    NoRemote,
    Pushed {
        strategy: PushStrategy,
        /// Cleanup steps that failed; the push itself succeeded
        cleanup_failures: Vec<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Snapshot {0} does not exist locally")]
    MissingSnapshot(String),

    #[error(
        "Remote '{remote}' holds snapshots of other worlds ({}) but none of world {world}",
        .others.iter().map(WorldId::as_str).collect::<Vec<_>>().join(", ")
    )]
    WorldMismatch {
        remote: String,
        world: WorldId,
        others: Vec<WorldId>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Push engine bound to one store and one set of options
pub struct SmartPush<'a, S: SnapshotStore + ?Sized> {
    store: &'a S,
    options: &'a PushOptions,
}

impl<'a, S: SnapshotStore + ?Sized> SmartPush<'a, S> {
    pub fn new(store: &'a S, options: &'a PushOptions) -> Self {
        Self { store, options }
    }

    /// Push `snapshot` to the configured remote
    pub fn push(
        &self,
        snapshot: &SnapshotId,
        progress: &mut dyn ProgressMonitor,
    ) -> Result<PushOutcome, SyncError> {
        let remote = self.options.remote.as_str();
        let name = snapshot.store_name();

        let Some(url) = self.store.remote_url(remote)? else {
            tracing::info!("No remote '{}' configured, skipping push", remote);
            return Ok(PushOutcome::NoRemote);
        };
        if self.store.resolve_ref(&name)?.is_none() {
            return Err(SyncError::MissingSnapshot(name));
        }

        let remote_refs = self.store.remote_refs(remote)?;
        let by_world = snapshots_by_world(remote_refs.iter().map(String::as_str));
        let world = snapshot.world();

        if self.options.check_world {
            self.check_world(world, &by_world)?;
        }

        let base = match by_world.get(world) {
            Some(remote_snapshots) if self.options.smart => {
                self.merge_base(snapshot, remote_snapshots)?
            }
            _ => None,
        };

        tracing::info!("Pushing {} to {} ({})", name, remote, url);
        let (strategy, mut cleanup_failures) = match base {
            None => {
                self.store.push(remote, &[name.clone()], progress)?;
                (PushStrategy::Naive, Vec::new())
            }
            Some(base) => {
                let failures = self.push_linked(snapshot, &base, progress)?;
                (PushStrategy::Smart { base }, failures)
            }
        };

        if self.options.cleanup.tracking_refs {
            let mut pushed = vec![name.clone()];
            if matches!(strategy, PushStrategy::Smart { .. }) {
                pushed.push(TEMP_BRANCH.to_string());
            }
            for branch in pushed {
                if let Err(e) = self.store.delete_tracking_ref(remote, &branch) {
                    tracing::warn!("Failed to delete tracking ref {}/{}: {}", remote, branch, e);
                    cleanup_failures.push(format!("tracking ref {}/{}: {}", remote, branch, e));
                }
            }
        }

        if let Err(e) = self.store.config_set(&world_marker_key(remote), world.as_str()) {
            tracing::warn!("Failed to record world marker for {}: {}", remote, e);
        }

        Ok(PushOutcome::Pushed {
            strategy,
            cleanup_failures,
        })
    }

    /// Refuse a remote that only ever served another world
    fn check_world(
        &self,
        world: &WorldId,
        by_world: &BTreeMap<WorldId, BTreeSet<SnapshotId>>,
    ) -> Result<(), SyncError> {
        let remote = self.options.remote.as_str();
        let others: Vec<WorldId> = by_world.keys().filter(|w| *w != world).cloned().collect();

        if by_world.contains_key(world) {
            if !others.is_empty() {
                tracing::warn!(
                    "Remote '{}' also holds snapshots of {} other world(s)",
                    remote,
                    others.len()
                );
            }
            return Ok(());
        }
        if others.is_empty() {
            return Ok(());
        }

        let marker = self.store.config_get(&world_marker_key(remote))?;
        if marker.as_deref() == Some(world.as_str()) {
            return Err(SyncError::WorldMismatch {
                remote: remote.to_string(),
                world: world.clone(),
                others,
            });
        }

        tracing::warn!(
            "Remote '{}' holds only snapshots of other worlds; pushing {} for the first time",
            remote,
            world
        );
        Ok(())
    }

    /// Newest snapshot present both locally and on the remote
    fn merge_base(
        &self,
        snapshot: &SnapshotId,
        remote_snapshots: &BTreeSet<SnapshotId>,
    ) -> Result<Option<SnapshotId>, StoreError> {
        let local = list_snapshots(self.store, snapshot.world())?;
        Ok(local
            .intersection(remote_snapshots)
            .filter(|id| *id != snapshot)
            .max()
            .cloned())
    }

    /// Push through the temp branch; returns cleanup failures
    fn push_linked(
        &self,
        snapshot: &SnapshotId,
        base: &SnapshotId,
        progress: &mut dyn ProgressMonitor,
    ) -> Result<Vec<String>, SyncError> {
        let remote = self.options.remote.as_str();
        let name = snapshot.store_name();
        let cleanup = self.options.cleanup;
        tracing::debug!("Linking {} to common snapshot {}", name, base);

        let pushed = self
            .store
            .create_branch(TEMP_BRANCH, &name)
            .and_then(|()| {
                self.store.merge_ours(
                    TEMP_BRANCH,
                    &base.store_name(),
                    &format!("Link {} to {}", name, base),
                )
            })
            .and_then(|_| {
                self.store
                    .push(remote, &[TEMP_BRANCH.to_string(), name.clone()], progress)
            });

        // The temp branch goes away whether or not the transfer worked
        let mut failures = Vec::new();
        if cleanup.local_temp_branch {
            if let Err(e) = self.store.delete_local_ref(TEMP_BRANCH) {
                tracing::warn!("Failed to delete local {}: {}", TEMP_BRANCH, e);
                failures.push(format!("local {}: {}", TEMP_BRANCH, e));
            }
        }
        pushed?;

        if cleanup.remote_temp_branch {
            if let Err(e) = self
                .store
                .delete_remote_refs(remote, &[TEMP_BRANCH.to_string()])
            {
                tracing::warn!("Failed to delete {} on {}: {}", TEMP_BRANCH, remote, e);
                failures.push(format!("remote {}: {}", TEMP_BRANCH, e));
            }
        }

        Ok(failures)
    }
}
