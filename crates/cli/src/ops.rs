//! Backup operations
//!
//! Each operation runs on an execution-gate worker. Write operations check
//! the cancel token between steps so a shutdown can stop them at a step
//! boundary.

use crate::config::Config;
use crate::gate::CancelToken;
use crate::host::{SavingPaused, WorldHost};
use crate::util;
use anyhow::{Context, Result};
use gitstore::progress::{PUSH_PHASES, RESTORE_PHASES};
use gitstore::{
    list_remote_snapshots, list_snapshots, restore_snapshot, CombinedProgress, PushOutcome,
    RestoreSource, SmartPush, SnapshotStore, StoreError,
};
use snapshot::{NamingScheme, RetentionPolicy, SnapshotId, WorldId};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of pruning one side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub pruned: Vec<SnapshotId>,
    pub kept: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub snapshot: SnapshotId,
    pub local: PruneReport,
    pub push: PushOutcome,
    pub remote: PruneReport,
}

/// Handles shared by every operation
#[derive(Clone)]
pub struct Ops {
    config: Arc<Config>,
    host: Arc<dyn WorldHost>,
    store: Arc<dyn SnapshotStore>,
    world: WorldId,
}

impl Ops {
    pub fn new(
        config: Arc<Config>,
        host: Arc<dyn WorldHost>,
        store: Arc<dyn SnapshotStore>,
        world: WorldId,
    ) -> Self {
        Self {
            config,
            host,
            store,
            world,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn host(&self) -> &dyn WorldHost {
        self.host.as_ref()
    }

    pub fn store(&self) -> &dyn SnapshotStore {
        self.store.as_ref()
    }

    pub fn world(&self) -> &WorldId {
        &self.world
    }

    pub fn git_dir(&self) -> PathBuf {
        self.store.work_dir().join(".git")
    }

    pub fn list_local(&self) -> Result<BTreeSet<SnapshotId>> {
        list_snapshots(self.store(), &self.world).context("Failed to list local snapshots")
    }

    pub fn list_remote(&self) -> Result<BTreeSet<SnapshotId>> {
        let remote = &self.config.remote.name;
        list_remote_snapshots(self.store(), remote, &self.world)
            .with_context(|| format!("Failed to list snapshots on '{}'", remote))
    }

    /// Snapshot the world; `None` when backups are disabled
    pub fn commit(&self, cancel: &CancelToken) -> Result<Option<SnapshotId>> {
        if !self.config.backup.enabled {
            tracing::info!("Backups are disabled, not taking a snapshot");
            return Ok(None);
        }

        let _paused = SavingPaused::new(self.host());
        self.host.trigger_save().context("Host failed to save the world")?;
        cancel.check()?;

        let id = self.commit_unique()?;
        self.host
            .send_message(&format!("Snapshot {} created", id.short_name()));
        Ok(Some(id))
    }

    /// Names have one-second resolution; a second commit within the same
    /// second waits for the next one
    fn commit_unique(&self) -> Result<SnapshotId> {
        for _ in 0..2 {
            let id = NamingScheme::Current.create(&self.world);
            let message = format!(
                "Snapshot of {} at {}",
                self.host.world_name(),
                id.timestamp().to_rfc3339()
            );
            match self.store.commit_snapshot(&id.store_name(), &message) {
                Ok(commit) => {
                    tracing::info!("Created snapshot {} ({})", id, commit);
                    return Ok(id);
                }
                Err(StoreError::RefExists(_)) => std::thread::sleep(Duration::from_millis(1000)),
                Err(e) => return Err(e).context("Failed to commit snapshot"),
            }
        }
        anyhow::bail!("Snapshot name still taken after waiting")
    }

    /// Push `snapshot`, or the newest local snapshot
    pub fn push(&self, snapshot: Option<&SnapshotId>, cancel: &CancelToken) -> Result<PushOutcome> {
        let snapshot = match snapshot {
            Some(id) => id.clone(),
            None => self
                .list_local()?
                .into_iter()
                .next_back()
                .context("No snapshots to push")?,
        };
        cancel.check()?;

        let options = self.config.push_options();
        let host = Arc::clone(&self.host);
        let mut progress = CombinedProgress::new(PUSH_PHASES, |pct| {
            host.set_status(Some(&format!("Pushing {}%", pct)));
        });

        let result = SmartPush::new(self.store(), &options).push(&snapshot, &mut progress);
        self.host.set_status(None);
        let outcome = result.with_context(|| format!("Failed to push {}", snapshot))?;

        if let PushOutcome::Pushed {
            cleanup_failures, ..
        } = &outcome
        {
            if !cleanup_failures.is_empty() {
                self.host.send_message(&format!(
                    "Pushed {}, but {} cleanup step(s) failed",
                    snapshot.short_name(),
                    cleanup_failures.len()
                ));
            }
        }
        Ok(outcome)
    }

    /// Apply the local retention policy
    pub fn prune_local(&self, cancel: &CancelToken) -> Result<PruneReport> {
        self.prune_local_keeping(None, cancel)
    }

    fn prune_local_keeping(
        &self,
        keep: Option<&SnapshotId>,
        cancel: &CancelToken,
    ) -> Result<PruneReport> {
        let Some(policy) = self.config.retention.local_policy() else {
            tracing::debug!("No local retention policy");
            return Ok(PruneReport::default());
        };

        let snapshots = self.list_local()?;
        let report = plan(&policy, &snapshots, keep);

        for id in &report.pruned {
            cancel.check()?;
            self.store
                .delete_local_ref(&id.store_name())
                .with_context(|| format!("Failed to delete {}", id))?;
        }

        if !report.pruned.is_empty() {
            tracing::info!("Pruned {} local snapshot(s)", report.pruned.len());
            if let Err(e) = self.store.collect_garbage() {
                tracing::warn!("Garbage collection failed: {}", e);
            }
        }
        Ok(report)
    }

    /// Apply the remote retention policy
    pub fn prune_remote(&self, cancel: &CancelToken) -> Result<PruneReport> {
        self.prune_remote_keeping(None, cancel)
    }

    fn prune_remote_keeping(
        &self,
        keep: Option<&SnapshotId>,
        cancel: &CancelToken,
    ) -> Result<PruneReport> {
        let Some(policy) = self.config.retention.remote_policy() else {
            tracing::debug!("No remote retention policy");
            return Ok(PruneReport::default());
        };
        let remote = self.config.remote.name.as_str();
        if self.store.remote_url(remote)?.is_none() {
            tracing::debug!("No remote '{}', nothing to prune", remote);
            return Ok(PruneReport::default());
        }

        let snapshots = self.list_remote()?;
        let report = plan(&policy, &snapshots, keep);
        if report.pruned.is_empty() {
            return Ok(report);
        }
        cancel.check()?;

        let names: Vec<String> = report.pruned.iter().map(SnapshotId::store_name).collect();
        self.store
            .delete_remote_refs(remote, &names)
            .with_context(|| format!("Failed to delete snapshots on '{}'", remote))?;

        for name in &names {
            if let Err(e) = self.store.delete_tracking_ref(remote, name) {
                tracing::warn!("Failed to delete tracking ref {}/{}: {}", remote, name, e);
            }
        }
        tracing::info!("Pruned {} snapshot(s) on '{}'", names.len(), remote);
        Ok(report)
    }

    /// Snapshot, push, then prune both sides
    ///
    /// The new snapshot is pushed before anything is pruned and is never
    /// part of either prune set. `None` when backups are disabled.
    pub fn backup(&self, cancel: &CancelToken) -> Result<Option<BackupReport>> {
        let Some(snapshot) = self.commit(cancel)? else {
            return Ok(None);
        };
        cancel.check()?;

        let push = self.push(Some(&snapshot), cancel)?;
        cancel.check()?;

        let local = self.prune_local_keeping(Some(&snapshot), cancel)?;
        cancel.check()?;

        let remote = match push {
            PushOutcome::Pushed { .. } => self.prune_remote_keeping(Some(&snapshot), cancel)?,
            PushOutcome::NoRemote => PruneReport::default(),
        };

        self.host
            .send_message(&format!("Backup {} complete", snapshot.short_name()));
        Ok(Some(BackupReport {
            snapshot,
            local,
            push,
            remote,
        }))
    }

    /// Restore `reference` into a fresh directory
    pub fn restore(
        &self,
        reference: &str,
        source: &RestoreSource,
        into: Option<&Path>,
    ) -> Result<PathBuf> {
        let snapshots = match source {
            RestoreSource::Local => self.list_local()?,
            RestoreSource::Remote(remote) => list_remote_snapshots(self.store(), remote, &self.world)
                .with_context(|| format!("Failed to list snapshots on '{}'", remote))?,
        };
        let snapshot = util::resolve_snapshot(reference, &snapshots)?;

        let parent = into
            .map(Path::to_path_buf)
            .or_else(|| self.config.restore.directory.clone())
            .or_else(|| self.host.world_dir().parent().map(Path::to_path_buf))
            .context("No directory to restore into")?;

        let host = Arc::clone(&self.host);
        let mut progress = CombinedProgress::new(RESTORE_PHASES, |pct| {
            host.set_status(Some(&format!("Restoring {}%", pct)));
        });

        let result = restore_snapshot(
            self.store(),
            source,
            &snapshot,
            &parent,
            &self.host.world_name(),
            &mut progress,
        );
        self.host.set_status(None);
        let target = result.with_context(|| format!("Failed to restore {}", snapshot))?;

        self.host.send_message(&format!(
            "Restored {} into {}",
            snapshot.short_name(),
            target.display()
        ));
        Ok(target)
    }
}

fn plan(
    policy: &RetentionPolicy,
    snapshots: &BTreeSet<SnapshotId>,
    keep: Option<&SnapshotId>,
) -> PruneReport {
    let mut pruned = policy.snapshots_to_prune(snapshots);
    pruned.retain(|id| Some(id) != keep);
    PruneReport {
        kept: snapshots.len() - pruned.len(),
        pruned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn snapshots(count: i64) -> Vec<SnapshotId> {
        let world = WorldId::new("W").unwrap();
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        (0..count)
            .map(|i| NamingScheme::Current.create_at(&world, base + Duration::minutes(i)))
            .collect()
    }

    #[test]
    fn test_plan_never_prunes_kept_snapshot() {
        let s = snapshots(2);
        let set: BTreeSet<_> = s.iter().cloned().collect();
        let policy = RetentionPolicy::fixed_count(1);

        // Fixed count 1 selects the newest of two
        assert_eq!(plan(&policy, &set, None).pruned, vec![s[1].clone()]);

        let report = plan(&policy, &set, Some(&s[1]));
        assert!(report.pruned.is_empty());
        assert_eq!(report.kept, 2);
    }

    #[test]
    fn test_plan_keeps_only_the_named_snapshot() {
        let s = snapshots(4);
        let set: BTreeSet<_> = s.iter().cloned().collect();
        let report = plan(&RetentionPolicy::fixed_count(1), &set, Some(&s[3]));

        assert_eq!(report.pruned, vec![s[2].clone(), s[1].clone()]);
        assert_eq!(report.kept, 2);
    }
}
