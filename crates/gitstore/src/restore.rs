//! Restoring a snapshot into a fresh directory next to the world

use crate::progress::ProgressMonitor;
use crate::{SnapshotStore, StoreError};
use snapshot::SnapshotId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Attempts at finding a free target directory name
pub const MAX_TARGET_ATTEMPTS: usize = 100;

/// Where the snapshot is cloned from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreSource {
    /// The world's own repository
    Local,
    /// A configured remote, by name
    Remote(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("No free restore directory for '{}' after {} attempts", .0, MAX_TARGET_ATTEMPTS)]
    TargetExhausted(String),

    #[error("Snapshot {0} does not exist locally")]
    MissingSnapshot(String),

    #[error("Remote '{0}' is not configured")]
    NoRemote(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Replace everything but word characters and `-` with `_`
pub fn sanitize_dir_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Create and return a fresh directory `<parent>/<world>-<short>`
///
/// On collision `_1`, `_2`, ... are appended. The directory is created
/// here so two restores can't pick the same name.
pub fn restore_target_dir(
    parent: &Path,
    world_name: &str,
    snapshot: &SnapshotId,
) -> Result<PathBuf, RestoreError> {
    let base = sanitize_dir_name(&format!("{}-{}", world_name, snapshot.short_name()));

    fs::create_dir_all(parent).map_err(|source| RestoreError::Io {
        path: parent.to_path_buf(),
        source,
    })?;

    for attempt in 0..MAX_TARGET_ATTEMPTS {
        let name = if attempt == 0 {
            base.clone()
        } else {
            format!("{}_{}", base, attempt)
        };
        let candidate = parent.join(name);

        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => {
                return Err(RestoreError::Io {
                    path: candidate,
                    source,
                })
            }
        }
    }

    Err(RestoreError::TargetExhausted(base))
}

/// Clone `snapshot` into a new directory under `parent`
///
/// The result is a plain directory tree; the clone's `.git` is removed.
pub fn restore_snapshot<S: SnapshotStore + ?Sized>(
    store: &S,
    source: &RestoreSource,
    snapshot: &SnapshotId,
    parent: &Path,
    world_name: &str,
    progress: &mut dyn ProgressMonitor,
) -> Result<PathBuf, RestoreError> {
    let name = snapshot.store_name();

    let url = match source {
        RestoreSource::Local => {
            if store.resolve_ref(&name)?.is_none() {
                return Err(RestoreError::MissingSnapshot(name));
            }
            store.work_dir().to_string_lossy().into_owned()
        }
        RestoreSource::Remote(remote) => store
            .remote_url(remote)?
            .ok_or_else(|| RestoreError::NoRemote(remote.clone()))?,
    };

    let target = restore_target_dir(parent, world_name, snapshot)?;
    tracing::info!("Restoring {} into {}", name, target.display());

    if let Err(e) = store.clone_branch(&url, &name, &target, progress) {
        if let Err(cleanup) = fs::remove_dir_all(&target) {
            tracing::warn!("Failed to remove {}: {}", target.display(), cleanup);
        }
        return Err(e.into());
    }

    let git_dir = target.join(".git");
    fs::remove_dir_all(&git_dir).map_err(|source| RestoreError::Io {
        path: git_dir,
        source,
    })?;

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::progress::NoProgress;
    use chrono::{TimeZone, Utc};
    use snapshot::{NamingScheme, WorldId};
    use tempfile::TempDir;

    fn snapshot() -> SnapshotId {
        let world = WorldId::new("W").unwrap();
        NamingScheme::Current.create_at(&world, Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap())
    }

    #[test]
    fn test_sanitize_dir_name() {
        assert_eq!(sanitize_dir_name("My World!-2024"), "My_World_-2024");
        assert_eq!(sanitize_dir_name("a/b\\c"), "a_b_c");
    }

    #[test]
    fn test_target_dir_collisions() {
        let temp = TempDir::new().unwrap();
        let s = snapshot();

        let first = restore_target_dir(temp.path(), "My World", &s).unwrap();
        let second = restore_target_dir(temp.path(), "My World", &s).unwrap();
        let third = restore_target_dir(temp.path(), "My World", &s).unwrap();

        assert_eq!(first, temp.path().join("My_World-2024-05-06_07-08-09"));
        assert_eq!(second, temp.path().join("My_World-2024-05-06_07-08-09_1"));
        assert_eq!(third, temp.path().join("My_World-2024-05-06_07-08-09_2"));
        assert!(first.is_dir() && second.is_dir() && third.is_dir());
    }

    #[test]
    fn test_target_dir_exhaustion() {
        let temp = TempDir::new().unwrap();
        let s = snapshot();
        for _ in 0..MAX_TARGET_ATTEMPTS {
            restore_target_dir(temp.path(), "w", &s).unwrap();
        }

        let err = restore_target_dir(temp.path(), "w", &s).unwrap_err();
        assert!(matches!(err, RestoreError::TargetExhausted(_)));
        assert_eq!(
            err.to_string(),
            "No free restore directory for 'w-2024-05-06_07-08-09' after 100 attempts"
        );
    }

    #[test]
    fn test_missing_local_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new();

        let err = restore_snapshot(
            &store,
            &RestoreSource::Local,
            &snapshot(),
            temp.path(),
            "w",
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, RestoreError::MissingSnapshot(_)));
    }

    #[test]
    fn test_failed_clone_removes_target() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let s = snapshot();
        store.commit_snapshot(&s.store_name(), "snapshot").unwrap();

        let err = restore_snapshot(&store, &RestoreSource::Local, &s, temp.path(), "w", &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, RestoreError::Store(_)));
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unconfigured_remote() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new();

        let err = restore_snapshot(
            &store,
            &RestoreSource::Remote("origin".to_string()),
            &snapshot(),
            temp.path(),
            "w",
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, RestoreError::NoRemote(_)));
    }
}
