//! In-memory `SnapshotStore` for unit tests

use crate::progress::ProgressMonitor;
use crate::{SnapshotStore, StoreError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Default)]
struct State {
    /// branch -> commit id
    local: BTreeMap<String, String>,
    /// remote -> branch names
    remotes: BTreeMap<String, BTreeSet<String>>,
    tracking: BTreeSet<(String, String)>,
    config: BTreeMap<String, String>,
    pushes: Vec<Vec<String>>,
    next_commit: u64,
    fail_pushes: bool,
    fail_remote_deletes: bool,
}

pub(crate) struct MemoryStore {
    work_dir: PathBuf,
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            work_dir: PathBuf::from("/memory"),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_remote(remote: &str) -> Self {
        let store = Self::new();
        store.state.lock().remotes.insert(remote.to_string(), BTreeSet::new());
        store
    }

    pub fn seed_remote(&self, remote: &str, branches: &[String]) {
        let mut state = self.state.lock();
        let refs = state.remotes.entry(remote.to_string()).or_default();
        refs.extend(branches.iter().cloned());
    }

    /// Branch lists of every successful push, in order
    pub fn pushes(&self) -> Vec<Vec<String>> {
        self.state.lock().pushes.clone()
    }

    pub fn fail_pushes(&self) {
        self.state.lock().fail_pushes = true;
    }

    pub fn fail_remote_deletes(&self) {
        self.state.lock().fail_remote_deletes = true;
    }
}

fn failure(command: &str) -> StoreError {
    StoreError::Command {
        command: command.to_string(),
        code: Some(1),
        stdout: String::new(),
        stderr: "simulated failure".to_string(),
    }
}

impl SnapshotStore for MemoryStore {
    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn local_refs(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.state.lock().local.keys().cloned().collect())
    }

    fn remote_refs(&self, remote: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock();
        state
            .remotes
            .get(remote)
            .map(|refs| refs.iter().cloned().collect())
            .ok_or_else(|| failure("ls-remote"))
    }

    fn resolve_ref(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().local.get(name).cloned())
    }

    fn commit_snapshot(&self, name: &str, _message: &str) -> Result<String, StoreError> {
        let mut state = self.state.lock();
        if state.local.contains_key(name) {
            return Err(StoreError::RefExists(name.to_string()));
        }
        state.next_commit += 1;
        let commit = format!("c{}", state.next_commit);
        state.local.insert(name.to_string(), commit.clone());
        Ok(commit)
    }

    fn create_branch(&self, name: &str, target: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let commit = state
            .local
            .get(target)
            .cloned()
            .ok_or_else(|| StoreError::RefNotFound(target.to_string()))?;
        state.local.insert(name.to_string(), commit);
        Ok(())
    }

    fn merge_ours(&self, branch: &str, other: &str, _message: &str) -> Result<String, StoreError> {
        let mut state = self.state.lock();
        for name in [branch, other] {
            if !state.local.contains_key(name) {
                return Err(StoreError::RefNotFound(name.to_string()));
            }
        }
        state.next_commit += 1;
        let merge = format!("m{}", state.next_commit);
        state.local.insert(branch.to_string(), merge.clone());
        Ok(merge)
    }

    fn push(
        &self,
        remote: &str,
        branches: &[String],
        progress: &mut dyn ProgressMonitor,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.fail_pushes {
            return Err(failure("push"));
        }
        let refs = state
            .remotes
            .get_mut(remote)
            .ok_or_else(|| failure("push"))?;
        refs.extend(branches.iter().cloned());
        for branch in branches {
            state.tracking.insert((remote.to_string(), branch.clone()));
        }
        state.pushes.push(branches.to_vec());
        progress.update("Writing objects", 1, Some(1));
        progress.finish();
        Ok(())
    }

    fn delete_local_ref(&self, name: &str) -> Result<(), StoreError> {
        self.state.lock().local.remove(name);
        Ok(())
    }

    fn delete_tracking_ref(&self, remote: &str, name: &str) -> Result<bool, StoreError> {
        Ok(self
            .state
            .lock()
            .tracking
            .remove(&(remote.to_string(), name.to_string())))
    }

    fn delete_remote_refs(&self, remote: &str, names: &[String]) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.fail_remote_deletes {
            return Err(failure("push --delete"));
        }
        if let Some(refs) = state.remotes.get_mut(remote) {
            for name in names {
                refs.remove(name);
            }
        }
        Ok(())
    }

    fn remote_url(&self, remote: &str) -> Result<Option<String>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .remotes
            .contains_key(remote)
            .then(|| format!("memory://{}", remote)))
    }

    fn config_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().config.get(key).cloned())
    }

    fn config_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.state
            .lock()
            .config
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clone_branch(
        &self,
        _source: &str,
        _branch: &str,
        _target: &Path,
        _progress: &mut dyn ProgressMonitor,
    ) -> Result<(), StoreError> {
        Err(failure("clone"))
    }

    fn collect_garbage(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
