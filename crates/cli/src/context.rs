//! The backup context: everything an operation needs, built once
//!
//! A process holds at most one live context. It owns the configuration,
//! the host capability, the store and the execution gate, and is passed by
//! reference to every command.

use crate::config::Config;
use crate::gate::{CancelToken, ExecutionGate, ExecutionLock, GateError, OperationHandle, ShutdownOutcome};
use crate::host::WorldHost;
use crate::locks::WriteLock;
use crate::ops::Ops;
use anyhow::Context;
use gitstore::{GitRepo, SnapshotStore, StoreError};
use snapshot::WorldId;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("A backup context is already initialized in this process")]
    AlreadyInitialized,

    #[error("World directory does not exist: {0}")]
    MissingWorld(PathBuf),

    #[error("Failed to read or create the world id: {0}")]
    WorldId(#[source] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to start worker threads: {0}")]
    Workers(#[source] std::io::Error),
}

pub struct BackupContext {
    repo: Arc<GitRepo>,
    ops: Ops,
    gate: ExecutionGate,
}

impl BackupContext {
    /// Build the context; fails if another one is alive in this process
    pub fn init(config: Config, host: Arc<dyn WorldHost>) -> Result<Self, InitError> {
        if INITIALIZED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(InitError::AlreadyInitialized);
        }

        Self::build(config, host).inspect_err(|_| {
            INITIALIZED.store(false, Ordering::SeqCst);
        })
    }

    fn build(config: Config, host: Arc<dyn WorldHost>) -> Result<Self, InitError> {
        let world_dir = host.world_dir().to_path_buf();
        if !world_dir.is_dir() {
            return Err(InitError::MissingWorld(world_dir));
        }

        let world = WorldId::load_or_create(&world_dir).map_err(InitError::WorldId)?;
        let repo = GitRepo::open_or_init(&world_dir, config.repo.identity())?;
        if config.repo.update_gitignore && repo.update_ignore_file()? {
            tracing::debug!("Updated .gitignore");
        }
        if config.repo.update_gitattributes && repo.update_attributes_file()? {
            tracing::debug!("Updated .gitattributes");
        }

        let gate = ExecutionGate::new(config.gate.workers).map_err(InitError::Workers)?;
        let repo = Arc::new(repo);
        let store: Arc<dyn SnapshotStore> = repo.clone();
        let ops = Ops::new(Arc::new(config), host, store, world);

        tracing::debug!("Backup context ready for world {}", ops.world());
        Ok(Self { repo, ops, gate })
    }

    pub fn config(&self) -> &Config {
        self.ops.config()
    }

    pub fn host(&self) -> &dyn WorldHost {
        self.ops.host()
    }

    pub fn repo(&self) -> &GitRepo {
        &self.repo
    }

    pub fn world(&self) -> &WorldId {
        self.ops.world()
    }

    pub fn ops(&self) -> &Ops {
        &self.ops
    }

    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }

    /// Run `op` on the gate
    ///
    /// Write operations also hold the cross-process [`WriteLock`] while
    /// they run.
    pub fn submit<T, F>(
        &self,
        lock: ExecutionLock,
        label: &'static str,
        op: F,
    ) -> Result<OperationHandle<anyhow::Result<T>>, GateError>
    where
        T: Send + 'static,
        F: FnOnce(&Ops, &CancelToken) -> anyhow::Result<T> + Send + 'static,
    {
        let ops = self.ops.clone();
        self.gate.submit(lock, move |cancel| {
            let _lock = match lock {
                ExecutionLock::Write => Some(WriteLock::acquire(&ops.git_dir(), label)?),
                ExecutionLock::None | ExecutionLock::WriteConfig => None,
            };
            tracing::debug!("Running {}", label);
            op(&ops, cancel).with_context(|| format!("{} failed", label))
        })
    }

    /// Close the gate, waiting up to the configured timeout for a write
    pub fn shutdown(&self) -> ShutdownOutcome {
        let timeout = Duration::from_secs(self.config().gate.shutdown_timeout_secs);
        self.gate.shutdown(timeout)
    }
}

impl Drop for BackupContext {
    fn drop(&mut self) {
        INITIALIZED.store(false, Ordering::SeqCst);
    }
}

/// Wait for a gate operation from async code
pub async fn wait<T: Send + 'static>(handle: OperationHandle<anyhow::Result<T>>) -> anyhow::Result<T> {
    let outcome = tokio::task::spawn_blocking(move || handle.wait())
        .await
        .context("Worker task failed")?;
    outcome?
}
