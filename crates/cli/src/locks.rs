//! Lock file management for write exclusivity across processes
//!
//! The execution gate keeps one process from running two writes at once;
//! this lock extends that to several `wsnap` processes working on the same
//! world repository.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Lock file name inside `.git`
pub const WRITE_LOCK_FILE: &str = "worldsnap.lock";

/// Exclusive write lock on a world repository
///
/// The lock file stays in place; dropping the lock closes the descriptor,
/// which releases the flock.
pub struct WriteLock {
    #[allow(dead_code)]
    file: File,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
pub struct LockContent {
    pub pid: u32,
    pub started_at: u64,
    pub operation: String,
}

impl WriteLock {
    /// Acquire the write lock (non-blocking)
    ///
    /// Returns error if another process holds the lock.
    pub fn acquire(git_dir: &Path, operation: &str) -> Result<Self> {
        let lock_path = git_dir.join(WRITE_LOCK_FILE);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .context("Failed to open write lock file")?;

        if !try_flock_exclusive(&file)? {
            match read_lock_content(&mut file) {
                Ok(holder) => anyhow::bail!(
                    "Another worldsnap process (pid {}) is running '{}'",
                    holder.pid,
                    holder.operation
                ),
                Err(_) => anyhow::bail!("Another worldsnap process holds the write lock"),
            }
        }

        write_lock_content(&mut file, operation)?;

        Ok(Self { file })
    }

    /// Check if the write lock is currently held by another process
    pub fn is_held(git_dir: &Path) -> bool {
        let lock_path = git_dir.join(WRITE_LOCK_FILE);
        if !lock_path.exists() {
            return false;
        }

        match OpenOptions::new().read(true).write(true).open(&lock_path) {
            Ok(file) => match try_flock_exclusive(&file) {
                // Acquired means nobody else had it; dropping `file` releases it
                Ok(acquired) => !acquired,
                Err(_) => true,
            },
            Err(_) => true,
        }
    }
}

/// Write lock content (PID + timestamp + operation)
fn write_lock_content(file: &mut File, operation: &str) -> Result<()> {
    let content = LockContent {
        pid: std::process::id(),
        started_at: current_timestamp_ms(),
        operation: operation.to_string(),
    };

    let serialized = serde_json::to_string(&content).context("Failed to serialize lock content")?;

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(serialized.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Read lock content from file
fn read_lock_content(file: &mut File) -> Result<LockContent> {
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    let content: LockContent =
        serde_json::from_str(&contents).context("Failed to deserialize lock content")?;
    Ok(content)
}

/// Try to acquire exclusive file lock (non-blocking)
#[cfg(unix)]
#[allow(deprecated)]
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Non-unix platforms rely on the in-process gate only
#[cfg(not(unix))]
fn try_flock_exclusive(_file: &File) -> Result<bool> {
    Ok(true)
}

fn current_timestamp_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
