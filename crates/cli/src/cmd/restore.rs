//! Restore a snapshot into a new directory

use crate::context::{self, BackupContext};
use crate::gate::ExecutionLock;
use anyhow::Result;
use gitstore::{RestoreSource, SnapshotStore};
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub async fn run(ctx: &BackupContext, reference: &str, local: bool, into: Option<PathBuf>) -> Result<()> {
    let remote = ctx.config().remote.name.clone();
    let source = if local {
        RestoreSource::Local
    } else if ctx.repo().remote_url(&remote)?.is_some() {
        RestoreSource::Remote(remote)
    } else {
        println!(
            "{} No remote '{}' configured, restoring from the local repository",
            "!".yellow(),
            remote
        );
        RestoreSource::Local
    };

    // Restore writes into a fresh directory, never the world itself
    let reference = reference.to_string();
    let handle = ctx.submit(ExecutionLock::None, "restore", move |ops, _| {
        ops.restore(&reference, &source, into.as_deref())
    })?;
    let target = context::wait(handle).await?;

    println!("{} Restored into {}", "✓".green(), target.display().to_string().cyan());
    Ok(())
}
