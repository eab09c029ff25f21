//! Take a snapshot of the world

use crate::context::{self, BackupContext};
use crate::gate::ExecutionLock;
use anyhow::Result;
use owo_colors::OwoColorize;

pub async fn run(ctx: &BackupContext) -> Result<()> {
    let handle = ctx.submit(ExecutionLock::Write, "commit", |ops, cancel| ops.commit(cancel))?;

    match context::wait(handle).await? {
        Some(id) => {
            println!("{} Snapshot {}", "✓".green(), id.short_name().yellow());
            println!("  {}", id.store_name().dimmed());
        }
        None => println!("{}", "Backups are disabled (backup.enabled = false)".yellow()),
    }
    Ok(())
}
