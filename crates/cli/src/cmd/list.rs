//! List snapshots of the world

use crate::context::{self, BackupContext};
use crate::gate::ExecutionLock;
use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;

pub async fn run(ctx: &BackupContext, remote: bool) -> Result<()> {
    let handle = ctx.submit(ExecutionLock::None, "list", move |ops, _| {
        if remote {
            ops.list_remote()
        } else {
            ops.list_local()
        }
    })?;
    let snapshots = context::wait(handle).await?;

    let location = if remote {
        format!("on '{}'", ctx.config().remote.name)
    } else {
        "locally".to_string()
    };
    if snapshots.is_empty() {
        println!("{}", format!("No snapshots {}", location).dimmed());
        return Ok(());
    }

    println!(
        "{} {} snapshot(s) {}",
        ctx.host().world_name().bold(),
        snapshots.len(),
        location
    );
    let now = chrono::Utc::now();
    for id in snapshots.iter().rev() {
        util::display_snapshot(id, now);
    }
    Ok(())
}
