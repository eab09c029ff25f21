//! Apply a retention policy

use crate::context::{self, BackupContext};
use crate::gate::ExecutionLock;
use anyhow::Result;
use owo_colors::OwoColorize;
use snapshot::policy;

pub async fn run(ctx: &BackupContext, remote: bool) -> Result<()> {
    let retention = &ctx.config().retention;
    let (label, text) = if remote {
        (format!("remote '{}'", ctx.config().remote.name), retention.remote.clone())
    } else {
        ("local".to_string(), retention.local.clone())
    };

    let Some(description) = policy::describe(&text) else {
        println!("{} No {} retention policy configured", "!".yellow(), label);
        return Ok(());
    };
    println!("{} {}", "Policy:".bold(), description);

    let handle = ctx.submit(ExecutionLock::Write, "prune", move |ops, cancel| {
        if remote {
            ops.prune_remote(cancel)
        } else {
            ops.prune_local(cancel)
        }
    })?;
    let report = context::wait(handle).await?;

    if report.pruned.is_empty() {
        println!("{}", "Nothing to prune".dimmed());
    } else {
        for id in &report.pruned {
            println!("  {} {}", "-".red(), id.short_name());
        }
        println!(
            "{} Pruned {} {} snapshot(s), {} kept",
            "✓".green(),
            report.pruned.len(),
            label,
            report.kept
        );
    }
    Ok(())
}
