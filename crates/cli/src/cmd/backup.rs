//! Full backup: snapshot, push, prune both sides

use crate::context::{self, BackupContext};
use crate::gate::ExecutionLock;
use crate::ops::BackupReport;
use anyhow::Result;
use owo_colors::OwoColorize;

pub async fn run(ctx: &BackupContext) -> Result<()> {
    println!("{}", "Running backup...".bold());
    println!();

    let handle = ctx.submit(ExecutionLock::Write, "backup", |ops, cancel| ops.backup(cancel))?;
    match context::wait(handle).await? {
        Some(report) => print_report(&report, &ctx.config().remote.name),
        None => println!("{}", "Backups are disabled (backup.enabled = false)".yellow()),
    }
    Ok(())
}

fn print_report(report: &BackupReport, remote: &str) {
    println!("{} Snapshot {}", "✓".green(), report.snapshot.short_name().yellow());
    super::push::print_outcome(&report.push, remote);
    if !report.local.pruned.is_empty() {
        println!(
            "{} Pruned {} local snapshot(s), {} kept",
            "✓".green(),
            report.local.pruned.len(),
            report.local.kept
        );
    }
    if !report.remote.pruned.is_empty() {
        println!(
            "{} Pruned {} snapshot(s) on {}",
            "✓".green(),
            report.remote.pruned.len(),
            remote.cyan()
        );
    }
}
