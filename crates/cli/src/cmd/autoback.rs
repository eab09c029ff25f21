//! Scheduled backups until interrupted

use crate::config::ScheduleAction;
use crate::context::{self, BackupContext};
use crate::gate::{ExecutionLock, GateError};
use crate::locks::WriteLock;
use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub async fn run(ctx: &BackupContext) -> Result<()> {
    let schedule = ctx.config().schedule.clone();
    if schedule.autoback_wait_minutes == 0 {
        anyhow::bail!("schedule.autoback_wait_minutes must be at least 1");
    }
    let period = Duration::from_secs(schedule.autoback_wait_minutes * 60);

    println!(
        "{} every {} ({:?}), Ctrl-C to stop",
        "Scheduled backups".bold(),
        util::format_duration(period.as_secs()),
        schedule.autoback_action
    );

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(reason) = busy_reason(ctx) {
                    tracing::info!("{}, skipping scheduled run", reason);
                    continue;
                }
                if let Err(e) = run_action(ctx, schedule.autoback_action).await {
                    tracing::error!("Scheduled {:?} failed: {:#}", schedule.autoback_action, e);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                println!();
                println!("{}", "Stopping scheduled backups...".dimmed());
                break;
            }
        }
    }

    if let Err(e) = run_action(ctx, schedule.shutdown_action).await {
        tracing::error!("Shutdown {:?} failed: {:#}", schedule.shutdown_action, e);
    }
    println!("{} Stopped", "✓".green());
    Ok(())
}

/// Why a scheduled run would have to wait, if it would
pub fn busy_reason(ctx: &BackupContext) -> Option<&'static str> {
    if ctx.gate().is_write_busy() {
        Some("Another write is running")
    } else if WriteLock::is_held(&ctx.repo().git_dir()) {
        Some("Another wsnap process is writing")
    } else {
        None
    }
}

async fn run_action(ctx: &BackupContext, action: ScheduleAction) -> Result<()> {
    let handle = match action {
        ScheduleAction::None => return Ok(()),
        ScheduleAction::Commit => ctx.submit(ExecutionLock::Write, "commit", |ops, cancel| {
            Ok(ops.commit(cancel)?.map(|id| id.short_name()))
        }),
        ScheduleAction::Backup => ctx.submit(ExecutionLock::Write, "backup", |ops, cancel| {
            Ok(ops.backup(cancel)?.map(|report| report.snapshot.short_name()))
        }),
    };

    let handle = match handle {
        Ok(handle) => handle,
        Err(GateError::Busy) => {
            tracing::info!("Another write is running, skipping {:?}", action);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(name) = context::wait(handle).await? {
        println!("{} {:?} {}", "✓".green(), action, name.yellow());
    }
    Ok(())
}
