//! Push a snapshot to the configured remote

use crate::context::{self, BackupContext};
use crate::gate::ExecutionLock;
use crate::util;
use anyhow::Result;
use gitstore::{PushOutcome, PushStrategy};
use owo_colors::OwoColorize;

pub async fn run(ctx: &BackupContext, reference: Option<String>) -> Result<()> {
    let remote = ctx.config().remote.name.clone();
    println!("{}", format!("Pushing to '{}'...", remote).dimmed());

    let handle = ctx.submit(ExecutionLock::Write, "push", move |ops, cancel| {
        let snapshot = match reference {
            Some(r) => Some(util::resolve_snapshot(&r, &ops.list_local()?)?),
            None => None,
        };
        ops.push(snapshot.as_ref(), cancel)
    })?;

    print_outcome(&context::wait(handle).await?, &remote);
    Ok(())
}

pub fn print_outcome(outcome: &PushOutcome, remote: &str) {
    match outcome {
        PushOutcome::NoRemote => {
            println!("{} No remote '{}' configured, nothing pushed", "!".yellow(), remote);
        }
        PushOutcome::Pushed {
            strategy,
            cleanup_failures,
        } => {
            match strategy {
                PushStrategy::Naive => println!("{} Pushed to {}", "✓".green(), remote.cyan()),
                PushStrategy::Smart { base } => println!(
                    "{} Pushed to {} (delta against {})",
                    "✓".green(),
                    remote.cyan(),
                    base.short_name().yellow()
                ),
            }
            for failure in cleanup_failures {
                println!("  {} Cleanup failed: {}", "!".yellow(), failure);
            }
        }
    }
}
