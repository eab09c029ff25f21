//! Prepare a world directory for snapshots

use crate::context::BackupContext;
use anyhow::{Context, Result};
use gitstore::SnapshotStore;
use owo_colors::OwoColorize;

pub async fn run(ctx: &BackupContext, remote_url: Option<String>) -> Result<()> {
    // Repository, world id and ignore files were set up by the context
    println!("{}", "Initializing worldsnap...".bold());
    println!();
    println!("  {} World:      {}", "✓".green(), ctx.host().world_name().cyan());
    println!("  {} World id:   {}", "✓".green(), ctx.world().to_string().yellow());
    println!("  {} Repository: {}", "✓".green(), ctx.repo().git_dir().display());

    let remote = ctx.config().remote.name.as_str();
    if let Some(url) = remote_url {
        ctx.repo()
            .set_remote(remote, &url)
            .with_context(|| format!("Failed to configure remote '{}'", remote))?;
        println!("  {} Remote:     {} → {}", "✓".green(), remote, url.cyan());
    } else if let Some(url) = ctx.repo().remote_url(remote)? {
        println!("  {} Remote:     {} → {}", "✓".green(), remote, url.cyan());
    } else {
        println!(
            "  {} No remote '{}' configured; snapshots stay local",
            "!".yellow(),
            remote
        );
    }

    println!();
    println!("Take a snapshot with: {}", "wsnap commit".cyan());
    Ok(())
}
