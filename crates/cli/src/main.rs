//! worldsnap CLI - wsnap command

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use worldsnap::cmd;
use worldsnap::config;
use worldsnap::context::BackupContext;
use worldsnap::gate::ShutdownOutcome;
use worldsnap::host::DirectoryHost;

/// worldsnap - Versioned world-save backups on top of git
#[derive(Parser)]
#[command(name = "wsnap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/worldsnap/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// World directory (default: current directory)
    #[arg(short, long, global = true)]
    world: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare the world directory for snapshots
    Init {
        /// Configure the backup remote with this URL
        #[arg(long)]
        remote: Option<String>,
    },
    /// Take a snapshot of the world
    Commit,
    /// Push a snapshot to the remote
    Push {
        /// Snapshot to push (default: newest)
        snapshot: Option<String>,
    },
    /// Snapshot, push, then prune both sides
    Backup,
    /// Apply the retention policy
    Prune {
        /// Prune the remote instead of the local repository
        #[arg(long)]
        remote: bool,
    },
    /// List snapshots of the world
    List {
        /// List snapshots on the remote
        #[arg(long)]
        remote: bool,
    },
    /// Restore a snapshot into a new directory
    Restore {
        /// Snapshot name, short name, unique prefix or "latest"
        snapshot: String,
        /// Restore from the local repository instead of the remote
        #[arg(long)]
        local: bool,
        /// Parent directory for the restored world
        #[arg(long)]
        into: Option<PathBuf>,
    },
    /// Run scheduled backups until Ctrl-C
    Autoback,
    /// Retention policy helpers
    #[command(subcommand)]
    Policy(PolicyCommands),
    /// Show the effective configuration
    Config {
        /// Print an example configuration instead
        #[arg(long)]
        example: bool,
    },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// List policy kinds and their parameters
    List,
    /// Describe a persisted policy string
    Describe {
        /// e.g. "fixed count=5"
        policy: String,
    },
    /// Build a persisted policy string
    Encode {
        kind: String,
        /// Parameters as key=value
        params: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that need no world
    match &cli.command {
        Commands::Policy(policy) => {
            return match policy {
                PolicyCommands::List => cmd::policy::list(),
                PolicyCommands::Describe { policy } => cmd::policy::describe(policy),
                PolicyCommands::Encode { kind, params } => cmd::policy::encode(kind, params),
            };
        }
        Commands::Config { example } => return cmd::config::run(cli.config.as_deref(), *example),
        _ => {}
    }

    let config = config::load(cli.config.as_deref())?;
    let world_dir = match cli.world {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let host = Arc::new(DirectoryHost::new(world_dir));
    let ctx = BackupContext::init(config, host).context("Failed to open world")?;

    let result = match cli.command {
        Commands::Init { remote } => cmd::init::run(&ctx, remote).await,
        Commands::Commit => cmd::commit::run(&ctx).await,
        Commands::Push { snapshot } => cmd::push::run(&ctx, snapshot).await,
        Commands::Backup => cmd::backup::run(&ctx).await,
        Commands::Prune { remote } => cmd::prune::run(&ctx, remote).await,
        Commands::List { remote } => cmd::list::run(&ctx, remote).await,
        Commands::Restore {
            snapshot,
            local,
            into,
        } => cmd::restore::run(&ctx, &snapshot, local, into).await,
        Commands::Autoback => cmd::autoback::run(&ctx).await,
        Commands::Policy(_) | Commands::Config { .. } => Ok(()),
    };

    if ctx.shutdown() == ShutdownOutcome::TimedOut {
        eprintln!(
            "{} Timed out waiting for the running operation; it was cancelled",
            "!".yellow()
        );
    }
    result
}
