use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

mod commands;
mod logging;
mod output;
mod utils;

use commands::identity::IdentityArgs;
use commands::permissions::PermissionArgs;
use commands::site::SiteArgs;
use commands::state::StateAction;
use commands::{identity, permissions, site, state};

/// calprov - provision the calendar automation identity and its permissions
#[derive(Parser)]
#[command(name = "calprov")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write daily-rotated log files to this directory
    #[arg(long, global = true, env = "CALPROV_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage 1: create the application identity and its certificate
    Identity(IdentityArgs),

    /// Stage 2: grant the tenant-wide application permissions
    GrantPermissions(PermissionArgs),

    /// Stage 3: grant the application access to one SharePoint site
    GrantSite(SiteArgs),

    /// Inspect the provisioning state file
    State {
        #[command(subcommand)]
        action: StateAction,
    },
}

#[tokio::main]
async fn main() {
    // .env has to be loaded before clap reads env-backed arguments
    utils::env_paths::load_dotenv();

    // Parse CLI arguments
    let cli = Cli::parse();

    let guard = match logging::init_logging(cli.verbose, cli.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli.command).await {
        tracing::debug!(error = ?e, "Command failed");
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        // process::exit skips destructors, so flush the file log first
        drop(guard);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Identity(args) => identity::execute(args).await,
        Commands::GrantPermissions(args) => permissions::execute(args).await,
        Commands::GrantSite(args) => site::execute(args).await,
        Commands::State { action } => state::execute(action).await,
    }
}
