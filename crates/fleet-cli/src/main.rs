mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, inventory::InventorySubcommand, lifecycle::LifecycleArgs,
    probe::ProbeArgs, web::WebSubcommand,
};
use fleet_core::types::Direction;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fleet",
    about = "Fleet operations: reachability probes, tiered service start/stop, web-tier rotation",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .fleet/)
    #[arg(long, global = true, env = "FLEET_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Debug logging on stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check reachability of every target in a scope
    Probe(ProbeArgs),

    /// Start services, priority tier first
    Start(LifecycleArgs),

    /// Stop services, priority tier last
    Stop(LifecycleArgs),

    /// Enable, disable, or inspect web-tier rotation
    Web {
        #[command(subcommand)]
        subcommand: WebSubcommand,
    },

    /// Resolve and export target lists
    Inventory {
        #[command(subcommand)]
        subcommand: InventorySubcommand,
    },

    /// Create, show, and validate .fleet/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        match &cli.command {
            Commands::Start(_) | Commands::Stop(_) | Commands::Web { .. } => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Probe(args) => cmd::probe::run(&root, args, cli.json),
        Commands::Start(args) => cmd::lifecycle::run(&root, Direction::Start, args, cli.json),
        Commands::Stop(args) => cmd::lifecycle::run(&root, Direction::Stop, args, cli.json),
        Commands::Web { subcommand } => cmd::web::run(&root, subcommand, cli.json),
        Commands::Inventory { subcommand } => cmd::inventory::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    match result {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(e) => {
            // Print the full error chain (anyhow's alternate Display)
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
