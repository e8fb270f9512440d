mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, scope::ScopeSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "speckit",
    about = "Deterministic scope detection and scope gate payloads for Spec-Kit projects",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .specify/ or .git/)
    #[arg(long, global = true, env = "SPECKIT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect scope, build and check scope gate payloads
    Scope {
        #[command(subcommand)]
        subcommand: ScopeSubcommand,
    },

    /// Inspect and validate the layered project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Scope { subcommand } => cmd::scope::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
