mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, entity::EntitySubcommand, queue::QueueSubcommand};
use realmtick_runtime::RunMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "realmtick",
    about = "Distributed tick scheduler and decision engine for simulated characters",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .realmtick/ or .git/)
    #[arg(long, global = true, env = "REALMTICK_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and/or worker pool until interrupted
    Run {
        /// all, scheduler, worker or inline
        #[arg(long, default_value = "all")]
        mode: RunMode,
    },

    /// Show what an entity would do next, without doing it
    Decide {
        /// Entity id
        entity: String,
    },

    /// Put a tick job for one entity on the queue
    Enqueue {
        /// Realm id
        realm: String,
        /// Entity id
        entity: String,
        /// Delay before the tick becomes due
        #[arg(long, default_value = "0")]
        delay_ms: u64,
    },

    /// Inspect and repair the job queue
    Queue {
        #[command(subcommand)]
        subcommand: QueueSubcommand,
    },

    /// Manage simulated entities
    Entity {
        #[command(subcommand)]
        subcommand: EntitySubcommand,
    },

    /// Create, show and validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Run { mode } => cmd::run::run(&root, mode),
        Commands::Decide { entity } => cmd::decide::run(&root, &entity, cli.json),
        Commands::Enqueue {
            realm,
            entity,
            delay_ms,
        } => cmd::enqueue::run(&root, &realm, &entity, delay_ms, cli.json),
        Commands::Queue { subcommand } => cmd::queue::run(&root, subcommand, cli.json),
        Commands::Entity { subcommand } => cmd::entity::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
