use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod signal;

#[derive(Parser)]
#[command(name = "pulse", about = "Realtime analytics ingestion and live dashboard feed")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Ingest analytics events from the bus into the event store
    Consume(commands::consume::ConsumeArgs),
    /// Publish generated analytics events to the bus
    Produce(commands::produce::ProduceArgs),
    /// Run the dashboard server
    Serve(commands::serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag when set
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Consume(args) => commands::consume::run(args).await,
        Commands::Produce(args) => commands::produce::run(args).await,
        Commands::Serve(args) => commands::serve::run(args).await,
    }
}
