// ABOUTME: CLI entry point for pg-subset
// ABOUTME: Parses commands and routes to the extract and inspect handlers

use clap::{Parser, Subcommand};
use pg_subset::commands::{self, ExtractArgs, InspectArgs};

#[derive(Parser)]
#[command(name = "pg-subset")]
#[command(about = "Extract a referentially-consistent subset of a PostgreSQL database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract rows reachable from the given seeds and emit SQL/JSON/CSV
    Extract(ExtractArgs),
    /// Print the table and foreign-key graph without extracting
    Inspect(InspectArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract(args) => commands::extract(args).await,
        Commands::Inspect(args) => commands::inspect(args).await,
    }
}
