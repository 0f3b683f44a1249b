use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod generators;
mod util;

#[derive(Parser)]
#[command(
    name = "loom",
    version,
    about = "Loom: human-in-the-loop branching text generation with an auditable decision log"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session: generate candidates, choose, repeat
    Run(commands::run::RunArgs),
    /// Summarize a saved snapshot (path, recent decisions, divergences, clarifications)
    Inspect(commands::inspect::InspectArgs),
    /// Print the records of a decision audit log
    Manifest(commands::manifest::ManifestArgs),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout carries the interactive session and JSON output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loom_cli=info,loom_core=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Manifest(args) => commands::manifest::run(args),
    };

    std::process::exit(code);
}
