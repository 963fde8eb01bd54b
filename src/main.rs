use anyhow::Result;
use clap::Parser;
use tokio::signal;

use vectorhub::cli::commands::{
    handle_chunk, handle_collection, handle_config, handle_connection, handle_document,
    handle_keys, handle_mcp, handle_search, handle_status, handle_webhook,
};
use vectorhub::cli::{Cli, Commands};
use vectorhub::logging;
use vectorhub::models::{Config, OutputFormat};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load().unwrap_or_default();
    logging::init(&config.logging, cli.verbose);
    let format = cli.format.unwrap_or_default();

    tokio::select! {
        result = run_command(cli.command, format, cli.verbose) => {
            result?;
        }
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal, exiting...");
        }
    }

    Ok(())
}

async fn run_command(command: Commands, format: OutputFormat, verbose: bool) -> Result<()> {
    match command {
        Commands::Status => handle_status(format).await,
        Commands::Connection(cmd) => handle_connection(cmd, format).await,
        Commands::Collection(cmd) => handle_collection(cmd, format).await,
        Commands::Document(cmd) => handle_document(cmd, format, verbose).await,
        Commands::Search(args) => handle_search(args, format).await,
        Commands::Chunk(args) => handle_chunk(args, format).await,
        Commands::Webhook(cmd) => handle_webhook(cmd, format).await,
        Commands::Mcp(cmd) => handle_mcp(cmd, format).await,
        Commands::Keys(cmd) => handle_keys(cmd, format).await,
        Commands::Config(cmd) => handle_config(cmd, format).await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
