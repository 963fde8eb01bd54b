//! Command-line interface for `vhub`.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Manage vector database connections, upload documents and deliver webhooks.
#[derive(Debug, Parser)]
#[command(name = "vhub")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show configuration, registries and embedding key status
    Status,

    /// Manage saved vector database connections
    #[command(subcommand)]
    Connection(commands::ConnectionCommand),

    /// Manage collections on a connection
    #[command(subcommand)]
    Collection(commands::CollectionCommand),

    /// Upload, fetch, count and delete documents
    #[command(subcommand)]
    Document(commands::DocumentCommand),

    /// Search a collection
    Search(commands::SearchArgs),

    /// Preview how text is split into chunks
    Chunk(commands::ChunkArgs),

    /// Manage webhooks and deliver events
    #[command(subcommand)]
    Webhook(commands::WebhookCommand),

    /// Manage MCP servers
    #[command(subcommand)]
    Mcp(commands::McpCommand),

    /// Manage stored API keys and secrets
    #[command(subcommand)]
    Keys(commands::KeysCommand),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from([
            "vhub", "--format", "json", "search", "rust traits", "-c", "local", "-C", "demo",
            "-n", "3",
        ]);
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.query, "rust traits");
                assert_eq!(args.collection, "demo");
                assert_eq!(args.limit, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_webhook_events() {
        let cli = Cli::parse_from([
            "vhub", "webhook", "add", "hook", "https://example.com/hook", "-e",
            "document.created,document.deleted",
        ]);
        match cli.command {
            Commands::Webhook(commands::WebhookCommand::Add { events, secret, .. }) => {
                assert_eq!(events, vec!["document.created", "document.deleted"]);
                assert!(secret.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
