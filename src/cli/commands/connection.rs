use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::Value;
use std::path::PathBuf;

use super::AppContext;
use crate::cli::output::get_formatter;
use crate::models::{BackendConfig, ConnectionConfig, ConnectionStatus, OutputFormat, VectorDbType};
use crate::services::{ClientRouter, Repository};

#[derive(Debug, Subcommand)]
pub enum ConnectionCommand {
    #[command(about = "Save a new connection")]
    Add {
        #[arg(help = "Connection name")]
        name: String,
        #[arg(long = "type", short = 't', help = "Database type (mock, mongodb, supabase, webhook, mcp, ...)")]
        db_type: VectorDbType,
        #[arg(long, short = 'c', help = "Backend settings as a JSON object")]
        config: Option<String>,
        #[arg(long, conflicts_with = "config", help = "Read backend settings from a JSON file")]
        config_file: Option<PathBuf>,
    },
    #[command(about = "List saved connections")]
    List,
    #[command(about = "Remove a saved connection")]
    Remove {
        #[arg(help = "Connection id or name")]
        connection: String,
    },
    #[command(about = "Check that a connection is reachable")]
    Test {
        #[arg(help = "Connection id or name")]
        connection: String,
    },
    #[command(about = "Connect and record the resulting status")]
    Sync {
        #[arg(help = "Connection id or name")]
        connection: String,
    },
}

pub async fn handle_connection(cmd: ConnectionCommand, format: OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    let formatter = get_formatter(format);
    let repo = ctx.connections();

    match cmd {
        ConnectionCommand::Add {
            name,
            db_type,
            config,
            config_file,
        } => {
            let raw = match (config, config_file) {
                (Some(json), _) => serde_json::from_str(&json).context("invalid --config JSON")?,
                (None, Some(path)) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    serde_json::from_str(&content).context("invalid config file JSON")?
                }
                (None, None) => Value::Null,
            };
            if !db_type.has_adapter() {
                tracing::warn!(db_type = %db_type, "no adapter for this type; the mock adapter will serve it");
            }
            let backend = BackendConfig::from_json(db_type, raw)
                .context("settings do not match the database type")?;
            let connection = ConnectionConfig::new(name, backend);
            repo.upsert(connection.clone()).await?;
            print!("{}", formatter.format_connections(std::slice::from_ref(&connection)));
        }
        ConnectionCommand::List => {
            print!("{}", formatter.format_connections(&repo.list().await?));
        }
        ConnectionCommand::Remove { connection } => {
            let found = repo.find(&connection).await?;
            repo.remove(&found.id).await?;
            print!(
                "{}",
                formatter.format_message(&format!("Removed connection '{}'", found.name))
            );
        }
        ConnectionCommand::Test { connection } => {
            let found = repo.find(&connection).await?;
            let result = ClientRouter::test_connection(&found).await;
            print!("{}", formatter.format_test_result(&found.name, &result));
        }
        ConnectionCommand::Sync { connection } => {
            let mut found = repo.find(&connection).await?;
            let mut router = ClientRouter::new();
            let outcome = router.connect(&found).await;
            found.mark_synced(if outcome.is_ok() {
                ConnectionStatus::Connected
            } else {
                ConnectionStatus::Error
            });
            repo.upsert(found.clone()).await?;
            router.disconnect().await?;
            outcome.with_context(|| format!("failed to sync '{}'", found.name))?;
            print!("{}", formatter.format_connections(std::slice::from_ref(&found)));
        }
    }
    Ok(())
}
