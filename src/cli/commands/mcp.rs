use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;

use super::AppContext;
use crate::cli::output::get_formatter;
use crate::models::{
    ConnectionStatus, McpAdapterConfig, McpCapabilities, McpConnection, OutputFormat,
};
use crate::services::Repository;
use crate::services::vector_store::{ConnectionTestResult, McpAdapter, VectorDbAdapter};

const MCP_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Subcommand)]
pub enum McpCommand {
    #[command(about = "Register an MCP server")]
    Add {
        name: String,
        #[arg(help = "JSON-RPC endpoint URL")]
        url: String,
        #[arg(long, help = "Bearer token, kept in the key store")]
        api_key: Option<String>,
    },
    #[command(about = "List registered MCP servers")]
    List,
    #[command(about = "Remove an MCP server")]
    Remove {
        #[arg(help = "Server id or name")]
        server: String,
    },
    #[command(about = "Run the initialize handshake and record capabilities")]
    Test {
        #[arg(help = "Server id or name")]
        server: String,
    },
    #[command(about = "List the tools a server exposes")]
    Tools {
        #[arg(help = "Server id or name")]
        server: String,
    },
}

pub async fn handle_mcp(cmd: McpCommand, format: OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    let formatter = get_formatter(format);
    let repo = ctx.mcp_servers();

    match cmd {
        McpCommand::Add { name, url, api_key } => {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("MCP server URL must be http(s): {url}");
            }
            let server = McpConnection::new(name, url);
            if let Some(key) = api_key {
                ctx.keystore.set(&server.api_key_name(), &key)?;
            }
            repo.upsert(server.clone()).await?;
            print!("{}", formatter.format_mcp_servers(&[server]));
        }
        McpCommand::List => {
            print!("{}", formatter.format_mcp_servers(&repo.list().await?));
        }
        McpCommand::Remove { server } => {
            let found = repo.find(&server).await?;
            repo.remove(&found.id).await?;
            if let Err(e) = ctx.keystore.remove(&found.api_key_name()) {
                tracing::warn!(server = %found.id, "failed to remove MCP API key: {e}");
            }
            print!(
                "{}",
                formatter.format_message(&format!("Removed MCP server '{}'", found.name))
            );
        }
        McpCommand::Test { server } => {
            let mut found = repo.find(&server).await?;
            let outcome = handshake(&ctx, &found).await;

            let result = match &outcome {
                Ok(adapter) => {
                    found.status = ConnectionStatus::Connected;
                    found.capabilities = adapter.capabilities();
                    found.protocol_version = adapter.protocol_version().map(str::to_string);
                    found.last_connected = Some(Utc::now());
                    ConnectionTestResult::ok(format!(
                        "handshake complete, protocol {}",
                        adapter.protocol_version().unwrap_or("unknown")
                    ))
                }
                Err(e) => {
                    found.status = ConnectionStatus::Error;
                    ConnectionTestResult::failed(format!("{e:#}"))
                }
            };
            repo.upsert(found.clone()).await?;
            print!("{}", formatter.format_test_result(&found.name, &result));
        }
        McpCommand::Tools { server } => {
            let found = repo.find(&server).await?;
            let adapter = handshake(&ctx, &found).await?;
            let tools = adapter.list_tools().await?;
            print!("{}", formatter.format_tools(&tools));
        }
    }
    Ok(())
}

async fn handshake(ctx: &AppContext, server: &McpConnection) -> Result<McpAdapter> {
    let api_key = ctx.keystore.get(&server.api_key_name())?;
    let mut adapter = McpAdapter::new(McpAdapterConfig {
        server_url: server.server_url.clone(),
        api_key,
        capabilities: McpCapabilities::default(),
        timeout_ms: MCP_TIMEOUT_MS,
    })?;
    adapter
        .connect()
        .await
        .with_context(|| format!("MCP handshake with {} failed", server.server_url))?;
    Ok(adapter)
}
