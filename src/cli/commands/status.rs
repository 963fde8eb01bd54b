use anyhow::Result;

use super::AppContext;
use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::{Repository, resolve_api_key};

pub async fn handle_status(format: OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    let formatter = get_formatter(format);

    let status = StatusInfo {
        config_path: Config::config_path()
            .filter(|p| p.exists())
            .map(|p| p.display().to_string()),
        data_dir: ctx.data_dir.display().to_string(),
        connections: ctx.connections().list().await?.len(),
        webhooks: ctx.webhooks().list().await?.len(),
        mcp_servers: ctx.mcp_servers().list().await?.len(),
        embedding_model: ctx.config.embedding.model.clone(),
        embedding_key_configured: resolve_api_key(&ctx.config.embedding, Some(&ctx.keystore))
            .is_ok(),
    };

    print!("{}", formatter.format_status(&status));
    Ok(())
}
