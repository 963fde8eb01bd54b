use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a config file with default values")]
    Init {
        #[arg(long, help = "Overwrite an existing config")]
        force: bool,
    },
    #[command(about = "Show the effective configuration")]
    Show,
    #[command(about = "Show config and data paths")]
    Path,
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { force } => {
            let path = Config::config_path()
                .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Config already exists at: {}\nUse --force to overwrite.",
                    path.display()
                );
            }
            let path = Config::default()
                .save()
                .context("failed to write config")?;
            print!(
                "{}",
                formatter.format_message(&format!("Created config at: {}", path.display()))
            );
        }
        ConfigCommand::Show => {
            let config = Config::load().context("failed to load config")?;
            let rendered = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&config)?,
                OutputFormat::Markdown => {
                    format!("```toml\n{}```", toml::to_string_pretty(&config)?)
                }
                OutputFormat::Text => toml::to_string_pretty(&config)?,
            };
            println!("{rendered}");
        }
        ConfigCommand::Path => {
            let config = Config::load().unwrap_or_default();
            let config_path = Config::config_path()
                .map_or_else(|| "(unavailable)".to_string(), |p| p.display().to_string());
            let data_dir = config
                .data_dir()
                .map_or_else(|e| format!("({e})"), |p| p.display().to_string());
            print!(
                "{}",
                formatter.format_message(&format!("config: {config_path}\ndata:   {data_dir}"))
            );
        }
    }
    Ok(())
}
