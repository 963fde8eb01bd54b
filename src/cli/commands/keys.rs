use anyhow::Result;
use clap::Subcommand;

use super::AppContext;
use crate::cli::output::get_formatter;
use crate::models::OutputFormat;
use crate::utils::mask_secret;

#[derive(Debug, Subcommand)]
pub enum KeysCommand {
    #[command(about = "Store a key")]
    Set { key: String, value: String },
    #[command(about = "Print a stored key")]
    Get {
        key: String,
        #[arg(long, help = "Print the full value instead of a masked one")]
        reveal: bool,
    },
    #[command(about = "List stored keys with masked values")]
    List,
    #[command(about = "Remove a stored key")]
    Remove { key: String },
}

pub async fn handle_keys(cmd: KeysCommand, format: OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    let formatter = get_formatter(format);
    let store = &ctx.keystore;

    match cmd {
        KeysCommand::Set { key, value } => {
            store.set(&key, &value)?;
            print!("{}", formatter.format_message(&format!("Stored {key}")));
        }
        KeysCommand::Get { key, reveal } => {
            let value = store
                .get(&key)?
                .ok_or_else(|| anyhow::anyhow!("no key named {key}"))?;
            let shown = if reveal { value } else { mask_secret(&value) };
            print!("{}", formatter.format_keys(&[(key, shown)]));
        }
        KeysCommand::List => {
            print!("{}", formatter.format_keys(&store.list_masked()?));
        }
        KeysCommand::Remove { key } => {
            let message = if store.remove(&key)? {
                format!("Removed {key}")
            } else {
                format!("No key named {key}")
            };
            print!("{}", formatter.format_message(&message));
        }
    }
    Ok(())
}
