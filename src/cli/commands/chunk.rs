use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::split_text;

#[derive(Debug, Args)]
pub struct ChunkArgs {
    #[arg(required_unless_present = "file", help = "Text to split")]
    pub text: Option<String>,

    #[arg(long, short = 'F', conflicts_with = "text", help = "Read the text from a file")]
    pub file: Option<PathBuf>,

    #[arg(long, short = 's', help = "Maximum characters per chunk")]
    pub size: Option<usize>,

    #[arg(long, short = 'o', help = "Characters shared by consecutive chunks")]
    pub overlap: Option<usize>,
}

/// Preview how text would be chunked, without touching any connection.
pub async fn handle_chunk(args: ChunkArgs, format: OutputFormat) -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let formatter = get_formatter(format);

    let text = match (args.text, args.file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("provide text or --file"),
    };

    let chunks = split_text(
        &text,
        args.size.unwrap_or(config.chunking.chunk_size),
        args.overlap.unwrap_or(config.chunking.chunk_overlap),
    )?;
    print!("{}", formatter.format_chunks(&chunks));
    Ok(())
}
