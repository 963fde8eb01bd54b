use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;

use super::{AppContext, parse_object};
use crate::cli::output::get_formatter;
use crate::models::OutputFormat;
use crate::services::Ingestor;

#[derive(Debug, Subcommand)]
pub enum DocumentCommand {
    #[command(about = "Chunk and upload a file, a directory or inline text")]
    Add {
        #[arg(long, short = 'c', help = "Connection id or name")]
        connection: String,
        #[arg(help = "Target collection")]
        collection: String,
        #[arg(long, short = 'p', required_unless_present = "text", help = "File or directory to upload")]
        path: Option<PathBuf>,
        #[arg(long, conflicts_with = "path", help = "Upload this text instead of files")]
        text: Option<String>,
        #[arg(long, help = "Metadata for inline text, as a JSON object")]
        metadata: Option<String>,
        #[arg(long, short = 'e', help = "Extra glob patterns to exclude")]
        exclude: Vec<String>,
        #[arg(long, help = "Store documents without embeddings")]
        no_embed: bool,
    },
    #[command(about = "Fetch documents by id")]
    Get {
        #[arg(long, short = 'c', help = "Connection id or name")]
        connection: String,
        collection: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    #[command(about = "Delete documents by id")]
    Delete {
        #[arg(long, short = 'c', help = "Connection id or name")]
        connection: String,
        collection: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    #[command(about = "Count documents, optionally matching metadata")]
    Count {
        #[arg(long, short = 'c', help = "Connection id or name")]
        connection: String,
        collection: String,
        #[arg(long, help = "Metadata filter as a JSON object")]
        filter: Option<String>,
    },
}

pub async fn handle_document(
    cmd: DocumentCommand,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let ctx = AppContext::load()?;
    let formatter = get_formatter(format);

    match cmd {
        DocumentCommand::Add {
            connection,
            collection,
            path,
            text,
            metadata,
            exclude,
            no_embed,
        } => {
            let (router, _) = ctx.router(&connection).await?;
            let embedder = if no_embed { None } else { ctx.embedder() };

            let mut ingestor = Ingestor::new(&router, &ctx.config.chunking)?
                .with_excludes(exclude)
                .with_progress(format == OutputFormat::Text && !verbose);
            if let Some(embedder) = &embedder {
                ingestor =
                    ingestor.with_embedder(embedder, ctx.config.embedding.batch_size as usize);
            }

            let stats = match (path, text) {
                (Some(path), _) => ingestor
                    .ingest_path(&collection, &path)
                    .await
                    .with_context(|| format!("failed to upload {}", path.display()))?,
                (None, Some(text)) => {
                    let metadata = parse_object(metadata.as_deref())?;
                    ingestor.ingest_text(&collection, &text, metadata).await?
                }
                (None, None) => anyhow::bail!("either --path or --text is required"),
            };
            print!("{}", formatter.format_ingest_stats(&stats));
        }
        DocumentCommand::Get {
            connection,
            collection,
            ids,
        } => {
            let (router, _) = ctx.router(&connection).await?;
            print!(
                "{}",
                formatter.format_documents(&router.get_documents(&collection, &ids).await?)
            );
        }
        DocumentCommand::Delete {
            connection,
            collection,
            ids,
        } => {
            let (router, _) = ctx.router(&connection).await?;
            let deleted = router.delete_documents(&collection, &ids).await?;
            print!(
                "{}",
                formatter.format_message(&format!("Deleted {deleted} documents from '{collection}'"))
            );
        }
        DocumentCommand::Count {
            connection,
            collection,
            filter,
        } => {
            let (router, _) = ctx.router(&connection).await?;
            let filter = filter
                .as_deref()
                .map(|f| parse_object(Some(f)))
                .transpose()?;
            let count = router.count_documents(&collection, filter.as_ref()).await?;
            print!("{}", formatter.format_message(&count.to_string()));
        }
    }
    Ok(())
}
