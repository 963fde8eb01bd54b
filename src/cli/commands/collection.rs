use anyhow::Result;
use clap::Subcommand;

use super::{AppContext, parse_object};
use crate::cli::output::get_formatter;
use crate::models::{CollectionConfig, CollectionUpdate, DistanceMetric, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum CollectionCommand {
    #[command(about = "List collections")]
    List {
        #[arg(long, short = 'c', help = "Connection id or name")]
        connection: String,
    },
    #[command(about = "Show one collection")]
    Show {
        #[arg(long, short = 'c', help = "Connection id or name")]
        connection: String,
        name: String,
    },
    #[command(about = "Create a collection")]
    Create {
        #[arg(long, short = 'c', help = "Connection id or name")]
        connection: String,
        name: String,
        #[arg(long, short = 'd', help = "Vector dimensions (defaults to the embedding model's)")]
        dimensions: Option<u32>,
        #[arg(long, short = 'm', default_value = "cosine", help = "cosine, euclidean or dot_product")]
        metric: DistanceMetric,
        #[arg(long)]
        description: Option<String>,
    },
    #[command(about = "Update description or metadata")]
    Update {
        #[arg(long, short = 'c', help = "Connection id or name")]
        connection: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, help = "Metadata to merge, as a JSON object")]
        metadata: Option<String>,
    },
    #[command(about = "Delete a collection")]
    Delete {
        #[arg(long, short = 'c', help = "Connection id or name")]
        connection: String,
        name: String,
        #[arg(long, help = "Also delete the documents it holds")]
        cascade: bool,
    },
    #[command(about = "Show collection statistics")]
    Stats {
        #[arg(long, short = 'c', help = "Connection id or name")]
        connection: String,
        name: String,
    },
}

pub async fn handle_collection(cmd: CollectionCommand, format: OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    let formatter = get_formatter(format);

    match cmd {
        CollectionCommand::List { connection } => {
            let (router, _) = ctx.router(&connection).await?;
            print!("{}", formatter.format_collections(&router.list_collections().await?));
        }
        CollectionCommand::Show { connection, name } => {
            let (router, _) = ctx.router(&connection).await?;
            print!("{}", formatter.format_collection(&router.get_collection(&name).await?));
        }
        CollectionCommand::Create {
            connection,
            name,
            dimensions,
            metric,
            description,
        } => {
            let (router, _) = ctx.router(&connection).await?;
            let config = CollectionConfig {
                distance_metric: metric,
                description,
                ..CollectionConfig::new(
                    name,
                    dimensions.unwrap_or(ctx.config.embedding.dimensions),
                )
            };
            print!("{}", formatter.format_collection(&router.create_collection(&config).await?));
        }
        CollectionCommand::Update {
            connection,
            name,
            description,
            metadata,
        } => {
            let (router, _) = ctx.router(&connection).await?;
            let updates = CollectionUpdate {
                description,
                metadata: metadata
                    .as_deref()
                    .map(|m| parse_object(Some(m)))
                    .transpose()?,
            };
            print!(
                "{}",
                formatter.format_collection(&router.update_collection(&name, &updates).await?)
            );
        }
        CollectionCommand::Delete {
            connection,
            name,
            cascade,
        } => {
            let (router, _) = ctx.router(&connection).await?;
            router.delete_collection(&name, cascade).await?;
            print!(
                "{}",
                formatter.format_message(&format!("Deleted collection '{name}'"))
            );
        }
        CollectionCommand::Stats { connection, name } => {
            let (router, _) = ctx.router(&connection).await?;
            print!("{}", formatter.format_stats(&router.get_collection_stats(&name).await?));
        }
    }
    Ok(())
}
