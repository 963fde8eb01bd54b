use anyhow::Result;
use clap::Args;
use std::time::Instant;

use super::{AppContext, parse_object};
use crate::cli::output::get_formatter;
use crate::models::{OutputFormat, SearchQuery, SearchResults};
use crate::services::{ClientRouter, Repository};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(help = "Search query")]
    pub query: String,

    #[arg(long, short = 'c', help = "Connection id or name")]
    pub connection: String,

    #[arg(long, short = 'C', help = "Collection to search")]
    pub collection: String,

    #[arg(long, short = 'n', help = "Maximum number of results")]
    pub limit: Option<u32>,

    #[arg(long, short = 's', help = "Minimum similarity score")]
    pub min_score: Option<f32>,

    #[arg(long, help = "Metadata filter as a JSON object")]
    pub filter: Option<String>,

    #[arg(long, help = "Match on text only, without embedding the query")]
    pub no_embed: bool,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat) -> Result<()> {
    let ctx = AppContext::load()?;
    let formatter = get_formatter(format);
    let start = Instant::now();

    let config = ctx
        .connections()
        .find(&args.connection)
        .await
        .map_err(|e| anyhow::anyhow!("unknown connection '{}': {e}", args.connection))?;

    let mut router = ClientRouter::new();
    if !args.no_embed
        && let Some(embedder) = ctx.embedder()
    {
        router = router.with_embedder(embedder);
    }
    router.connect(&config).await?;

    let mut query = SearchQuery::text(args.query.clone())
        .with_top_k(args.limit.unwrap_or(ctx.config.search.default_top_k))
        .with_min_score(args.min_score.unwrap_or(ctx.config.search.default_min_score));
    let filter = parse_object(args.filter.as_deref())?;
    if !filter.is_empty() {
        query = query.with_filter(filter);
    }

    let hits = router.search_text(&args.collection, query).await?;
    let results = SearchResults::new(
        args.query,
        args.collection,
        hits,
        start.elapsed().as_millis() as u64,
    );
    print!("{}", formatter.format_search_results(&results));
    Ok(())
}
