use console::style;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;

use crate::models::{
    CollectionInfo, CollectionStats, ConnectionConfig, DeliveryResult, McpConnection,
    OutputFormat, SearchResults, VectorDocument, WebhookConnection,
};
use crate::services::ingest::IngestStats;
use crate::services::vector_store::{ConnectionTestResult, McpTool};
use crate::utils::preview;

pub trait Formatter {
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_connections(&self, connections: &[ConnectionConfig]) -> String;
    fn format_test_result(&self, name: &str, result: &ConnectionTestResult) -> String;
    fn format_collections(&self, collections: &[CollectionInfo]) -> String;
    fn format_collection(&self, collection: &CollectionInfo) -> String;
    fn format_stats(&self, stats: &CollectionStats) -> String;
    fn format_documents(&self, documents: &[VectorDocument]) -> String;
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_chunks(&self, chunks: &[String]) -> String;
    fn format_ingest_stats(&self, stats: &IngestStats) -> String;
    fn format_webhooks(&self, webhooks: &[WebhookConnection]) -> String;
    fn format_deliveries(&self, deliveries: &BTreeMap<String, DeliveryResult>) -> String;
    fn format_mcp_servers(&self, servers: &[McpConnection]) -> String;
    fn format_tools(&self, tools: &[McpTool]) -> String;
    fn format_keys(&self, keys: &[(String, String)]) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub config_path: Option<String>,
    pub data_dir: String,
    pub connections: usize,
    pub webhooks: usize,
    pub mcp_servers: usize,
    pub embedding_model: String,
    pub embedding_key_configured: bool,
}

const PREVIEW_CHARS: usize = 200;

fn mark(ok: bool) -> String {
    if ok {
        style("✓").green().to_string()
    } else {
        style("✗").red().to_string()
    }
}

fn metadata_line(metadata: &serde_json::Map<String, serde_json::Value>) -> String {
    metadata
        .iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => format!("{k}={s}"),
            other => format!("{k}={other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_status(&self, status: &StatusInfo) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Status");
        let _ = writeln!(out, "------");
        let _ = writeln!(
            out,
            "Config:        {}",
            status.config_path.as_deref().unwrap_or("(defaults)")
        );
        let _ = writeln!(out, "Data dir:      {}", status.data_dir);
        let _ = writeln!(out, "Connections:   {}", status.connections);
        let _ = writeln!(out, "Webhooks:      {}", status.webhooks);
        let _ = writeln!(out, "MCP servers:   {}", status.mcp_servers);
        let _ = writeln!(
            out,
            "Embedding:     {} {}",
            status.embedding_model,
            mark(status.embedding_key_configured)
        );
        out
    }

    fn format_connections(&self, connections: &[ConnectionConfig]) -> String {
        if connections.is_empty() {
            return "No connections configured.\n".to_string();
        }
        let mut out = String::new();
        for c in connections {
            let _ = writeln!(
                out,
                "{} {} ({}) [{}]",
                style(&c.name).bold(),
                c.db_type(),
                c.id,
                c.status
            );
            if let Some(synced) = c.last_sync {
                let _ = writeln!(out, "  last sync: {}", synced.to_rfc3339());
            }
        }
        out
    }

    fn format_test_result(&self, name: &str, result: &ConnectionTestResult) -> String {
        format!("{} {}: {}\n", mark(result.success), name, result.message)
    }

    fn format_collections(&self, collections: &[CollectionInfo]) -> String {
        if collections.is_empty() {
            return "No collections found.\n".to_string();
        }
        let mut out = String::new();
        for c in collections {
            let _ = writeln!(
                out,
                "{}  {} documents, {} dims, {}",
                style(&c.name).bold(),
                c.document_count,
                c.dimensions,
                c.distance_metric
            );
        }
        out
    }

    fn format_collection(&self, c: &CollectionInfo) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Collection: {}", style(&c.name).bold());
        if let Some(description) = &c.description {
            let _ = writeln!(out, "  Description: {description}");
        }
        let _ = writeln!(out, "  Documents:   {}", c.document_count);
        let _ = writeln!(out, "  Dimensions:  {}", c.dimensions);
        let _ = writeln!(out, "  Metric:      {}", c.distance_metric);
        if !c.metadata.is_empty() {
            let _ = writeln!(out, "  Metadata:    {}", metadata_line(&c.metadata));
        }
        out
    }

    fn format_stats(&self, stats: &CollectionStats) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Stats: {}", stats.name);
        let _ = writeln!(out, "  Documents:  {}", stats.document_count);
        let _ = writeln!(out, "  Dimensions: {}", stats.dimensions);
        if let Some(size) = stats.index_size_bytes {
            let _ = writeln!(out, "  Index size: {size} bytes");
        }
        if let Some(updated) = stats.last_updated {
            let _ = writeln!(out, "  Updated:    {}", updated.to_rfc3339());
        }
        out
    }

    fn format_documents(&self, documents: &[VectorDocument]) -> String {
        if documents.is_empty() {
            return "No documents found.\n".to_string();
        }
        let mut out = String::new();
        for d in documents {
            let _ = writeln!(out, "{}", style(d.id.as_deref().unwrap_or("-")).bold());
            let _ = writeln!(out, "  {}", preview(&d.content, PREVIEW_CHARS));
            if !d.metadata.is_empty() {
                let _ = writeln!(out, "  {}", style(metadata_line(&d.metadata)).dim());
            }
        }
        out
    }

    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }
        let mut out = String::new();
        let _ = writeln!(out, "Search results for: \"{}\"", results.query);
        let _ = writeln!(
            out,
            "Found {} results in {} ({}ms)\n",
            results.len(),
            results.collection,
            results.duration_ms
        );
        for (i, r) in results.results.iter().enumerate() {
            let _ = writeln!(out, "{}. [Score: {:.3}] {}", i + 1, r.score, r.id);
            for line in preview(&r.content, PREVIEW_CHARS).lines() {
                let _ = writeln!(out, "   {line}");
            }
            let _ = writeln!(out);
        }
        out
    }

    fn format_chunks(&self, chunks: &[String]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} chunks", chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let _ = writeln!(out, "\n[{}] ({} chars)", i, chunk.chars().count());
            let _ = writeln!(out, "{chunk}");
        }
        out
    }

    fn format_ingest_stats(&self, stats: &IngestStats) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Upload Complete");
        let _ = writeln!(out, "---------------");
        if stats.files_scanned > 0 {
            let _ = writeln!(out, "Files scanned:   {}", stats.files_scanned);
            let _ = writeln!(out, "Files ingested:  {}", stats.files_ingested);
            let _ = writeln!(out, "Files skipped:   {}", stats.files_skipped);
        }
        let _ = writeln!(out, "Chunks created:  {}", stats.chunks_created);
        let _ = writeln!(out, "Documents added: {}", stats.documents_added);
        let _ = writeln!(out, "Embedded:        {}", mark(stats.embedded));
        let _ = writeln!(out, "Duration:        {}ms", stats.duration_ms);
        out
    }

    fn format_webhooks(&self, webhooks: &[WebhookConnection]) -> String {
        if webhooks.is_empty() {
            return "No webhooks registered.\n".to_string();
        }
        let mut out = String::new();
        for w in webhooks {
            let _ = writeln!(out, "{} {} [{}]", style(&w.name).bold(), w.url, w.status);
            let _ = writeln!(out, "  id:     {}", w.id);
            let _ = writeln!(out, "  events: {}", w.event_types.join(", "));
            let _ = writeln!(out, "  signed: {}", mark(w.secret_configured));
            if let Some(last) = w.last_delivery {
                let _ = writeln!(out, "  last delivery: {}", last.to_rfc3339());
            }
        }
        out
    }

    fn format_deliveries(&self, deliveries: &BTreeMap<String, DeliveryResult>) -> String {
        if deliveries.is_empty() {
            return "No webhooks subscribed to this event.\n".to_string();
        }
        let mut out = String::new();
        for (id, d) in deliveries {
            let status = d
                .status_code
                .map_or_else(|| "-".to_string(), |s| s.to_string());
            let _ = write!(
                out,
                "{} {} status={} attempts={} {}ms",
                mark(d.success),
                id,
                status,
                d.attempts,
                d.duration_ms
            );
            if let Some(error) = &d.error {
                let _ = write!(out, " error={error}");
            }
            let _ = writeln!(out);
        }
        out
    }

    fn format_mcp_servers(&self, servers: &[McpConnection]) -> String {
        if servers.is_empty() {
            return "No MCP servers registered.\n".to_string();
        }
        let mut out = String::new();
        for s in servers {
            let _ = writeln!(out, "{} {} [{}]", style(&s.name).bold(), s.server_url, s.status);
            let _ = writeln!(out, "  id: {}", s.id);
            if let Some(version) = &s.protocol_version {
                let _ = writeln!(out, "  protocol: {version}");
            }
            let caps = &s.capabilities;
            let _ = writeln!(
                out,
                "  search {} create {} update {} delete {}",
                mark(caps.vector_search),
                mark(caps.vector_create),
                mark(caps.vector_update),
                mark(caps.vector_delete)
            );
        }
        out
    }

    fn format_tools(&self, tools: &[McpTool]) -> String {
        if tools.is_empty() {
            return "Server exposes no tools.\n".to_string();
        }
        let mut out = String::new();
        for t in tools {
            match &t.description {
                Some(description) => {
                    let _ = writeln!(out, "{} - {}", style(&t.name).bold(), description);
                }
                None => {
                    let _ = writeln!(out, "{}", style(&t.name).bold());
                }
            }
        }
        out
    }

    fn format_keys(&self, keys: &[(String, String)]) -> String {
        if keys.is_empty() {
            return "No keys stored.\n".to_string();
        }
        let mut out = String::new();
        for (key, masked) in keys {
            let _ = writeln!(out, "{key}={masked}");
        }
        out
    }

    fn format_message(&self, message: &str) -> String {
        format!("{message}\n")
    }

    fn format_error(&self, error: &str) -> String {
        format!("{} {error}\n", style("Error:").red().bold())
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string()) + "\n"
    }
}

impl Formatter for JsonFormatter {
    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_connections(&self, connections: &[ConnectionConfig]) -> String {
        self.render(connections)
    }

    fn format_test_result(&self, name: &str, result: &ConnectionTestResult) -> String {
        self.render(&serde_json::json!({
            "name": name,
            "success": result.success,
            "message": result.message,
        }))
    }

    fn format_collections(&self, collections: &[CollectionInfo]) -> String {
        self.render(collections)
    }

    fn format_collection(&self, collection: &CollectionInfo) -> String {
        self.render(collection)
    }

    fn format_stats(&self, stats: &CollectionStats) -> String {
        self.render(stats)
    }

    fn format_documents(&self, documents: &[VectorDocument]) -> String {
        self.render(documents)
    }

    fn format_search_results(&self, results: &SearchResults) -> String {
        self.render(results)
    }

    fn format_chunks(&self, chunks: &[String]) -> String {
        self.render(&serde_json::json!({ "count": chunks.len(), "chunks": chunks }))
    }

    fn format_ingest_stats(&self, stats: &IngestStats) -> String {
        self.render(stats)
    }

    fn format_webhooks(&self, webhooks: &[WebhookConnection]) -> String {
        self.render(webhooks)
    }

    fn format_deliveries(&self, deliveries: &BTreeMap<String, DeliveryResult>) -> String {
        self.render(deliveries)
    }

    fn format_mcp_servers(&self, servers: &[McpConnection]) -> String {
        self.render(servers)
    }

    fn format_tools(&self, tools: &[McpTool]) -> String {
        self.render(tools)
    }

    fn format_keys(&self, keys: &[(String, String)]) -> String {
        let map: BTreeMap<&str, &str> = keys.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        self.render(&map)
    }

    fn format_message(&self, message: &str) -> String {
        self.render(&serde_json::json!({ "message": message }))
    }

    fn format_error(&self, error: &str) -> String {
        self.render(&serde_json::json!({ "error": error }))
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_status(&self, status: &StatusInfo) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## Status\n");
        let _ = writeln!(out, "| Item | Value |");
        let _ = writeln!(out, "|------|-------|");
        let _ = writeln!(
            out,
            "| Config | {} |",
            status.config_path.as_deref().unwrap_or("(defaults)")
        );
        let _ = writeln!(out, "| Data dir | {} |", status.data_dir);
        let _ = writeln!(out, "| Connections | {} |", status.connections);
        let _ = writeln!(out, "| Webhooks | {} |", status.webhooks);
        let _ = writeln!(out, "| MCP servers | {} |", status.mcp_servers);
        let _ = writeln!(
            out,
            "| Embedding | {} (key {}) |",
            status.embedding_model,
            if status.embedding_key_configured { "set" } else { "missing" }
        );
        out
    }

    fn format_connections(&self, connections: &[ConnectionConfig]) -> String {
        let mut out = String::from("## Connections\n\n| Name | Type | Status | ID |\n|------|------|--------|----|\n");
        for c in connections {
            let _ = writeln!(out, "| {} | {} | {} | `{}` |", c.name, c.db_type(), c.status, c.id);
        }
        out
    }

    fn format_test_result(&self, name: &str, result: &ConnectionTestResult) -> String {
        let verdict = if result.success { "**ok**" } else { "**failed**" };
        format!("- `{name}`: {verdict} {}\n", result.message)
    }

    fn format_collections(&self, collections: &[CollectionInfo]) -> String {
        let mut out = String::from("## Collections\n\n| Name | Documents | Dimensions | Metric |\n|------|-----------|------------|--------|\n");
        for c in collections {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                c.name, c.document_count, c.dimensions, c.distance_metric
            );
        }
        out
    }

    fn format_collection(&self, c: &CollectionInfo) -> String {
        let mut out = format!("## {}\n\n", c.name);
        if let Some(description) = &c.description {
            let _ = writeln!(out, "{description}\n");
        }
        let _ = writeln!(out, "- Documents: {}", c.document_count);
        let _ = writeln!(out, "- Dimensions: {}", c.dimensions);
        let _ = writeln!(out, "- Metric: {}", c.distance_metric);
        out
    }

    fn format_stats(&self, stats: &CollectionStats) -> String {
        let mut out = format!("## Stats: {}\n\n", stats.name);
        let _ = writeln!(out, "- Documents: {}", stats.document_count);
        let _ = writeln!(out, "- Dimensions: {}", stats.dimensions);
        if let Some(size) = stats.index_size_bytes {
            let _ = writeln!(out, "- Index size: {size} bytes");
        }
        out
    }

    fn format_documents(&self, documents: &[VectorDocument]) -> String {
        let mut out = String::new();
        for d in documents {
            let _ = writeln!(out, "### {}\n", d.id.as_deref().unwrap_or("-"));
            let _ = writeln!(out, "{}\n", preview(&d.content, PREVIEW_CHARS));
        }
        out
    }

    fn format_search_results(&self, results: &SearchResults) -> String {
        let mut out = format!("## Search: \"{}\"\n\n", results.query);
        if results.is_empty() {
            out.push_str("_No results._\n");
            return out;
        }
        let _ = writeln!(
            out,
            "{} results from `{}` in {}ms\n",
            results.len(),
            results.collection,
            results.duration_ms
        );
        for (i, r) in results.results.iter().enumerate() {
            let _ = writeln!(out, "### {}. `{}` (score {:.3})\n", i + 1, r.id, r.score);
            let _ = writeln!(out, "> {}\n", preview(&r.content, PREVIEW_CHARS).replace('\n', "\n> "));
        }
        out
    }

    fn format_chunks(&self, chunks: &[String]) -> String {
        let mut out = format!("## {} chunks\n\n", chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let _ = writeln!(out, "### Chunk {i}\n\n```\n{chunk}\n```\n");
        }
        out
    }

    fn format_ingest_stats(&self, stats: &IngestStats) -> String {
        let mut out = String::from("## Upload\n\n");
        let _ = writeln!(out, "- Files ingested: {}/{}", stats.files_ingested, stats.files_scanned);
        let _ = writeln!(out, "- Chunks created: {}", stats.chunks_created);
        let _ = writeln!(out, "- Documents added: {}", stats.documents_added);
        let _ = writeln!(out, "- Duration: {}ms", stats.duration_ms);
        out
    }

    fn format_webhooks(&self, webhooks: &[WebhookConnection]) -> String {
        let mut out = String::from("## Webhooks\n\n| Name | URL | Events | Status |\n|------|-----|--------|--------|\n");
        for w in webhooks {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                w.name,
                w.url,
                w.event_types.join(", "),
                w.status
            );
        }
        out
    }

    fn format_deliveries(&self, deliveries: &BTreeMap<String, DeliveryResult>) -> String {
        let mut out = String::from("## Deliveries\n\n| Webhook | Success | Status | Attempts |\n|---------|---------|--------|----------|\n");
        for (id, d) in deliveries {
            let status = d.status_code.map_or_else(|| "-".to_string(), |s| s.to_string());
            let _ = writeln!(out, "| `{id}` | {} | {status} | {} |", d.success, d.attempts);
        }
        out
    }

    fn format_mcp_servers(&self, servers: &[McpConnection]) -> String {
        let mut out = String::from("## MCP servers\n\n| Name | URL | Status | Protocol |\n|------|-----|--------|----------|\n");
        for s in servers {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                s.name,
                s.server_url,
                s.status,
                s.protocol_version.as_deref().unwrap_or("-")
            );
        }
        out
    }

    fn format_tools(&self, tools: &[McpTool]) -> String {
        let mut out = String::from("## Tools\n\n");
        for t in tools {
            let _ = writeln!(
                out,
                "- `{}`{}",
                t.name,
                t.description
                    .as_deref()
                    .map(|d| format!(": {d}"))
                    .unwrap_or_default()
            );
        }
        out
    }

    fn format_keys(&self, keys: &[(String, String)]) -> String {
        let mut out = String::from("## Keys\n\n");
        for (key, masked) in keys {
            let _ = writeln!(out, "- `{key}` = `{masked}`");
        }
        out
    }

    fn format_message(&self, message: &str) -> String {
        format!("{message}\n")
    }

    fn format_error(&self, error: &str) -> String {
        format!("**Error:** {error}\n")
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
