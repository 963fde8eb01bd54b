//! Search-related models for queries and results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AdapterError;

pub const DEFAULT_TOP_K: u32 = 10;

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
    /// Documentation-friendly Markdown format
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// A similarity search request against one collection.
///
/// At least one of `vector` or `text` must be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default)]
    pub min_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Map<String, Value>>,
}

fn default_top_k() -> u32 {
    DEFAULT_TOP_K
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            vector: None,
            text: None,
            top_k: DEFAULT_TOP_K,
            min_score: 0.0,
            filter: None,
        }
    }
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn vector(vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
            ..Default::default()
        }
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_filter(mut self, filter: Map<String, Value>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Non-empty query text, if any.
    pub fn query_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn validate(&self) -> Result<(), AdapterError> {
        let has_vector = self.vector.as_ref().is_some_and(|v| !v.is_empty());
        if !has_vector && self.query_text().is_none() {
            return Err(AdapterError::Validation(
                "search query requires a vector or text".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(AdapterError::Validation(
                "topK must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Search results with the context needed for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub query: String,
    pub collection: String,
    pub results: Vec<SearchResult>,
    pub duration_ms: u64,
}

impl SearchResults {
    pub fn new(
        query: String,
        collection: String,
        results: Vec<SearchResult>,
        duration_ms: u64,
    ) -> Self {
        Self {
            query,
            collection,
            results,
            duration_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

/// Keep results at or above `min_score`, best first, at most `top_k`.
pub fn rank_results(mut results: Vec<SearchResult>, query: &SearchQuery) -> Vec<SearchResult> {
    results.retain(|r| r.score >= query.min_score);
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(query.top_k as usize);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f32) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            score,
            content: String::new(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "md".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
    }

    #[test]
    fn test_query_requires_vector_or_text() {
        assert!(SearchQuery::default().validate().is_err());
        assert!(SearchQuery::text("   ").validate().is_err());
        assert!(SearchQuery::vector(vec![]).validate().is_err());
        assert!(SearchQuery::text("rust").validate().is_ok());
        assert!(SearchQuery::vector(vec![0.1]).validate().is_ok());
    }

    #[test]
    fn test_query_rejects_zero_top_k() {
        let err = SearchQuery::text("x").with_top_k(0).validate().unwrap_err();
        assert!(matches!(err, AdapterError::Validation(_)));
    }

    #[test]
    fn test_query_defaults_from_json() {
        let query: SearchQuery = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(query.top_k, DEFAULT_TOP_K);
        assert_eq!(query.min_score, 0.0);
    }

    #[test]
    fn test_rank_results() {
        let query = SearchQuery::text("x").with_top_k(2).with_min_score(0.3);
        let ranked = rank_results(
            vec![hit("a", 0.5), hit("b", 0.9), hit("c", 0.1), hit("d", 0.7)],
            &query,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }
}
