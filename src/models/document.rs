use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A piece of content stored in a vector database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl VectorDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The document id, generating and storing a fresh one if absent.
    pub fn ensure_id(&mut self) -> String {
        self.id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone()
    }

    /// Deterministic id for a chunk of a parent document.
    pub fn chunk_id(parent_id: &str, chunk_index: usize) -> String {
        let name = format!("{parent_id}:{chunk_index}");
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    /// Whether every key/value pair of `filter` is present in the metadata.
    pub fn matches_filter(&self, filter: &Map<String, Value>) -> bool {
        filter
            .iter()
            .all(|(key, expected)| self.metadata.get(key) == Some(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_id_is_deterministic() {
        let id = VectorDocument::chunk_id("abc123", 5);
        assert_eq!(id.len(), 36);
        assert_eq!(id, VectorDocument::chunk_id("abc123", 5));
        assert_ne!(id, VectorDocument::chunk_id("abc123", 6));
    }

    #[test]
    fn test_ensure_id_keeps_existing() {
        let mut doc = VectorDocument::new("x").with_id("fixed");
        assert_eq!(doc.ensure_id(), "fixed");

        let mut doc = VectorDocument::new("y");
        let generated = doc.ensure_id();
        assert_eq!(doc.id.as_deref(), Some(generated.as_str()));
    }

    #[test]
    fn test_matches_filter() {
        let doc = VectorDocument::new("x")
            .with_metadata("source", "upload")
            .with_metadata("page", 3);

        let mut filter = Map::new();
        filter.insert("source".to_string(), json!("upload"));
        assert!(doc.matches_filter(&filter));

        filter.insert("page".to_string(), json!(4));
        assert!(!doc.matches_filter(&filter));
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let doc = VectorDocument::new("hello").with_embedding(vec![0.1, 0.2]);
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["embedding"].as_array().unwrap().len(), 2);
        assert_eq!(value["metadata"], json!({}));
    }
}
