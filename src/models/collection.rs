//! Collection models shared by every adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::connection::DEFAULT_DIMENSIONS;

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

impl DistanceMetric {
    /// Similarity score between two vectors; higher is closer.
    ///
    /// Euclidean distance is mapped to `1 / (1 + d)` so every metric sorts the
    /// same way.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        let len = a.len().min(b.len());
        let (a, b) = (&a[..len], &b[..len]);
        match self {
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
            DistanceMetric::Euclidean => {
                let dist: f32 = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + dist)
            }
            DistanceMetric::DotProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::DotProduct => write!(f, "dot_product"),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "dot_product" | "dotproduct" | "dot" => Ok(DistanceMetric::DotProduct),
            _ => Err(format!("unknown distance metric: {s}")),
        }
    }
}

/// A named partition inside a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub name: String,
    #[serde(default)]
    pub document_count: u64,
    #[serde(default = "default_dimensions")]
    pub dimensions: u32,
    #[serde(default)]
    pub distance_metric: DistanceMetric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl CollectionInfo {
    /// Info for a freshly created, empty collection.
    pub fn from_config(config: &CollectionConfig) -> Self {
        Self {
            name: config.name.clone(),
            document_count: 0,
            dimensions: config.dimensions,
            distance_metric: config.distance_metric,
            description: config.description.clone(),
            metadata: Map::new(),
        }
    }
}

/// Settings for a new collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    pub name: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: u32,
    #[serde(default)]
    pub distance_metric: DistanceMetric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>, dimensions: u32) -> Self {
        Self {
            name: name.into(),
            dimensions,
            distance_metric: DistanceMetric::Cosine,
            description: None,
        }
    }
}

/// Mutable collection attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub name: String,
    pub document_count: u64,
    pub dimensions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl CollectionStats {
    /// Stats reported when the backend could not be queried.
    pub fn empty(name: impl Into<String>, dimensions: u32) -> Self {
        Self {
            name: name.into(),
            document_count: 0,
            dimensions,
            index_size_bytes: None,
            last_updated: None,
        }
    }
}

fn default_dimensions() -> u32 {
    DEFAULT_DIMENSIONS
}
