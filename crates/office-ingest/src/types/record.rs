//! Embedding vectors, index records and index descriptions

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use super::document::{Chunk, SourceFile};

/// Fixed-dimension embedding of a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector {
    pub values: Vec<f32>,
}

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Distance metric of a similarity index
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Euclidean,
    #[serde(rename = "dotproduct", alias = "dot")]
    DotProduct,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::DotProduct => "dotproduct",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired shape of the target index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

/// Index as reported by the index service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    /// Data-plane host, once the service has assigned one
    pub host: Option<String>,
    pub ready: bool,
}

impl IndexDescription {
    /// Whether the index can accept vectors described by `spec`
    pub fn matches(&self, spec: &IndexSpec) -> bool {
        self.dimension == spec.dimension && self.metric == spec.metric
    }
}

/// A vector plus metadata, keyed by a stable id
#[derive(Debug, Clone, Serialize)]
pub struct IndexRecord {
    pub id: String,
    pub values: EmbeddingVector,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl IndexRecord {
    /// Build the record for an embedded chunk
    pub fn from_chunk(chunk: &Chunk, values: EmbeddingVector) -> Self {
        let unit = &chunk.parent;
        let source = &unit.source;

        let mut metadata: HashMap<String, serde_json::Value> = unit
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        metadata.insert("text".into(), chunk.text.clone().into());
        metadata.insert("source".into(), source.identity().into());
        metadata.insert("filename".into(), source.name.clone().into());
        metadata.insert("file_type".into(), source.file_type.as_str().into());
        metadata.insert("unit_index".into(), unit.unit_index.into());
        metadata.insert("chunk_index".into(), chunk.sequence_index.into());
        metadata.insert("char_count".into(), chunk.char_count.into());

        Self {
            id: record_id(source, unit.unit_index, chunk.sequence_index),
            values,
            metadata,
        }
    }
}

/// Deterministic record id: re-running on unchanged input overwrites instead of duplicating
pub fn record_id(source: &SourceFile, unit_index: u32, sequence_index: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.identity().as_bytes());
    hasher.update([0x1f]);
    hasher.update(unit_index.to_be_bytes());
    hasher.update(sequence_index.to_be_bytes());
    hex::encode(hasher.finalize())
}
