//! Vector index provider trait for provisioning and writing vectors

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{IndexDescription, IndexRecord, IndexSpec};

/// Trait for a managed similarity index service
///
/// Implementations:
/// - `PineconeIndex`: Pinecone control and data plane
#[async_trait]
pub trait VectorIndexProvider: Send + Sync {
    /// Names of all indexes in the project
    async fn list_indexes(&self) -> Result<Vec<String>>;

    /// Shape and readiness of an existing index
    async fn describe_index(&self, name: &str) -> Result<IndexDescription>;

    /// Create an index; fails if it already exists
    async fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Insert or overwrite records by id; returns how many the service accepted
    async fn upsert(&self, index_name: &str, records: &[IndexRecord]) -> Result<usize>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
