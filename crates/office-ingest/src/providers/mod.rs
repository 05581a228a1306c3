//! Provider abstractions for the embedding and vector index services
//!
//! The pipeline only depends on the traits; the HTTP clients are wired in by
//! `IngestPipeline::from_config`.

pub mod embedding;
pub mod openai;
pub mod pinecone;
pub mod vector_index;

pub use embedding::EmbeddingProvider;
pub use openai::OpenAiEmbedder;
pub use pinecone::PineconeIndex;
pub use vector_index::VectorIndexProvider;
