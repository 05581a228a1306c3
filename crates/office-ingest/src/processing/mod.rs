//! Pipeline stages after extraction: embedding, provisioning, upserting

mod embedder;
mod pipeline;
mod provision;
mod retry;
mod upsert;

pub use embedder::{ChunkEmbedder, EmbedOutcome, EmbeddedChunk};
pub use pipeline::{IngestPipeline, PipelineStage};
pub use provision::{IndexProvisioner, ProvisionOutcome};
pub use retry::RetryPolicy;
pub use upsert::{UpsertClient, UpsertCounts};
