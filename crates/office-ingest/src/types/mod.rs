//! Core types for the ingestion pipeline

pub mod document;
pub mod record;
pub mod report;

pub use document::{Chunk, FileType, SourceFile, TextUnit};
pub use record::{record_id, EmbeddingVector, IndexDescription, IndexRecord, IndexSpec, Metric};
pub use report::{DroppedChunk, FileReport, FileStatus, IngestReport};
