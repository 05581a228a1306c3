//! office-ingest: batch ingestion of office documents into a vector index
//!
//! Loads DOCX and XLSX files, splits their text into overlapping chunks,
//! embeds each chunk and upserts the vectors with deterministic ids, so
//! re-running on unchanged input overwrites instead of duplicating.
//! The target index is created on first use. A file that fails to load
//! is reported and skipped without stopping the run.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod types;

pub use config::{IngestConfig, IngestSettings};
pub use error::{Error, Result};
pub use processing::IngestPipeline;
pub use types::{
    document::{Chunk, FileType, SourceFile, TextUnit},
    record::{IndexRecord, IndexSpec, Metric},
    report::{FileStatus, IngestReport},
};
