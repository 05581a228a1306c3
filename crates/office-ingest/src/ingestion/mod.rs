//! Document loading and chunking

mod chunker;
mod parser;

pub use chunker::TextChunker;
pub use parser::{DocumentLoader, DocxExtractor, ExtractedBlock, Extractor, LoadOutcome, XlsxExtractor};
