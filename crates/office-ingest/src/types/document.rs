//! Source file, text unit and chunk types with position tracking

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Supported file types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Microsoft Word document (.docx)
    Docx,
    /// Excel spreadsheet (.xlsx)
    Xlsx,
    /// Anything else
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "docx" => Self::Docx,
            "xlsx" => Self::Xlsx,
            _ => Self::Unknown,
        }
    }

    /// Check if this is a supported file type
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Short label stored in record metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Unknown => "unknown",
        }
    }
}

/// A configured input file. Identity is the resolved path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// File name as configured
    pub name: String,
    /// Path resolved under the base directory
    pub path: PathBuf,
    /// Lowercased extension without the dot
    pub extension: String,
    /// File type derived from the extension
    pub file_type: FileType,
}

impl SourceFile {
    /// Resolve `name` under `base_dir`
    pub fn new(base_dir: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let name = name.into();
        let path = base_dir.as_ref().join(&name);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        Self {
            file_type: FileType::from_extension(&extension),
            name,
            path,
            extension,
        }
    }

    /// Stable identity used for record ids
    pub fn identity(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// A logical block of extracted text (a whole document, a worksheet, ...)
#[derive(Debug, Clone)]
pub struct TextUnit {
    /// Extracted text
    pub content: String,
    /// Extraction metadata copied onto every record
    pub metadata: HashMap<String, String>,
    /// File the unit was extracted from
    pub source: Arc<SourceFile>,
    /// Position of the unit within its file
    pub unit_index: u32,
}

impl TextUnit {
    /// Whether the unit has no text worth chunking
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// A bounded slice of a text unit, sized for embedding
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Chunk text
    pub text: String,
    /// Number of characters (not bytes) in `text`
    pub char_count: usize,
    /// Character offset of the chunk within its unit
    pub char_start: usize,
    /// Unit the chunk was cut from
    pub parent: Arc<TextUnit>,
    /// Position of the chunk within its unit
    pub sequence_index: u32,
}

impl Chunk {
    /// Whether the chunk has nothing to embed
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// File name of the originating source
    pub fn filename(&self) -> &str {
        &self.parent.source.name
    }
}
