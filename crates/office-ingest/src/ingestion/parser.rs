//! Format-specific text extraction for office documents

use calamine::Reader;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{FileType, SourceFile, TextUnit};

/// Text and metadata produced by an extractor, before it is tied to a source file
#[derive(Debug, Clone, Default)]
pub struct ExtractedBlock {
    pub text: String,
    pub metadata: HashMap<String, String>,
}

/// Extracts text blocks from one file format
pub trait Extractor: Send + Sync {
    /// Format handled by this extractor
    fn file_type(&self) -> FileType;

    /// Extract ordered text blocks from raw file bytes
    fn extract(&self, filename: &str, data: &[u8]) -> Result<Vec<ExtractedBlock>>;
}

/// Result of loading one file
#[derive(Debug)]
pub enum LoadOutcome {
    /// Extraction succeeded; may hold zero units when the file has no text
    Loaded(Vec<TextUnit>),
    /// No extractor for this extension
    Unsupported(String),
    /// Reading or extraction failed
    Failed(Error),
}

/// Dispatches each source file to the extractor for its format
#[derive(Clone)]
pub struct DocumentLoader {
    extractors: HashMap<FileType, Arc<dyn Extractor>>,
}

impl DocumentLoader {
    /// Loader with the DOCX and XLSX extractors
    pub fn new() -> Self {
        Self::empty()
            .with_extractor(Arc::new(DocxExtractor))
            .with_extractor(Arc::new(XlsxExtractor))
    }

    /// Loader with no extractors registered
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Register (or replace) the extractor for its format
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractors.insert(extractor.file_type(), extractor);
        self
    }

    /// Load a file into text units. Never panics or propagates: every failure
    /// is returned as an outcome for the caller to record.
    pub fn load(&self, source: &Arc<SourceFile>) -> LoadOutcome {
        let Some(extractor) = self.extractors.get(&source.file_type) else {
            let ext = if source.extension.is_empty() {
                "(none)".to_string()
            } else {
                format!(".{}", source.extension)
            };
            return LoadOutcome::Unsupported(ext);
        };

        let data = match std::fs::read(&source.path) {
            Ok(data) => data,
            Err(e) => {
                return LoadOutcome::Failed(Error::file_parse(
                    &source.name,
                    format!("cannot read {}: {}", source.path.display(), e),
                ))
            }
        };

        match extractor.extract(&source.name, &data) {
            Ok(blocks) => LoadOutcome::Loaded(Self::into_units(source, blocks)),
            Err(e) => LoadOutcome::Failed(e),
        }
    }

    fn into_units(source: &Arc<SourceFile>, blocks: Vec<ExtractedBlock>) -> Vec<TextUnit> {
        blocks
            .into_iter()
            .filter(|block| !block.text.trim().is_empty())
            .enumerate()
            .map(|(i, block)| {
                let mut metadata = block.metadata;
                metadata
                    .entry("filename".to_string())
                    .or_insert_with(|| source.name.clone());
                metadata
                    .entry("source".to_string())
                    .or_insert_with(|| source.identity());
                metadata
                    .entry("file_type".to_string())
                    .or_insert_with(|| source.file_type.as_str().to_string());
                TextUnit {
                    content: block.text,
                    metadata,
                    source: Arc::clone(source),
                    unit_index: i as u32,
                }
            })
            .collect()
    }
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Word documents: one block for the whole body
pub struct DocxExtractor;

impl DocxExtractor {
    fn paragraph_text(children: &[docx_rs::ParagraphChild], out: &mut String) {
        for child in children {
            match child {
                docx_rs::ParagraphChild::Run(run) => {
                    for child in &run.children {
                        match child {
                            docx_rs::RunChild::Text(t) => out.push_str(&t.text),
                            docx_rs::RunChild::Tab(_) => out.push('\t'),
                            docx_rs::RunChild::Break(_) => out.push('\n'),
                            _ => {}
                        }
                    }
                }
                docx_rs::ParagraphChild::Hyperlink(link) => {
                    Self::paragraph_text(&link.children, out);
                }
                _ => {}
            }
        }
    }

    fn table_text(table: &docx_rs::Table) -> String {
        let mut rows = Vec::new();
        for docx_rs::TableChild::TableRow(row) in &table.rows {
            let mut cells = Vec::with_capacity(row.cells.len());
            for docx_rs::TableRowChild::TableCell(cell) in &row.cells {
                let mut text = String::new();
                for content in &cell.children {
                    if let docx_rs::TableCellContent::Paragraph(p) = content {
                        if !text.is_empty() {
                            text.push(' ');
                        }
                        Self::paragraph_text(&p.children, &mut text);
                    }
                }
                cells.push(text.trim().to_string());
            }

            if !cells.iter().all(|c| c.is_empty()) {
                rows.push(cells.join(" | "));
            }
        }
        rows.join("\n")
    }
}

impl Extractor for DocxExtractor {
    fn file_type(&self) -> FileType {
        FileType::Docx
    }

    fn extract(&self, filename: &str, data: &[u8]) -> Result<Vec<ExtractedBlock>> {
        let doc = docx_rs::read_docx(data).map_err(|e| Error::file_parse(filename, e.to_string()))?;

        let mut blocks: Vec<String> = Vec::new();
        for child in &doc.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(p) => {
                    let mut text = String::new();
                    Self::paragraph_text(&p.children, &mut text);
                    if !text.trim().is_empty() {
                        blocks.push(text);
                    }
                }
                docx_rs::DocumentChild::Table(table) => {
                    let text = Self::table_text(table);
                    if !text.is_empty() {
                        blocks.push(text);
                    }
                }
                _ => {}
            }
        }

        let mut metadata = HashMap::new();
        metadata.insert("category".to_string(), "document".to_string());

        Ok(vec![ExtractedBlock {
            text: blocks.join("\n\n"),
            metadata,
        }])
    }
}

/// Spreadsheets: one block per worksheet
pub struct XlsxExtractor;

impl XlsxExtractor {
    fn cell_text(cell: &calamine::Data) -> String {
        match cell {
            calamine::Data::Empty => String::new(),
            calamine::Data::String(s) => s.trim().to_string(),
            calamine::Data::Float(f) => f.to_string(),
            calamine::Data::Int(i) => i.to_string(),
            calamine::Data::Bool(b) => b.to_string(),
            calamine::Data::DateTime(dt) => dt.to_string(),
            calamine::Data::DateTimeIso(s) | calamine::Data::DurationIso(s) => s.clone(),
            _ => String::new(),
        }
    }
}

impl Extractor for XlsxExtractor {
    fn file_type(&self) -> FileType {
        FileType::Xlsx
    }

    fn extract(&self, filename: &str, data: &[u8]) -> Result<Vec<ExtractedBlock>> {
        let cursor = std::io::Cursor::new(data);
        let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
            .map_err(|e| Error::file_parse(filename, e.to_string()))?;

        let mut blocks = Vec::new();
        for (position, sheet_name) in workbook.sheet_names().to_vec().into_iter().enumerate() {
            let range = workbook
                .worksheet_range(&sheet_name)
                .map_err(|e| Error::file_parse(filename, format!("sheet '{}': {}", sheet_name, e)))?;

            let mut sheet_content = String::new();
            for row in range.rows() {
                let row_text: Vec<String> = row.iter().map(Self::cell_text).collect();
                if !row_text.iter().all(|s| s.is_empty()) {
                    sheet_content.push_str(&row_text.join(" | "));
                    sheet_content.push('\n');
                }
            }

            if sheet_content.trim().is_empty() {
                tracing::debug!("[{}] sheet '{}' is empty", filename, sheet_name);
                continue;
            }

            let mut metadata = HashMap::new();
            metadata.insert("category".to_string(), "sheet".to_string());
            metadata.insert("sheet_name".to_string(), sheet_name.clone());
            metadata.insert("page_number".to_string(), (position + 1).to_string());

            blocks.push(ExtractedBlock {
                text: format!("Sheet: {}\n{}", sheet_name, sheet_content),
                metadata,
            });
        }

        Ok(blocks)
    }
}
