//! In-memory services and document fixtures shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use office_ingest::config::IngestSettings;
use office_ingest::error::{Error, Result};
use office_ingest::providers::{EmbeddingProvider, VectorIndexProvider};
use office_ingest::types::{EmbeddingVector, IndexDescription, IndexRecord, IndexSpec, Metric};
use office_ingest::IngestConfig;

pub const DIMENSIONS: usize = 8;
pub const INDEX_NAME: &str = "vizum-test";

/// Embedding service producing deterministic vectors from the text bytes
pub struct FakeEmbedder {
    /// Texts containing this marker fail with a permanent error
    pub poison: Option<&'static str>,
    /// Dimension of the vectors actually returned
    pub output_dimension: usize,
    /// Batch calls still to answer with HTTP 429
    pub rate_limited_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            poison: None,
            output_dimension: DIMENSIONS,
            rate_limited_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            single_calls: AtomicUsize::new(0),
        }
    }

    pub fn poisoned(marker: &'static str) -> Self {
        Self {
            poison: Some(marker),
            ..Self::new()
        }
    }

    pub fn with_output_dimension(dimension: usize) -> Self {
        Self {
            output_dimension: dimension,
            ..Self::new()
        }
    }

    /// Embedder whose first `calls` batch requests are rate limited
    pub fn rate_limited(calls: usize) -> Self {
        Self {
            rate_limited_calls: AtomicUsize::new(calls),
            ..Self::new()
        }
    }

    fn vector_for(&self, text: &str) -> Result<EmbeddingVector> {
        if let Some(marker) = self.poison {
            if text.contains(marker) {
                return Err(Error::embedding("input rejected by model"));
            }
        }
        let mut values = vec![0.0f32; self.output_dimension];
        for (i, byte) in text.bytes().enumerate() {
            values[i % self.output_dimension] += byte as f32 / 255.0;
        }
        Ok(EmbeddingVector::new(values))
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.vector_for(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let limited = self
            .rate_limited_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(Error::Upstream {
                service: "embedding service",
                status: 429,
                message: "rate limit reached".into(),
            });
        }
        texts.iter().map(|t| self.vector_for(t)).collect()
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn name(&self) -> &str {
        "fake-embedder"
    }
}

/// Vector index kept in memory, keyed by record id
pub struct MemoryIndex {
    pub description: Mutex<Option<IndexDescription>>,
    pub records: Mutex<HashMap<String, IndexRecord>>,
    pub create_calls: AtomicUsize,
    pub upsert_calls: AtomicUsize,
    /// Upserts carrying records of this file always fail with HTTP 503
    pub reject_file: Option<&'static str>,
    /// Acknowledge at most this many records per upsert
    pub accept_at_most: usize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            description: Mutex::new(None),
            records: Mutex::new(HashMap::new()),
            create_calls: AtomicUsize::new(0),
            upsert_calls: AtomicUsize::new(0),
            reject_file: None,
            accept_at_most: usize::MAX,
        }
    }

    /// Index that refuses every write for `filename`
    pub fn rejecting(filename: &'static str) -> Self {
        Self {
            reject_file: Some(filename),
            ..Self::new()
        }
    }

    /// Index that acknowledges at most `n` records per upsert call
    pub fn acknowledging(n: usize) -> Self {
        Self {
            accept_at_most: n,
            ..Self::new()
        }
    }

    /// Index that already exists with the given shape
    pub fn existing(dimension: usize, metric: Metric) -> Self {
        let index = Self::new();
        *index.description.lock().unwrap() = Some(IndexDescription {
            name: INDEX_NAME.to_string(),
            dimension,
            metric,
            host: Some("memory".into()),
            ready: true,
        });
        index
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn records_for(&self, filename: &str) -> Vec<IndexRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.metadata.get("filename").and_then(|v| v.as_str()) == Some(filename))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl VectorIndexProvider for MemoryIndex {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        Ok(self
            .description
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.name.clone())
            .collect())
    }

    async fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        self.description
            .lock()
            .unwrap()
            .clone()
            .filter(|d| d.name == name)
            .ok_or_else(|| Error::Upstream {
                service: "index service",
                status: 404,
                message: format!("index {} not found", name),
            })
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.description.lock().unwrap() = Some(IndexDescription {
            name: spec.name.clone(),
            dimension: spec.dimension,
            metric: spec.metric,
            host: Some("memory".into()),
            ready: true,
        });
        Ok(())
    }

    async fn upsert(&self, _index_name: &str, records: &[IndexRecord]) -> Result<usize> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(rejected) = self.reject_file {
            let hit = records
                .iter()
                .any(|r| r.metadata.get("filename").and_then(|v| v.as_str()) == Some(rejected));
            if hit {
                return Err(Error::Upstream {
                    service: "index service",
                    status: 503,
                    message: "write capacity exceeded".into(),
                });
            }
        }
        let accepted = records.len().min(self.accept_at_most);
        let mut stored = self.records.lock().unwrap();
        for record in &records[..accepted] {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(accepted)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Configuration pointing at `base_dir`, with fast retries and small vectors
pub fn config(base_dir: &Path, files: &[&str]) -> IngestConfig {
    let mut settings = IngestSettings::default();
    settings.input.base_dir = base_dir.to_path_buf();
    settings.input.files = files.iter().map(|f| f.to_string()).collect();
    settings.embeddings.dimensions = DIMENSIONS;
    settings.embeddings.max_retries = 1;
    settings.embeddings.retry_base_delay_ms = 0;
    settings.index.ready_poll_interval_secs = 0;
    settings.processing.parallel_files = Some(2);

    IngestConfig::from_lookup(settings, |key| {
        let value = match key {
            "EMBEDDING_API_KEY" => "sk-test",
            "INDEX_SERVICE_API_KEY" => "pc-test",
            "INDEX_SERVICE_ENVIRONMENT" => "test-env",
            "INDEX_NAME" => INDEX_NAME,
            _ => return None,
        };
        Some(value.to_string())
    })
    .expect("test configuration is valid")
}

/// Write a Word document with one paragraph per entry
pub fn write_docx(path: &Path, paragraphs: &[&str]) {
    let mut doc = docx_rs::Docx::new();
    for text in paragraphs {
        doc = doc.add_paragraph(docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text(*text)));
    }
    let file = std::fs::File::create(path).expect("create docx");
    doc.build().pack(file).expect("pack docx");
}

/// Write a single-sheet workbook; cells that parse as numbers are stored numerically
pub fn write_xlsx(path: &Path, sheet_name: &str, rows: &[&[&str]]) {
    let mut sheet_rows = String::new();
    for (r, row) in rows.iter().enumerate() {
        sheet_rows.push_str(&format!("<row r=\"{}\">", r + 1));
        for (c, value) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", (b'A' + c as u8) as char, r + 1);
            if value.parse::<f64>().is_ok() {
                sheet_rows.push_str(&format!("<c r=\"{}\"><v>{}</v></c>", cell_ref, value));
            } else {
                sheet_rows.push_str(&format!(
                    "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                    cell_ref, value
                ));
            }
        }
        sheet_rows.push_str("</row>");
    }

    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#
                .to_string(),
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#
                .to_string(),
        ),
        (
            "xl/workbook.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#,
                sheet_name
            ),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#
                .to_string(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
                sheet_rows
            ),
        ),
    ];

    let file = std::fs::File::create(path).expect("create xlsx");
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in parts {
        zip.start_file(name, options).expect("start zip entry");
        zip.write_all(content.as_bytes()).expect("write zip entry");
    }
    zip.finish().expect("finish xlsx");
}

/// Paragraph text long enough to produce several chunks
pub fn long_paragraphs(topic: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            format!(
                "Section {} of the {} covers customer due diligence, transaction monitoring \
                 and the escalation of unusual operations to the compliance officer.",
                i + 1,
                topic
            )
        })
        .collect()
}
