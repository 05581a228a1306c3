//! Run summary reported at the end of an ingestion

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// How a single file fared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Extracted and contributed text units
    Loaded,
    /// Extension has no extractor
    Unsupported,
    /// Extraction failed (missing, corrupt, extractor error)
    Failed,
    /// Extraction succeeded but produced no text
    Empty,
    /// Not reached before the run was cancelled
    NotProcessed,
}

impl FileStatus {
    fn label(&self) -> &'static str {
        match self {
            FileStatus::Loaded => "loaded",
            FileStatus::Unsupported => "unsupported",
            FileStatus::Failed => "failed",
            FileStatus::Empty => "empty",
            FileStatus::NotProcessed => "not processed",
        }
    }
}

/// Per-file counts
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub name: String,
    pub status: FileStatus,
    pub units: usize,
    pub chunks: usize,
    pub embedded: usize,
    pub written: usize,
    /// Cause for any status other than `Loaded`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FileReport {
    pub fn new(name: impl Into<String>, status: FileStatus) -> Self {
        Self {
            name: name.into(),
            status,
            units: 0,
            chunks: 0,
            embedded: 0,
            written: 0,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A chunk that was not embedded
#[derive(Debug, Clone, Serialize)]
pub struct DroppedChunk {
    pub id: String,
    pub file: String,
    pub reason: String,
}

/// Aggregate result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub index_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether the index had to be created this run
    pub index_created: bool,
    pub files: Vec<FileReport>,
    pub dropped_chunks: Vec<DroppedChunk>,
    pub failed_record_ids: Vec<String>,
    /// Records sent in batches the service only partly acknowledged
    pub unconfirmed_records: usize,
    /// Whitespace-only chunks that were never submitted
    pub blank_chunks_skipped: usize,
    pub cancelled: bool,
}

impl IngestReport {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            index_name: index_name.into(),
            started_at: Utc::now(),
            finished_at: None,
            index_created: false,
            files: Vec::new(),
            dropped_chunks: Vec::new(),
            failed_record_ids: Vec::new(),
            unconfirmed_records: 0,
            blank_chunks_skipped: 0,
            cancelled: false,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn files_loaded(&self) -> usize {
        self.count_status(FileStatus::Loaded)
    }

    pub fn files_failed(&self) -> usize {
        self.count_status(FileStatus::Failed)
    }

    pub fn files_unsupported(&self) -> usize {
        self.count_status(FileStatus::Unsupported)
    }

    pub fn files_empty(&self) -> usize {
        self.count_status(FileStatus::Empty)
    }

    pub fn total_units(&self) -> usize {
        self.files.iter().map(|f| f.units).sum()
    }

    pub fn total_chunks(&self) -> usize {
        self.files.iter().map(|f| f.chunks).sum()
    }

    pub fn total_embedded(&self) -> usize {
        self.files.iter().map(|f| f.embedded).sum()
    }

    pub fn total_written(&self) -> usize {
        self.files.iter().map(|f| f.written).sum()
    }

    /// Files that were skipped for any reason
    pub fn skipped_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.status != FileStatus::Loaded)
    }

    /// Whether the index is missing data that a re-run could supply
    pub fn needs_rerun(&self) -> bool {
        self.cancelled
            || self.files_failed() > 0
            || !self.dropped_chunks.is_empty()
            || !self.failed_record_ids.is_empty()
            || self.unconfirmed_records > 0
    }

    fn count_status(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ingestion run {} into index '{}'", self.run_id, self.index_name)?;
        if self.index_created {
            writeln!(f, "  index created this run")?;
        }
        writeln!(
            f,
            "  files:    {} configured, {} loaded, {} failed, {} unsupported, {} empty",
            self.files.len(),
            self.files_loaded(),
            self.files_failed(),
            self.files_unsupported(),
            self.files_empty()
        )?;
        writeln!(f, "  units:    {}", self.total_units())?;
        writeln!(f, "  chunks:   {}", self.total_chunks())?;
        writeln!(f, "  embedded: {}", self.total_embedded())?;
        writeln!(f, "  written:  {}", self.total_written())?;

        let skipped: Vec<_> = self.skipped_files().collect();
        if !skipped.is_empty() {
            writeln!(f, "  skipped files:")?;
            for file in skipped {
                match &file.reason {
                    Some(reason) => writeln!(f, "    - {} ({}): {}", file.name, file.status.label(), reason)?,
                    None => writeln!(f, "    - {} ({})", file.name, file.status.label())?,
                }
            }
        }
        if self.blank_chunks_skipped > 0 {
            writeln!(f, "  blank chunks skipped: {}", self.blank_chunks_skipped)?;
        }
        if !self.dropped_chunks.is_empty() {
            writeln!(f, "  dropped chunks: {}", self.dropped_chunks.len())?;
            for dropped in &self.dropped_chunks {
                writeln!(f, "    - {} [{}]: {}", dropped.file, dropped.id, dropped.reason)?;
            }
        }
        if !self.failed_record_ids.is_empty() {
            writeln!(f, "  failed upserts: {}", self.failed_record_ids.len())?;
            for id in &self.failed_record_ids {
                writeln!(f, "    - {}", id)?;
            }
        }
        if self.unconfirmed_records > 0 {
            writeln!(f, "  unconfirmed upserts: {}", self.unconfirmed_records)?;
        }
        if self.cancelled {
            writeln!(f, "  run was cancelled before completion")?;
        }
        if self.needs_rerun() {
            write!(f, "Re-run recommended: the index is missing some content.")
        } else {
            write!(f, "All configured content is in the index.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(name: &str, units: usize, chunks: usize) -> FileReport {
        let mut report = FileReport::new(name, FileStatus::Loaded);
        report.units = units;
        report.chunks = chunks;
        report.embedded = chunks;
        report.written = chunks;
        report
    }

    #[test]
    fn test_totals_and_rerun() {
        let mut report = IngestReport::new("vizum");
        report.files.push(loaded("a.docx", 1, 4));
        report.files.push(loaded("b.xlsx", 3, 7));
        report.files.push(FileReport::new("c.pdf", FileStatus::Unsupported).with_reason("pdf"));

        assert_eq!(report.total_units(), 4);
        assert_eq!(report.total_chunks(), 11);
        assert_eq!(report.total_written(), 11);
        assert_eq!(report.files_unsupported(), 1);
        // unsupported files will not load on a re-run either
        assert!(!report.needs_rerun());

        report.files.push(FileReport::new("d.docx", FileStatus::Failed).with_reason("corrupt"));
        assert!(report.needs_rerun());

        let summary = report.to_string();
        assert!(summary.contains("d.docx (failed): corrupt"));
        assert!(summary.contains("Re-run recommended"));
    }

    #[test]
    fn test_unconfirmed_records_need_rerun() {
        let mut report = IngestReport::new("vizum");
        report.files.push(loaded("a.docx", 1, 4));
        assert!(!report.needs_rerun());

        report.unconfirmed_records = 2;
        assert!(report.needs_rerun());
        assert!(report.to_string().contains("unconfirmed upserts: 2"));
    }
}
