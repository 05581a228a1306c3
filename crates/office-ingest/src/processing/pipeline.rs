//! End-to-end ingestion run: provision, load, chunk, embed, upsert

use futures::future::join_all;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::ingestion::{DocumentLoader, LoadOutcome, TextChunker};
use crate::providers::{EmbeddingProvider, OpenAiEmbedder, PineconeIndex, VectorIndexProvider};
use crate::types::{FileReport, FileStatus, IndexRecord, IndexSpec, IngestReport, SourceFile, TextUnit};

use super::embedder::ChunkEmbedder;
use super::provision::IndexProvisioner;
use super::retry::RetryPolicy;
use super::upsert::UpsertClient;

/// Stage of a run, used in log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    ProvisionIndex,
    Load,
    Chunk,
    Embed,
    Upsert,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Init => "init",
            PipelineStage::ProvisionIndex => "provision_index",
            PipelineStage::Load => "load",
            PipelineStage::Chunk => "chunk",
            PipelineStage::Embed => "embed",
            PipelineStage::Upsert => "upsert",
            PipelineStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Batch ingestion of office documents into a vector index
pub struct IngestPipeline {
    index_spec: IndexSpec,
    loader: DocumentLoader,
    chunker: TextChunker,
    embedder: ChunkEmbedder,
    provisioner: IndexProvisioner,
    upserter: UpsertClient,
    parallel_files: usize,
    stop: Arc<AtomicBool>,
}

impl IngestPipeline {
    /// Build a pipeline against the OpenAI and Pinecone services
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let embeddings = &config.settings.embeddings;
        let index = &config.settings.index;

        let embedder = Arc::new(OpenAiEmbedder::new(&config.credentials.embedding_api_key, embeddings)?);
        let vector_index = Arc::new(PineconeIndex::new(
            &config.credentials.index_api_key,
            config.controller_url(),
            index.namespace.clone(),
            Duration::from_secs(index.timeout_secs),
        )?);

        Self::with_providers(config, embedder, vector_index)
    }

    /// Build a pipeline from explicit providers
    pub fn with_providers(
        config: &IngestConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        index_provider: Arc<dyn VectorIndexProvider>,
    ) -> Result<Self> {
        tracing::debug!(stage = %PipelineStage::Init, "Validating configuration");
        config.validate()?;

        let s = &config.settings;
        if embedding_provider.dimensions() != s.embeddings.dimensions {
            return Err(Error::Config(format!(
                "{} produces {}-dimensional vectors but embeddings.dimensions is {}",
                embedding_provider.name(),
                embedding_provider.dimensions(),
                s.embeddings.dimensions
            )));
        }

        let retry_delay = Duration::from_millis(s.embeddings.retry_base_delay_ms);
        let parallel_files = s.processing.parallel_files();
        let parallel_embeddings = s.processing.parallel_embeddings();

        tracing::info!(
            "Pipeline configured: {} parallel files, {} parallel embedding requests, chunks of {} (overlap {})",
            parallel_files,
            parallel_embeddings,
            s.chunking.chunk_size,
            s.chunking.chunk_overlap
        );

        Ok(Self {
            index_spec: IndexSpec {
                name: config.index_name.clone(),
                dimension: s.embeddings.dimensions,
                metric: s.index.metric,
            },
            loader: DocumentLoader::new(),
            chunker: TextChunker::new(s.chunking.chunk_size, s.chunking.chunk_overlap),
            embedder: ChunkEmbedder::new(
                embedding_provider,
                RetryPolicy::new(s.embeddings.max_retries, retry_delay),
                s.embeddings.batch_size,
                parallel_embeddings,
                s.embeddings.dimensions,
            ),
            provisioner: IndexProvisioner::new(
                Arc::clone(&index_provider),
                Duration::from_secs(s.index.ready_timeout_secs),
                Duration::from_secs(s.index.ready_poll_interval_secs),
            ),
            upserter: UpsertClient::new(
                index_provider,
                config.index_name.clone(),
                s.index.upsert_batch_size,
                s.index.upsert_retries,
                retry_delay,
            ),
            parallel_files,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops the run between batches once set
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run the pipeline over `files`, in order.
    ///
    /// Returns `Err` only for run-level failures (provisioning, rejected
    /// credentials, dimension mismatch). Per-file problems end up in the report.
    pub async fn run(&self, files: Vec<SourceFile>) -> Result<IngestReport> {
        let run_start = Instant::now();
        let mut report = IngestReport::new(&self.index_spec.name);
        tracing::info!("Starting ingestion run {} over {} files", report.run_id, files.len());

        tracing::info!(stage = %PipelineStage::ProvisionIndex, "Ensuring index '{}'", self.index_spec.name);
        let provisioned = self.provisioner.ensure_index(&self.index_spec).await.map_err(|e| {
            tracing::error!("Index provisioning failed, nothing was written: {}", e);
            e
        })?;
        report.index_created = provisioned.created;

        let files: Vec<Arc<SourceFile>> = files.into_iter().map(Arc::new).collect();
        tracing::info!(stage = %PipelineStage::Load, "Loading {} files", files.len());
        let outcomes = self.load_all(&files).await;

        for (source, outcome) in files.iter().zip(outcomes) {
            if self.stop.load(Ordering::Acquire) {
                report.cancelled = true;
                report.files.push(FileReport::new(&source.name, FileStatus::NotProcessed));
                continue;
            }

            let file_report = match outcome {
                LoadOutcome::Unsupported(ext) => {
                    tracing::warn!("[{}] Skipping unsupported file type '{}'", source.name, ext);
                    FileReport::new(&source.name, FileStatus::Unsupported)
                        .with_reason(Error::UnsupportedFileType(ext).to_string())
                }
                LoadOutcome::Failed(e) => {
                    tracing::error!("[{}] Failed to load: {}", source.name, e);
                    FileReport::new(&source.name, FileStatus::Failed).with_reason(e.to_string())
                }
                LoadOutcome::Loaded(units) if units.is_empty() => {
                    tracing::warn!("[{}] No text extracted", source.name);
                    FileReport::new(&source.name, FileStatus::Empty).with_reason("no text extracted")
                }
                LoadOutcome::Loaded(units) => {
                    self.process_file(source, units, &mut report).await.map_err(|e| {
                        tracing::error!("[{}] Aborting run: {}", source.name, e);
                        e
                    })?
                }
            };
            report.files.push(file_report);
        }

        report.finish();
        tracing::info!(
            stage = %PipelineStage::Done,
            "Run {} finished in {:.1}s: {} files loaded, {} chunks, {} written",
            report.run_id,
            run_start.elapsed().as_secs_f64(),
            report.files_loaded(),
            report.total_chunks(),
            report.total_written()
        );
        Ok(report)
    }

    /// Extract all files on the blocking pool, at most `parallel_files` at once.
    /// Outcomes come back in input order.
    async fn load_all(&self, files: &[Arc<SourceFile>]) -> Vec<LoadOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.parallel_files));

        let futures = files.iter().map(|source| {
            let sem = Arc::clone(&semaphore);
            let loader = self.loader.clone();
            let source = Arc::clone(source);

            async move {
                let _permit = match sem.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return LoadOutcome::Failed(Error::internal("load semaphore closed")),
                };

                let start = Instant::now();
                let name = source.name.clone();
                let outcome = tokio::task::spawn_blocking(move || loader.load(&source))
                    .await
                    .unwrap_or_else(|e| {
                        LoadOutcome::Failed(Error::internal(format!("extraction task failed: {}", e)))
                    });

                if let LoadOutcome::Loaded(units) = &outcome {
                    tracing::info!(
                        "[{}] Extracted {} text units in {:.1}s",
                        name,
                        units.len(),
                        start.elapsed().as_secs_f64()
                    );
                }
                outcome
            }
        });

        join_all(futures).await
    }

    async fn process_file(
        &self,
        source: &SourceFile,
        units: Vec<TextUnit>,
        report: &mut IngestReport,
    ) -> Result<FileReport> {
        let mut file_report = FileReport::new(&source.name, FileStatus::Loaded);
        let file_start = Instant::now();

        let units: Vec<Arc<TextUnit>> = units.into_iter().map(Arc::new).collect();
        file_report.units = units.len();

        let chunks = self.chunker.split(&units);
        file_report.chunks = chunks.len();
        tracing::info!(
            stage = %PipelineStage::Chunk,
            "[{}] {} units split into {} chunks",
            source.name,
            units.len(),
            chunks.len()
        );

        tracing::debug!(stage = %PipelineStage::Embed, "[{}] Embedding {} chunks", source.name, chunks.len());
        let embedded = self.embedder.embed_chunks(chunks, &self.stop).await?;
        file_report.embedded = embedded.embedded.len();
        report.blank_chunks_skipped += embedded.blank_skipped;
        report.dropped_chunks.extend(embedded.dropped);
        if embedded.cancelled > 0 {
            report.cancelled = true;
        }

        let records: Vec<IndexRecord> = embedded
            .embedded
            .into_iter()
            .map(|e| IndexRecord::from_chunk(&e.chunk, e.vector))
            .collect();

        tracing::debug!(stage = %PipelineStage::Upsert, "[{}] Upserting {} records", source.name, records.len());
        let counts = self.upserter.upsert(&records, &self.stop).await?;
        file_report.written = counts.written;
        report.failed_record_ids.extend(counts.failed_ids);
        report.unconfirmed_records += counts.unconfirmed;
        if counts.cancelled > 0 {
            report.cancelled = true;
        }

        tracing::info!(
            "[{}] {} chunks embedded, {} records written in {:.1}s",
            source.name,
            file_report.embedded,
            file_report.written,
            file_start.elapsed().as_secs_f64()
        );
        Ok(file_report)
    }
}
