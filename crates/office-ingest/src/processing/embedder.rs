//! Chunk embedding with bounded concurrency and per-chunk failure isolation

use futures::future::try_join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::types::{record_id, Chunk, DroppedChunk, EmbeddingVector};

use super::retry::RetryPolicy;

/// A chunk paired with its vector
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: EmbeddingVector,
}

/// Result of embedding one file's chunks
#[derive(Debug, Default)]
pub struct EmbedOutcome {
    /// Embedded chunks, in input order
    pub embedded: Vec<EmbeddedChunk>,
    /// Chunks whose embedding failed after retries
    pub dropped: Vec<DroppedChunk>,
    /// Whitespace-only chunks that were never submitted
    pub blank_skipped: usize,
    /// Chunks not attempted because the run was stopped
    pub cancelled: usize,
}

#[derive(Default)]
struct BatchOutcome {
    embedded: Vec<EmbeddedChunk>,
    dropped: Vec<DroppedChunk>,
    cancelled: usize,
}

/// Embeds chunks through an `EmbeddingProvider`
pub struct ChunkEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    batch_size: usize,
    parallelism: usize,
    expected_dimension: usize,
}

impl ChunkEmbedder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        retry: RetryPolicy,
        batch_size: usize,
        parallelism: usize,
        expected_dimension: usize,
    ) -> Self {
        Self {
            provider,
            retry,
            batch_size: batch_size.max(1),
            parallelism: parallelism.max(1),
            expected_dimension,
        }
    }

    /// Embed all chunks. Only fatal errors (dimension mismatch, rejected
    /// credentials) are returned; anything else drops the affected chunks.
    pub async fn embed_chunks(&self, chunks: Vec<Chunk>, stop: &AtomicBool) -> Result<EmbedOutcome> {
        let (blank, chunks): (Vec<Chunk>, Vec<Chunk>) = chunks.into_iter().partition(Chunk::is_blank);

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let batches: Vec<Vec<Chunk>> = chunks.chunks(self.batch_size).map(<[Chunk]>::to_vec).collect();
        let total_batches = batches.len();

        let futures = batches.into_iter().enumerate().map(|(i, batch)| {
            let sem = Arc::clone(&semaphore);
            async move {
                let _permit = sem
                    .acquire()
                    .await
                    .map_err(|_| Error::internal("embedding semaphore closed"))?;

                if stop.load(Ordering::Acquire) {
                    return Ok(BatchOutcome {
                        cancelled: batch.len(),
                        ..Default::default()
                    });
                }

                tracing::debug!("Embedding batch {}/{} ({} chunks)", i + 1, total_batches, batch.len());
                self.embed_batch(batch, stop).await
            }
        });

        let mut outcome = EmbedOutcome {
            blank_skipped: blank.len(),
            ..Default::default()
        };
        for batch in try_join_all(futures).await? {
            outcome.embedded.extend(batch.embedded);
            outcome.dropped.extend(batch.dropped);
            outcome.cancelled += batch.cancelled;
        }
        Ok(outcome)
    }

    async fn embed_batch(&self, batch: Vec<Chunk>, stop: &AtomicBool) -> Result<BatchOutcome> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

        let result = self
            .retry
            .run("Embedding batch", || self.provider.embed_batch(&texts))
            .await
            .and_then(|vectors| {
                if vectors.len() == batch.len() {
                    Ok(vectors)
                } else {
                    Err(Error::embedding(format!(
                        "{} returned {} embeddings for {} inputs",
                        self.provider.name(),
                        vectors.len(),
                        batch.len()
                    )))
                }
            });

        match result {
            Ok(vectors) => {
                let mut embedded = Vec::with_capacity(batch.len());
                for (chunk, vector) in batch.into_iter().zip(vectors) {
                    self.check_dimension(&vector)?;
                    embedded.push(EmbeddedChunk { chunk, vector });
                }
                Ok(BatchOutcome {
                    embedded,
                    ..Default::default()
                })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) if batch.len() == 1 => {
                let mut outcome = BatchOutcome::default();
                for chunk in batch {
                    outcome.dropped.push(Self::drop_chunk(&chunk, &e));
                }
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(
                    "Embedding batch of {} failed ({}), retrying chunks individually",
                    batch.len(),
                    e
                );
                self.embed_individually(batch, stop).await
            }
        }
    }

    async fn embed_individually(&self, batch: Vec<Chunk>, stop: &AtomicBool) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for chunk in batch {
            if stop.load(Ordering::Acquire) {
                outcome.cancelled += 1;
                continue;
            }
            match self.retry.run("Embedding", || self.provider.embed(&chunk.text)).await {
                Ok(vector) => {
                    self.check_dimension(&vector)?;
                    outcome.embedded.push(EmbeddedChunk { chunk, vector });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => outcome.dropped.push(Self::drop_chunk(&chunk, &e)),
            }
        }
        Ok(outcome)
    }

    fn check_dimension(&self, vector: &EmbeddingVector) -> Result<()> {
        if vector.dimension() != self.expected_dimension {
            return Err(Error::DimensionMismatch {
                expected: self.expected_dimension,
                actual: vector.dimension(),
            });
        }
        Ok(())
    }

    fn drop_chunk(chunk: &Chunk, error: &Error) -> DroppedChunk {
        let id = record_id(&chunk.parent.source, chunk.parent.unit_index, chunk.sequence_index);
        tracing::warn!(
            "[{}] Dropping chunk {} of unit {}: {}",
            chunk.filename(),
            chunk.sequence_index,
            chunk.parent.unit_index,
            error
        );
        DroppedChunk {
            id,
            file: chunk.filename().to_string(),
            reason: error.to_string(),
        }
    }
}
