//! Batched, idempotent writes into the vector index

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::Result;
use crate::providers::VectorIndexProvider;
use crate::types::IndexRecord;

/// Counts from writing one file's records
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpsertCounts {
    pub written: usize,
    pub failed: usize,
    /// Ids of records in batches that failed every attempt
    pub failed_ids: Vec<String>,
    /// Records the service did not acknowledge in an otherwise successful batch
    pub unconfirmed: usize,
    /// Records not attempted because the run was stopped
    pub cancelled: usize,
}

/// Writes records in fixed-size batches, retrying each failed batch
pub struct UpsertClient {
    provider: Arc<dyn VectorIndexProvider>,
    index_name: String,
    batch_size: usize,
    retries: u32,
    retry_delay: Duration,
}

impl UpsertClient {
    pub fn new(
        provider: Arc<dyn VectorIndexProvider>,
        index_name: impl Into<String>,
        batch_size: usize,
        retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            provider,
            index_name: index_name.into(),
            batch_size: batch_size.max(1),
            retries,
            retry_delay,
        }
    }

    /// Upsert all records. A batch that keeps failing is reported in the
    /// counts; only fatal errors (rejected credentials) abort.
    pub async fn upsert(&self, records: &[IndexRecord], stop: &AtomicBool) -> Result<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        let total_batches = records.len().div_ceil(self.batch_size);

        for (i, batch) in records.chunks(self.batch_size).enumerate() {
            if stop.load(Ordering::Acquire) {
                counts.cancelled += batch.len();
                continue;
            }

            match self.upsert_batch(batch).await {
                Ok(accepted) => {
                    let accepted = accepted.min(batch.len());
                    let shortfall = batch.len() - accepted;
                    if shortfall > 0 {
                        // The service does not say which records it skipped
                        tracing::warn!(
                            "Upsert batch {}/{}: {} accepted {} of {} records",
                            i + 1,
                            total_batches,
                            self.provider.name(),
                            accepted,
                            batch.len()
                        );
                        counts.failed += shortfall;
                        counts.unconfirmed += shortfall;
                    }
                    counts.written += accepted;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(
                        "Upsert batch {}/{} failed after {} attempts: {}",
                        i + 1,
                        total_batches,
                        self.retries + 1,
                        e
                    );
                    counts.failed += batch.len();
                    counts.failed_ids.extend(batch.iter().map(|r| r.id.clone()));
                }
            }
        }

        Ok(counts)
    }

    async fn upsert_batch(&self, batch: &[IndexRecord]) -> Result<usize> {
        let mut attempt = 0u32;
        loop {
            match self.provider.upsert(&self.index_name, batch).await {
                Ok(accepted) => return Ok(accepted),
                Err(e) if !e.is_fatal() && attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!("Upsert of {} records failed, retrying: {}", batch.len(), e);
                    sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
