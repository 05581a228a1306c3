//! Index provisioning: create the target index if needed and wait until it is usable

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::error::{Error, Result};
use crate::providers::VectorIndexProvider;
use crate::types::{IndexDescription, IndexSpec};

/// Result of `IndexProvisioner::ensure_index`
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub description: IndexDescription,
    /// Whether this call created the index
    pub created: bool,
}

/// Makes sure the target index exists with the configured shape
pub struct IndexProvisioner {
    provider: Arc<dyn VectorIndexProvider>,
    ready_timeout: Duration,
    poll_interval: Duration,
}

impl IndexProvisioner {
    pub fn new(provider: Arc<dyn VectorIndexProvider>, ready_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            provider,
            ready_timeout,
            poll_interval,
        }
    }

    /// Create the index when absent, otherwise verify its shape.
    ///
    /// Returns once the index reports ready. An existing index with a
    /// different dimension or metric is an `IndexMismatch` error.
    pub async fn ensure_index(&self, spec: &IndexSpec) -> Result<ProvisionOutcome> {
        let existing = self.provider.list_indexes().await?;

        if existing.iter().any(|name| name == &spec.name) {
            tracing::info!("Index '{}' already exists, verifying shape", spec.name);
            let description = self.provider.describe_index(&spec.name).await?;
            Self::verify(&description, spec)?;

            let description = if description.ready {
                description
            } else {
                self.wait_until_ready(&spec.name).await?
            };
            return Ok(ProvisionOutcome {
                description,
                created: false,
            });
        }

        tracing::info!(
            "Creating index '{}' (dimension {}, metric {}) on {}",
            spec.name,
            spec.dimension,
            spec.metric,
            self.provider.name()
        );
        self.provider.create_index(spec).await?;

        let description = self.wait_until_ready(&spec.name).await?;
        Self::verify(&description, spec)?;
        tracing::info!("Index '{}' is ready", spec.name);

        Ok(ProvisionOutcome {
            description,
            created: true,
        })
    }

    fn verify(description: &IndexDescription, spec: &IndexSpec) -> Result<()> {
        if description.matches(spec) {
            return Ok(());
        }
        Err(Error::IndexMismatch {
            name: spec.name.clone(),
            expected_dimension: spec.dimension,
            actual_dimension: description.dimension,
            expected_metric: spec.metric.to_string(),
            actual_metric: description.metric.to_string(),
        })
    }

    /// Poll `describe_index` until ready or the timeout elapses
    async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        let deadline = Instant::now() + self.ready_timeout;

        loop {
            match self.provider.describe_index(name).await {
                Ok(description) if description.ready => return Ok(description),
                Ok(_) => tracing::debug!("Index '{}' still initializing", name),
                Err(e) if e.is_fatal() => return Err(e),
                // Freshly created indexes can briefly 404 on describe
                Err(e) => tracing::debug!("Describe of '{}' failed while waiting: {}", name, e),
            }

            if Instant::now() >= deadline {
                return Err(Error::vector_db(format!(
                    "index '{}' not ready after {:?}",
                    name, self.ready_timeout
                )));
            }
            sleep(self.poll_interval).await;
        }
    }
}
