//! Pinecone vector index provider
//!
//! Uses the environment-scoped control plane for index management and the
//! per-index data plane host for upserts.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::providers::vector_index::VectorIndexProvider;
use crate::types::{IndexDescription, IndexRecord, IndexSpec, Metric};

/// Pinecone index provider
pub struct PineconeIndex {
    client: Client,
    /// Control plane base URL, e.g. `https://controller.us-west1-gcp.pinecone.io`
    controller_url: String,
    namespace: Option<String>,
    /// Data plane host per index, filled from `describe_index`
    hosts: DashMap<String, String>,
}

impl PineconeIndex {
    /// Create a new Pinecone provider
    ///
    /// # Arguments
    /// * `api_key` - Value for the `Api-Key` header
    /// * `controller_url` - Control plane base URL
    /// * `namespace` - Namespace records are written into
    /// * `timeout` - Per-request timeout
    pub fn new(
        api_key: &str,
        controller_url: String,
        namespace: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("missing index service API key".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|_| Error::Config("index API key is not a valid header value".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            controller_url: controller_url.trim_end_matches('/').to_string(),
            namespace,
            hosts: DashMap::new(),
        })
    }

    fn databases_url(&self) -> String {
        format!("{}/databases", self.controller_url)
    }

    /// Turn a non-success response into an `Upstream` error
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(Error::Upstream {
            service: "index service",
            status: status.as_u16(),
            message: body,
        })
    }

    /// Data plane host for an index, described on first use
    async fn host_for(&self, index_name: &str) -> Result<String> {
        if let Some(host) = self.hosts.get(index_name) {
            return Ok(host.value().clone());
        }
        let description = self.describe_index(index_name).await?;
        description.host.ok_or_else(|| {
            Error::vector_db(format!("index '{}' has no data plane host yet", index_name))
        })
    }

    fn upsert_url(host: &str) -> String {
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}/vectors/upsert", host.trim_end_matches('/'))
        } else {
            format!("https://{}/vectors/upsert", host)
        }
    }
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: Metric,
}

#[derive(Deserialize)]
struct DescribeResponse {
    database: DatabaseInfo,
    #[serde(default)]
    status: Option<DatabaseStatus>,
}

#[derive(Deserialize)]
struct DatabaseInfo {
    name: String,
    dimension: usize,
    /// Required: an index whose metric is unknown cannot be verified
    metric: Metric,
}

#[derive(Deserialize)]
struct DatabaseStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    host: Option<String>,
}

impl From<DescribeResponse> for IndexDescription {
    fn from(resp: DescribeResponse) -> Self {
        let (ready, host) = match resp.status {
            Some(status) => (status.ready, status.host.filter(|h| !h.is_empty())),
            None => (false, None),
        };
        IndexDescription {
            name: resp.database.name,
            dimension: resp.database.dimension,
            metric: resp.database.metric,
            host,
            ready,
        }
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<Vector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
struct Vector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[async_trait]
impl VectorIndexProvider for PineconeIndex {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        let response = self.client.get(self.databases_url()).send().await?;
        let names: Vec<String> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::vector_db(format!("Failed to parse index list: {}", e)))?;
        Ok(names)
    }

    async fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let url = format!("{}/{}", self.databases_url(), name);
        let response = self.client.get(url).send().await?;
        let parsed: DescribeResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::vector_db(format!("Failed to parse index description: {}", e)))?;

        let description = IndexDescription::from(parsed);
        if let Some(host) = &description.host {
            self.hosts.insert(name.to_string(), host.clone());
        }
        Ok(description)
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let request = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric,
        };
        let response = self
            .client
            .post(self.databases_url())
            .json(&request)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upsert(&self, index_name: &str, records: &[IndexRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let host = self.host_for(index_name).await?;
        let request = UpsertRequest {
            vectors: records
                .iter()
                .map(|r| Vector {
                    id: &r.id,
                    values: &r.values.values,
                    metadata: &r.metadata,
                })
                .collect(),
            namespace: self.namespace.as_deref(),
        };

        let response = self
            .client
            .post(Self::upsert_url(&host))
            .json(&request)
            .send()
            .await?;
        let parsed: UpsertResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::vector_db(format!("Failed to parse upsert response: {}", e)))?;

        Ok(parsed.upserted_count)
    }

    fn name(&self) -> &str {
        "pinecone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_response_parsing() {
        let parsed: DescribeResponse = serde_json::from_str(
            r#"{
                "database": {"name": "vizum", "metric": "cosine", "dimension": 1536, "pods": 1},
                "status": {"ready": true, "state": "Ready", "host": "vizum-abc.svc.us-west1-gcp.pinecone.io", "port": 433}
            }"#,
        )
        .unwrap();

        let desc = IndexDescription::from(parsed);
        assert_eq!(desc.name, "vizum");
        assert_eq!(desc.dimension, 1536);
        assert_eq!(desc.metric, Metric::Cosine);
        assert!(desc.ready);
        assert_eq!(desc.host.as_deref(), Some("vizum-abc.svc.us-west1-gcp.pinecone.io"));
    }

    #[test]
    fn test_describe_while_initializing() {
        let parsed: DescribeResponse = serde_json::from_str(
            r#"{"database": {"name": "vizum", "metric": "dotproduct", "dimension": 768},
                "status": {"ready": false, "state": "Initializing", "host": ""}}"#,
        )
        .unwrap();

        let desc = IndexDescription::from(parsed);
        assert!(!desc.ready);
        assert_eq!(desc.host, None);
        assert_eq!(desc.metric, Metric::DotProduct);
    }

    #[test]
    fn test_describe_without_metric_is_rejected() {
        let parsed = serde_json::from_str::<DescribeResponse>(
            r#"{"database": {"name": "vizum", "dimension": 1536},
                "status": {"ready": true, "host": "vizum-abc.svc.pinecone.io"}}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_upsert_url() {
        assert_eq!(
            PineconeIndex::upsert_url("vizum-abc.svc.pinecone.io"),
            "https://vizum-abc.svc.pinecone.io/vectors/upsert"
        );
        assert_eq!(
            PineconeIndex::upsert_url("http://localhost:5080/"),
            "http://localhost:5080/vectors/upsert"
        );
    }
}
