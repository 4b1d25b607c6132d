//! Prometheus Capacity Monitor
//!
//! Queries a Prometheus-compatible endpoint for each storage server's
//! disk-space-to-CPU-load ratio. Only used under the `capacity`
//! load-balancing policy.

use crate::domain::ports::{CapacityMonitor, StorageKind, StorageServer};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Query template; `{kind}` is substituted with the storage kind label
const RATIO_QUERY: &str =
    "lab_storage_disk_free_bytes{kind=\"{kind}\"} / lab_storage_cpu_load{kind=\"{kind}\"}";

// =============================================================================
// Response Shape
// =============================================================================

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QuerySample>,
}

#[derive(Debug, Deserialize)]
struct QuerySample {
    metric: SampleMetric,
    /// [timestamp, "value"]
    value: (f64, String),
}

#[derive(Debug, Deserialize)]
struct SampleMetric {
    instance: String,
}

// =============================================================================
// Prometheus Monitor
// =============================================================================

/// HTTP capacity monitor against a Prometheus query endpoint
pub struct PrometheusMonitor {
    client: reqwest::Client,
    base_url: String,
}

impl PrometheusMonitor {
    /// Create a monitor for an endpoint like `http://monitor:9090`
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Turn a query response into a best-first server ranking
fn rank_servers(response: QueryResponse, kind: StorageKind) -> Result<Vec<StorageServer>> {
    if response.status != "success" {
        return Err(Error::MonitoringQuery(format!(
            "query returned status {}",
            response.status
        )));
    }
    let data = response
        .data
        .ok_or_else(|| Error::MonitoringResponseParse("missing data field".into()))?;

    let mut servers = Vec::with_capacity(data.result.len());
    for sample in data.result {
        let ratio: f64 = sample.value.1.parse().map_err(|_| {
            Error::MonitoringResponseParse(format!("non-numeric sample: {}", sample.value.1))
        })?;
        // instance carries the exporter port; the address is what we keep
        let address = sample
            .metric
            .instance
            .split(':')
            .next()
            .unwrap_or(&sample.metric.instance)
            .to_string();
        servers.push(StorageServer {
            address,
            kind,
            available_ratio: Some(ratio),
        });
    }
    servers.sort_by(|a, b| {
        b.available_ratio
            .partial_cmp(&a.available_ratio)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(servers)
}

#[async_trait]
impl CapacityMonitor for PrometheusMonitor {
    async fn servers_by_disk_space_to_cpu_ratio(
        &self,
        kind: StorageKind,
    ) -> Result<Vec<StorageServer>> {
        let query = RATIO_QUERY.replace("{kind}", &kind.to_string());
        debug!("querying {} for: {}", self.base_url, query);

        let response: QueryResponse = self
            .client
            .get(format!("{}/api/v1/query", self.base_url))
            .query(&[("query", query.as_str())])
            .send()
            .await?
            .json()
            .await?;

        rank_servers(response, kind)
    }
}
