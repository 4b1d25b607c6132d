//! Storage backend adapters
//!
//! Provides the concrete implementations of the driver and monitoring ports:
//! - Memory: in-memory storage array for standalone runs and tests
//! - Prometheus: HTTP capacity monitor for the capacity policy

pub mod memory;
pub mod prometheus;

pub use memory::*;
pub use prometheus::*;

use crate::domain::ports::CapacityMonitorRef;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Factory for creating capacity monitor adapters
pub struct MonitorFactory;

impl MonitorFactory {
    /// Create a monitor adapter by name
    pub fn create(name: &str, endpoint: Option<&str>) -> Result<CapacityMonitorRef> {
        match name.to_lowercase().as_str() {
            "prometheus" => {
                let endpoint = endpoint.ok_or_else(|| {
                    Error::Configuration("prometheus monitor requires an endpoint".into())
                })?;
                Ok(Arc::new(PrometheusMonitor::new(endpoint)?))
            }
            "memory" => Ok(Arc::new(MemoryArray::new(MemoryArrayConfig::default()))),
            _ => Err(Error::Configuration(format!(
                "unknown monitor backend: {}",
                name
            ))),
        }
    }
}
