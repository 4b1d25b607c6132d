//! Storage Provisioner - Test-Lab Storage Resource Management
//!
//! Allocates storage backends of heterogeneous kinds (NAS shares, block LUNs,
//! local paths, ISO/export domains) across a pool of physical storage servers,
//! choosing servers via a pluggable load-balancing policy, and persists the
//! resulting topology into a shared configuration store consumed by the rest
//! of the test suite.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Device Pool Allocator                      │
//! │   ┌──────────────────┐   ┌───────────────────────────────────┐   │
//! │   │  Server Selector │   │       Allocation Table            │   │
//! │   │ capacity|random  │   │  (section → [Device], ordered)    │   │
//! │   └────────┬─────────┘   └────────┬───────────────┬──────────┘   │
//! │            │                      │               │              │
//! │  ┌─────────┴────────┐   ┌─────────┴───────┐ ┌─────┴───────────┐  │
//! │  │ Capacity Monitor │   │ Config          │ │ Cleanup         │  │
//! │  │ (Prometheus)     │   │ Synchronizer    │ │ Coordinator     │  │
//! │  └──────────────────┘   └─────────────────┘ └─────────────────┘  │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                        Device Driver Port                        │
//! │        NAS exports  │  block LUNs + host groups  │  local paths  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`]: shared config store and section parsing
//! - [`domain`]: core data model and port traits
//! - [`provision`]: selector, allocator, synchronizer and cleanup engines
//! - [`backends`]: driver and monitor adapters
//! - [`error`]: error types and handling

pub mod backends;
pub mod config;
pub mod domain;
pub mod error;
pub mod provision;

// Re-export commonly used types
pub use config::{
    ConfigStore, ConfigValue, LoadBalancingPolicy, ProvisionerSettings, SectionPath,
    StorageSection,
};

pub use domain::ports::{
    CapacityMonitor, CapacityMonitorRef, Device, DeviceDriver, DeviceDriverRef, DeviceFamily,
    InitiatorMapping, LunInfo, StorageKind, StorageServer, VendorQuirk,
};

pub use provision::{
    AllocationTable, CleanupCoordinator, CleanupReport, ConfigSynchronizer, DevicePoolAllocator,
    SectionEntry, ServerCache, ServerSelector, SyncMode,
};

pub use backends::{MemoryArray, MemoryArrayConfig, MonitorFactory, PrometheusMonitor};

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
