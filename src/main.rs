//! Storage Provisioner CLI
//!
//! Loads the shared configuration store, allocates the requested storage
//! devices across the configured server pools, writes the resulting topology
//! back into the store for downstream test fixtures, and optionally tears
//! everything down again at the end of the run.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storage_provisioner::{
    CleanupCoordinator, ConfigStore, ConfigSynchronizer, DevicePoolAllocator,
    LoadBalancingPolicy, MemoryArray, MemoryArrayConfig, MonitorFactory, ProvisionerSettings,
    Result, ServerSelector, StorageSection,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Storage Provisioner - allocate lab storage and publish it to the config store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the shared YAML configuration store
    #[arg(long, env = "STORAGE_CONF", default_value = "storage_conf.yaml")]
    config: PathBuf,

    /// Monitor backend for the capacity policy (prometheus, memory)
    #[arg(long, env = "MONITOR_BACKEND", default_value = "memory")]
    monitor: String,

    /// Monitoring endpoint, e.g. http://monitor:9090
    #[arg(long, env = "MONITOR_URL")]
    monitor_url: Option<String>,

    /// Tear down every provisioned device at the end of the run
    #[arg(long, env = "TEARDOWN")]
    teardown: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting storage provisioner");
    info!("  Version: {}", storage_provisioner::VERSION);
    info!("  Config store: {}", args.config.display());
    info!("  Teardown: {}", args.teardown);

    let mut store = ConfigStore::load(&args.config)?;
    let settings = ProvisionerSettings::from_store(&store)?;
    let sections = StorageSection::parse_all(&store)?;

    info!(
        "  Policy: {}, {} section(s) configured",
        settings.policy,
        sections.len()
    );

    // The in-memory array stands in for the vendor storage manager; real
    // drivers plug in behind the same DeviceDriver port.
    let driver = Arc::new(MemoryArray::new(MemoryArrayConfig {
        quirk: settings.vendor_quirk,
        ..Default::default()
    }));

    let monitor = match settings.policy {
        LoadBalancingPolicy::Capacity => {
            Some(MonitorFactory::create(&args.monitor, args.monitor_url.as_deref())?)
        }
        _ => None,
    };

    let selector = ServerSelector::new(settings.policy, monitor);
    let mut allocator = DevicePoolAllocator::new(driver.clone(), selector, settings.clone());

    let allocation = allocator.allocate_all(&sections).await;
    let mut table = allocator.into_table();

    match &allocation {
        Ok(()) => {
            info!("allocated {} device(s)", table.device_count());
            ConfigSynchronizer::sync_all(&mut store, &table)?;
            store.save(&args.config)?;
            info!("topology written back to {}", args.config.display());
        }
        Err(e) => {
            // devices recorded before the abort still get torn down below
            error!("allocation aborted: {}", e);
        }
    }

    if args.teardown || allocation.is_err() {
        let report = CleanupCoordinator::new(driver, settings)
            .cleanup_all(&mut table)
            .await;
        if !report.is_clean() {
            for failure in &report.failures {
                warn!("leftover device {}: {}", failure.device, failure.error);
            }
        }
    }

    allocation
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
