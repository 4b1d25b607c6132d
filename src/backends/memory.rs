//! In-Memory Storage Array Adapter
//!
//! A self-contained storage array implementing both ports, used by the
//! binary's standalone mode and throughout the test suite. State lives in
//! guarded maps; nothing touches the filesystem or the network.
//!
//! Test hooks: operations can be made to fail by name, stale host groups can
//! be seeded, and every removal attempt is recorded in an operation log.

use crate::domain::ports::{
    CapacityMonitor, DeviceDriver, LunInfo, StorageKind, StorageServer, VendorQuirk,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the in-memory array
#[derive(Debug, Clone)]
pub struct MemoryArrayConfig {
    /// Array name, used in generated target names
    pub name: String,
    /// Vendor quirk the array emulates
    pub quirk: VendorQuirk,
}

impl Default for MemoryArrayConfig {
    fn default() -> Self {
        Self {
            name: "memory-array".to_string(),
            quirk: VendorQuirk::Generic,
        }
    }
}

// =============================================================================
// Internal State
// =============================================================================

#[derive(Debug, Clone)]
struct NasExport {
    server: String,
    path: String,
    fs_type: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
struct LunState {
    lun_id: String,
    target: String,
    capacity: String,
    host_groups: Vec<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default)]
struct ArrayState {
    nas_exports: BTreeMap<String, NasExport>,
    luns: BTreeMap<String, LunState>,
    /// host group -> member initiators
    host_groups: BTreeMap<String, Vec<String>>,
    local_paths: BTreeSet<String>,
    /// rankings served through the CapacityMonitor port
    rankings: BTreeMap<StorageKind, Vec<StorageServer>>,
    /// operations forced to fail, by name
    fail_ops: BTreeSet<String>,
    /// every removal/unmap attempt, in order
    removal_log: Vec<String>,
    lun_counter: u64,
}

// =============================================================================
// Memory Array
// =============================================================================

/// In-memory storage array
pub struct MemoryArray {
    config: MemoryArrayConfig,
    state: RwLock<ArrayState>,
}

impl MemoryArray {
    /// Create a new array
    pub fn new(config: MemoryArrayConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ArrayState::default()),
        }
    }

    /// Host-group name as the array actually stores it
    fn real_group(&self, group: &str) -> String {
        match self.config.quirk {
            VendorQuirk::Generic => group.to_string(),
            VendorQuirk::HostGroupSuffix => format!("{}_hg", group),
        }
    }

    fn injected(state: &ArrayState, op: &str) -> Result<()> {
        if state.fail_ops.contains(op) {
            return Err(Error::Internal(format!("injected failure: {}", op)));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Test / standalone hooks
    // -------------------------------------------------------------------------

    /// Force an operation to fail by name
    pub async fn fail_on(&self, op: &str) {
        self.state.write().await.fail_ops.insert(op.to_string());
    }

    /// Pre-populate a host group, emulating leftovers from an earlier run
    pub async fn seed_host_group(&self, group: &str, initiators: &[String]) {
        self.state
            .write()
            .await
            .host_groups
            .insert(group.to_string(), initiators.to_vec());
    }

    /// Serve a capacity ranking for a kind through the monitor port
    pub async fn set_capacity_ranking(&self, kind: StorageKind, ranked: Vec<(String, f64)>) {
        let servers = ranked
            .into_iter()
            .map(|(address, ratio)| StorageServer {
                address,
                kind,
                available_ratio: Some(ratio),
            })
            .collect();
        self.state.write().await.rankings.insert(kind, servers);
    }

    /// Number of live NAS exports
    pub async fn nas_export_count(&self) -> usize {
        self.state.read().await.nas_exports.len()
    }

    /// Ids of live LUNs
    pub async fn lun_ids(&self) -> Vec<String> {
        self.state.read().await.luns.keys().cloned().collect()
    }

    /// Host groups an initiator is currently a member of
    pub async fn initiator_groups(&self, initiator: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .host_groups
            .iter()
            .filter(|(_, members)| members.iter().any(|m| m == initiator))
            .map(|(group, _)| group.clone())
            .collect()
    }

    /// Whether a local path exists
    pub async fn local_path_exists(&self, path: &str) -> bool {
        self.state.read().await.local_paths.contains(path)
    }

    /// Every removal/unmap attempt so far, in order
    pub async fn removal_log(&self) -> Vec<String> {
        self.state.read().await.removal_log.clone()
    }
}

#[async_trait]
impl DeviceDriver for MemoryArray {
    async fn create_nas_device(&self, server: &str, name: &str, fs_type: &str) -> Result<String> {
        let mut state = self.state.write().await;
        Self::injected(&state, "create_nas_device")?;
        let path = format!("/exports/{}/{}", fs_type, name);
        let key = format!("{}:{}", server, path);
        state.nas_exports.insert(
            key,
            NasExport {
                server: server.to_string(),
                path: path.clone(),
                fs_type: fs_type.to_string(),
                created_at: chrono::Utc::now(),
            },
        );
        debug!("created {} export {} on {}", fs_type, path, server);
        Ok(path)
    }

    async fn remove_nas_device(&self, server: &str, path: &str, fs_type: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.removal_log.push(format!("nas:{}", path));
        Self::injected(&state, "remove_nas_device")?;
        let key = format!("{}:{}", server, path);
        let export = state
            .nas_exports
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::DeviceRemoval {
                device: key.clone(),
                reason: "export not found".into(),
            })?;
        if export.fs_type != fs_type {
            return Err(Error::DeviceRemoval {
                device: key,
                reason: format!("export is {}, not {}", export.fs_type, fs_type),
            });
        }
        debug!(
            "removing {} export {} from {}, created {}",
            export.fs_type, export.path, export.server, export.created_at
        );
        state.nas_exports.remove(&key);
        Ok(())
    }

    async fn create_lun(&self, name: &str, capacity: &str) -> Result<(String, String)> {
        let mut state = self.state.write().await;
        Self::injected(&state, "create_lun")?;
        let lun_id = state.lun_counter.to_string();
        state.lun_counter += 1;
        let target = format!("iqn.2026-01.lab.{}:{}", self.config.name, name);
        state.luns.insert(
            lun_id.clone(),
            LunState {
                lun_id: lun_id.clone(),
                target: target.clone(),
                capacity: capacity.to_string(),
                host_groups: Vec::new(),
                created_at: chrono::Utc::now(),
            },
        );
        debug!("created LUN {} ({} GiB) on {}", lun_id, capacity, target);
        Ok((lun_id, target))
    }

    async fn get_initiator_host_groups(&self, initiator: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Self::injected(&state, "get_initiator_host_groups")?;
        Ok(state
            .host_groups
            .iter()
            .filter(|(_, members)| members.iter().any(|m| m == initiator))
            .map(|(group, _)| group.clone())
            .collect())
    }

    async fn unmap_initiator(&self, group: &str, initiator: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.removal_log.push(format!("unmap:{}:{}", group, initiator));
        Self::injected(&state, "unmap_initiator")?;
        if let Some(members) = state.host_groups.get_mut(group) {
            members.retain(|m| m != initiator);
            if members.is_empty() {
                state.host_groups.remove(group);
            }
        }
        Ok(())
    }

    async fn map_lun(&self, lun_id: &str, group: &str, initiators: &[String]) -> Result<()> {
        let real_group = self.real_group(group);
        let mut state = self.state.write().await;
        Self::injected(&state, "map_lun")?;
        if !state.luns.contains_key(lun_id) {
            return Err(Error::LunNotFound {
                lun_id: lun_id.to_string(),
            });
        }
        let members = state.host_groups.entry(real_group.clone()).or_default();
        for initiator in initiators {
            if !members.iter().any(|m| m == initiator) {
                members.push(initiator.clone());
            }
        }
        if let Some(lun) = state.luns.get_mut(lun_id) {
            if !lun.host_groups.contains(&real_group) {
                lun.host_groups.push(real_group);
            }
        }
        Ok(())
    }

    async fn get_lun(&self, lun_id: &str) -> Result<LunInfo> {
        let state = self.state.read().await;
        Self::injected(&state, "get_lun")?;
        let lun = state.luns.get(lun_id).ok_or_else(|| Error::LunNotFound {
            lun_id: lun_id.to_string(),
        })?;
        Ok(LunInfo {
            lun_id: lun.lun_id.clone(),
            target: lun.target.clone(),
            serial: Some(format!("{}-{}", self.config.name, lun.lun_id)),
            host_groups: lun.host_groups.clone(),
        })
    }

    async fn remove_lun(&self, lun_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.removal_log.push(format!("lun:{}", lun_id));
        Self::injected(&state, "remove_lun")?;
        match state.luns.remove(lun_id) {
            Some(lun) => {
                debug!(
                    "removed LUN {} ({} GiB), created {}",
                    lun.lun_id, lun.capacity, lun.created_at
                );
                Ok(())
            }
            None => Err(Error::LunNotFound {
                lun_id: lun_id.to_string(),
            }),
        }
    }

    async fn create_local_storage(&self, path: &str) -> Result<()> {
        let mut state = self.state.write().await;
        Self::injected(&state, "create_local_storage")?;
        if state.fail_ops.contains("create_local_storage_exists")
            || state.local_paths.contains(path)
        {
            return Err(Error::FileAlreadyExists {
                path: path.to_string(),
            });
        }
        state.local_paths.insert(path.to_string());
        Ok(())
    }

    async fn remove_local_storage(&self, path: &str, force: bool) -> Result<()> {
        let mut state = self.state.write().await;
        state.removal_log.push(format!("local:{}", path));
        Self::injected(&state, "remove_local_storage")?;
        if !state.local_paths.remove(path) && !force {
            return Err(Error::DeviceRemoval {
                device: path.to_string(),
                reason: "path not found".into(),
            });
        }
        Ok(())
    }

    fn driver_name(&self) -> &str {
        &self.config.name
    }

    fn quirk(&self) -> VendorQuirk {
        self.config.quirk
    }
}

#[async_trait]
impl CapacityMonitor for MemoryArray {
    async fn servers_by_disk_space_to_cpu_ratio(
        &self,
        kind: StorageKind,
    ) -> Result<Vec<StorageServer>> {
        let state = self.state.read().await;
        Self::injected(&state, "servers_by_disk_space_to_cpu_ratio")?;
        let mut ranked = state.rankings.get(&kind).cloned().unwrap_or_default();
        ranked.sort_by(|a, b| {
            b.available_ratio
                .partial_cmp(&a.available_ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(ranked)
    }
}
