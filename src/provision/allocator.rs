//! Device Pool Allocator
//!
//! Walks the configured storage sections, resolves a server for each via the
//! [`ServerSelector`], provisions the requested number of devices through the
//! [`DeviceDriver`](crate::domain::ports::DeviceDriver) and accumulates the
//! results in an [`AllocationTable`] in creation order.
//!
//! Error policy: a selection failure is fatal for that kind's sections only
//! (logged, run continues); a provisioning failure aborts the remaining
//! allocation, leaving already-recorded devices in the table so cleanup can
//! still walk them.

use super::selector::ServerSelector;
use crate::config::sections::{ProvisionerSettings, StorageSection};
use crate::domain::ports::{
    Device, DeviceDriverRef, DeviceFamily, InitiatorMapping, StorageKind, VendorQuirk,
};
use crate::error::{Error, Result};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Capacity used for block sections that carry no capacity hint (GiB)
const DEFAULT_BLOCK_CAPACITY: &str = "10";

// =============================================================================
// Allocation Table
// =============================================================================

/// Devices provisioned for one section, in creation order
#[derive(Debug, Clone)]
pub struct SectionEntry {
    /// The section these devices belong to
    pub section: StorageSection,
    /// Ordered devices; insertion order = creation order
    pub devices: Vec<Device>,
}

/// Ordered table of everything the allocator created
///
/// Positions matter: cleanup and config synchronization index devices
/// positionally against their section.
#[derive(Debug, Clone, Default)]
pub struct AllocationTable {
    entries: Vec<SectionEntry>,
}

impl AllocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a section, returning its index for device pushes
    pub fn insert_section(&mut self, section: StorageSection) -> usize {
        self.entries.push(SectionEntry {
            section,
            devices: Vec::new(),
        });
        self.entries.len() - 1
    }

    /// Append a device to a registered section
    pub fn push_device(&mut self, index: usize, device: Device) {
        self.entries[index].devices.push(device);
    }

    /// All section entries in allocation order
    pub fn entries(&self) -> &[SectionEntry] {
        &self.entries
    }

    /// Mutable access for cleanup
    pub fn entries_mut(&mut self) -> &mut [SectionEntry] {
        &mut self.entries
    }

    /// Devices for a section identified by its target path ("Group.key")
    pub fn devices_for(&self, target: &str) -> Option<&[Device]> {
        self.entries
            .iter()
            .find(|entry| entry.section.target.to_string() == target)
            .map(|entry| entry.devices.as_slice())
    }

    /// Total number of devices across all sections
    pub fn device_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.devices.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|entry| entry.devices.is_empty())
    }
}

// =============================================================================
// Device Pool Allocator
// =============================================================================

/// Provisions device pools for every configured section
pub struct DevicePoolAllocator {
    driver: DeviceDriverRef,
    selector: ServerSelector,
    settings: ProvisionerSettings,
    table: AllocationTable,
}

impl DevicePoolAllocator {
    /// Create an allocator over a driver and selector
    pub fn new(
        driver: DeviceDriverRef,
        selector: ServerSelector,
        settings: ProvisionerSettings,
    ) -> Self {
        Self {
            driver,
            selector,
            settings,
            table: AllocationTable::new(),
        }
    }

    /// Everything allocated so far
    pub fn table(&self) -> &AllocationTable {
        &self.table
    }

    /// Consume the allocator, handing the table to sync/cleanup
    pub fn into_table(self) -> AllocationTable {
        self.table
    }

    /// Allocate every configured section's devices
    ///
    /// Sections with a zero count are skipped. A kind whose server selection
    /// fails is skipped entirely; a device provisioning failure propagates
    /// and aborts the remaining allocation.
    pub async fn allocate_all(&mut self, sections: &[StorageSection]) -> Result<()> {
        let mut skipped_kinds: HashSet<StorageKind> = HashSet::new();

        for section in sections {
            if section.requested == 0 {
                debug!("section {} requests no devices, skipping", section.name);
                continue;
            }
            if skipped_kinds.contains(&section.kind) {
                warn!(
                    "skipping section {}: kind {} already failed selection",
                    section.name, section.kind
                );
                continue;
            }

            let server = match self.resolve_server(section).await {
                Ok(Some(address)) => address,
                Ok(None) => {
                    warn!(
                        "no server available for {} section {}, skipping",
                        section.kind, section.name
                    );
                    continue;
                }
                Err(e) if e.is_selection() => {
                    warn!(
                        "server selection failed for kind {}: {}, skipping its sections",
                        section.kind, e
                    );
                    skipped_kinds.insert(section.kind);
                    continue;
                }
                Err(e) => return Err(e),
            };

            info!(
                "allocating {} {} device(s) for section {} on {}",
                section.requested, section.kind, section.name, server
            );

            let index = self.table.insert_section(section.clone());
            let result = match section.kind.family() {
                DeviceFamily::Nas => self.allocate_nas(index, section, &server).await,
                DeviceFamily::Block => self.allocate_block(index, section, &server).await,
                DeviceFamily::Local => self.allocate_local(index, section, &server).await,
            };

            if let Err(e) = result {
                error!(
                    "device provisioning failed for {} section {}: {}",
                    section.kind, section.name, e
                );
                return Err(e);
            }
        }

        Ok(())
    }

    /// Resolve the server a section's devices land on
    async fn resolve_server(&self, section: &StorageSection) -> Result<Option<String>> {
        if let Some(fixed) = &section.server {
            return Ok(Some(fixed.clone()));
        }
        let eligible = self.settings.servers_for(section.kind);
        let picked = self.selector.select(section.kind, eligible, 1).await?;
        Ok(picked.into_iter().next().map(|s| s.address))
    }

    /// NAS kinds: one driver call per device; iso/export use the globally
    /// configured nas-compliant filesystem type
    async fn allocate_nas(
        &mut self,
        index: usize,
        section: &StorageSection,
        server: &str,
    ) -> Result<()> {
        let fs_type = self.settings.nas_fs_type(section.kind).to_string();

        for i in 0..section.requested {
            let name = section.device_name_at(i);
            let path = self
                .driver
                .create_nas_device(server, &name, &fs_type)
                .await
                .map_err(|e| provisioning_error(section, e))?;
            debug!("created {} export {} on {}", fs_type, path, server);
            self.table.push_device(
                index,
                Device::Nas {
                    address: server.to_string(),
                    path,
                    fs_type: fs_type.clone(),
                },
            );
        }
        Ok(())
    }

    /// Block kinds: each LUN creation is followed immediately by initiator
    /// remapping
    ///
    /// A freshly created LUN may still carry host-group associations from a
    /// previous run sharing the same array, so every configured initiator's
    /// memberships are queried and any group other than this section's device
    /// name is unmapped before the new mapping is added.
    async fn allocate_block(
        &mut self,
        index: usize,
        section: &StorageSection,
        server: &str,
    ) -> Result<()> {
        let capacity = section
            .capacity
            .clone()
            .unwrap_or_else(|| DEFAULT_BLOCK_CAPACITY.to_string());
        let group = section.device_name().to_string();

        for i in 0..section.requested {
            let name = section.device_name_at(i);
            let (lun_id, target) = self
                .driver
                .create_lun(&name, &capacity)
                .await
                .map_err(|e| provisioning_error(section, e))?;
            debug!("created LUN {} on target {}", lun_id, target);

            self.remap_initiators(section, &group)
                .await
                .map_err(|e| provisioning_error(section, e))?;

            self.driver
                .map_lun(&lun_id, &group, &self.settings.initiators)
                .await
                .map_err(|e| provisioning_error(section, e))?;

            let mappings = self
                .settings
                .initiators
                .iter()
                .map(|initiator| InitiatorMapping {
                    initiator: initiator.clone(),
                    host_group: group.clone(),
                })
                .collect();

            self.table.push_device(
                index,
                Device::Block {
                    address: server.to_string(),
                    lun_id,
                    target,
                    capacity: capacity.clone(),
                    mappings,
                },
            );
        }
        Ok(())
    }

    /// Unmap every initiator membership that does not correspond to this
    /// section's host group. Suffixing arrays decorate the nominal name on
    /// the array side, so under that quirk a membership counts as our own
    /// when it starts with the nominal name.
    async fn remap_initiators(&self, section: &StorageSection, group: &str) -> Result<()> {
        let suffixing = self.driver.quirk() == VendorQuirk::HostGroupSuffix;
        for initiator in &self.settings.initiators {
            let memberships = self.driver.get_initiator_host_groups(initiator).await?;
            let stale_groups = memberships.iter().filter(|g| {
                if suffixing {
                    !g.starts_with(group)
                } else {
                    g.as_str() != group
                }
            });
            for stale in stale_groups {
                info!(
                    "unmapping initiator {} from stale host group {} (section {})",
                    initiator, stale, section.name
                );
                self.driver.unmap_initiator(stale, initiator).await?;
            }
        }
        Ok(())
    }

    /// Local kind: timestamp-suffixed path on the resolved server; an
    /// already-existing path counts as success
    async fn allocate_local(
        &mut self,
        index: usize,
        section: &StorageSection,
        server: &str,
    ) -> Result<()> {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");

        for i in 0..section.requested {
            let path = format!(
                "{}/{}_{}_{}",
                self.settings.local_base_path, section.name, stamp, i
            );
            match self.driver.create_local_storage(&path).await {
                Ok(()) => {}
                Err(e) if e.is_already_exists() => {
                    debug!("local path {} already exists, reusing", path);
                }
                Err(e) => return Err(provisioning_error(section, e)),
            }
            self.table.push_device(
                index,
                Device::Local {
                    address: server.to_string(),
                    path,
                    credentials: self.settings.local_credentials.clone(),
                },
            );
        }
        Ok(())
    }
}

fn provisioning_error(section: &StorageSection, source: Error) -> Error {
    Error::DeviceProvisioning {
        kind: section.kind.to_string(),
        target: section.target.to_string(),
        reason: source.to_string(),
    }
}
