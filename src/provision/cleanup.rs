//! Cleanup Coordinator
//!
//! Reverses allocation: removes every tracked device and un-maps every
//! initiator mapping. Runs during suite teardown, so it never fails — every
//! per-device failure is collected into the [`CleanupReport`] and logged
//! with the device identifier, and cleanup proceeds to the next device.

use super::allocator::AllocationTable;
use crate::config::sections::ProvisionerSettings;
use crate::domain::ports::{Device, DeviceDriverRef, VendorQuirk};
use crate::error::Error;
use tracing::{debug, info, warn};

// =============================================================================
// Cleanup Report
// =============================================================================

/// One failed cleanup step
#[derive(Debug)]
pub struct CleanupFailure {
    /// Identifier of the device or mapping the step was working on
    pub device: String,
    /// What went wrong
    pub error: Error,
}

/// Outcome of a cleanup run
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Number of device removals attempted
    pub attempted: usize,
    /// Collected per-step failures
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    /// Whether every step succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, device: impl Into<String>, result: crate::error::Result<()>) {
        if let Err(error) = result {
            let device = device.into();
            warn!("cleanup step failed for {}: {}", device, error);
            self.failures.push(CleanupFailure { device, error });
        }
    }
}

// =============================================================================
// Cleanup Coordinator
// =============================================================================

/// Best-effort teardown of everything the allocator created
pub struct CleanupCoordinator {
    driver: DeviceDriverRef,
    settings: ProvisionerSettings,
}

impl CleanupCoordinator {
    pub fn new(driver: DeviceDriverRef, settings: ProvisionerSettings) -> Self {
        Self { driver, settings }
    }

    /// Remove every tracked device and mapping, clearing the table's lists
    ///
    /// Block sections remove all their LUNs first and only then unmap the
    /// initiators from the host group, once per section — unmapping is a
    /// host-group-wide operation, and a LUN removal against an array that
    /// still exposes the LUN to an initiator may fail.
    pub async fn cleanup_all(&self, table: &mut AllocationTable) -> CleanupReport {
        let mut report = CleanupReport::default();

        for entry in table.entries_mut() {
            if entry.devices.is_empty() {
                continue;
            }
            debug!(
                "cleaning up {} device(s) for section {}",
                entry.devices.len(),
                entry.section.name
            );

            let mut section_had_luns = false;
            for device in &entry.devices {
                report.attempted += 1;
                match device {
                    Device::Nas { address, path, fs_type } => {
                        report.record(
                            device.identifier(),
                            self.driver.remove_nas_device(address, path, fs_type).await,
                        );
                    }
                    Device::Local { path, .. } => {
                        report.record(
                            device.identifier(),
                            self.driver.remove_local_storage(path, true).await,
                        );
                    }
                    Device::Block { lun_id, .. } => {
                        section_had_luns = true;
                        report.record(device.identifier(), self.driver.remove_lun(lun_id).await);
                    }
                }
            }

            if section_had_luns {
                let group = self.resolve_host_group(&entry.section, &mut report).await;
                for initiator in &self.settings.initiators {
                    report.record(
                        format!("{}:{}", group, initiator),
                        self.driver.unmap_initiator(&group, initiator).await,
                    );
                }
            }

            entry.devices.clear();
        }

        info!(
            "cleanup finished: {} removal(s) attempted, {} failure(s)",
            report.attempted,
            report.failures.len()
        );
        report
    }

    /// Host group to unmap a block section's initiators from
    ///
    /// Suffix-quirk arrays decorate the nominal group name, so the real name
    /// is discovered from the first initiator's current memberships instead
    /// of trusting the configured one.
    async fn resolve_host_group(
        &self,
        section: &crate::config::sections::StorageSection,
        report: &mut CleanupReport,
    ) -> String {
        let nominal = section.device_name().to_string();
        let quirky = self.driver.quirk() == VendorQuirk::HostGroupSuffix || section.is_specific;
        if !quirky {
            return nominal;
        }

        let Some(first) = self.settings.initiators.first() else {
            return nominal;
        };
        match self.driver.get_initiator_host_groups(first).await {
            Ok(memberships) => memberships
                .into_iter()
                .find(|g| g.starts_with(&nominal))
                .unwrap_or(nominal),
            Err(e) => {
                report.record(format!("hostgroup-discovery:{}", first), Err(e));
                nominal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryArray, MemoryArrayConfig};
    use crate::config::sections::SectionPath;
    use crate::config::sections::StorageSection;
    use crate::domain::ports::{DeviceDriver, InitiatorMapping, StorageKind};
    use std::sync::Arc;

    fn section(name: &str, kind: StorageKind) -> StorageSection {
        StorageSection {
            name: name.to_string(),
            target: format!("storage.{}", name).parse::<SectionPath>().unwrap(),
            kind,
            requested: 2,
            server: None,
            capacity: None,
            is_specific: false,
        }
    }

    fn settings() -> ProvisionerSettings {
        ProvisionerSettings {
            initiators: vec![
                "iqn.2026-01.lab:host1".to_string(),
                "iqn.2026-01.lab:host2".to_string(),
            ],
            ..Default::default()
        }
    }

    async fn provisioned_nas_table(array: &MemoryArray) -> AllocationTable {
        let mut table = AllocationTable::new();
        let idx = table.insert_section(section("nfs_data", StorageKind::Nfs));
        for i in 0..2 {
            let path = array
                .create_nas_device("10.0.0.1", &format!("nfs_data_{}", i), "nfs")
                .await
                .unwrap();
            table.push_device(
                idx,
                Device::Nas {
                    address: "10.0.0.1".to_string(),
                    path,
                    fs_type: "nfs".to_string(),
                },
            );
        }
        table
    }

    #[tokio::test]
    async fn test_nas_cleanup_removes_every_device() {
        let array = Arc::new(MemoryArray::new(MemoryArrayConfig::default()));
        let mut table = provisioned_nas_table(&array).await;

        let report = CleanupCoordinator::new(array.clone(), settings())
            .cleanup_all(&mut table)
            .await;

        assert!(report.is_clean());
        assert_eq!(report.attempted, 2);
        assert_eq!(array.nas_export_count().await, 0);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_never_fails_and_is_total() {
        let array = Arc::new(MemoryArray::new(MemoryArrayConfig::default()));
        let mut table = provisioned_nas_table(&array).await;
        array.fail_on("remove_nas_device").await;

        let report = CleanupCoordinator::new(array.clone(), settings())
            .cleanup_all(&mut table)
            .await;

        // both removals were attempted exactly once despite the first failing
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failures.len(), 2);
        let attempts = array.removal_log().await;
        assert_eq!(
            attempts.iter().filter(|op| op.starts_with("nas:")).count(),
            2
        );
        // the table is still cleared; leftover state is the array's problem
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_block_cleanup_removes_luns_then_unmaps_once_per_section() {
        let array = Arc::new(MemoryArray::new(MemoryArrayConfig::default()));
        let settings = settings();

        let mut table = AllocationTable::new();
        let idx = table.insert_section(section("iscsi_lun", StorageKind::Iscsi));
        for i in 0..2 {
            let (lun_id, target) = array
                .create_lun(&format!("iscsi_lun_{}", i), "100")
                .await
                .unwrap();
            array
                .map_lun(&lun_id, "iscsi_lun", &settings.initiators)
                .await
                .unwrap();
            table.push_device(
                idx,
                Device::Block {
                    address: "10.0.0.3".to_string(),
                    lun_id,
                    target,
                    capacity: "100".to_string(),
                    mappings: settings
                        .initiators
                        .iter()
                        .map(|i| InitiatorMapping {
                            initiator: i.clone(),
                            host_group: "iscsi_lun".to_string(),
                        })
                        .collect(),
                },
            );
        }

        let report = CleanupCoordinator::new(array.clone(), settings.clone())
            .cleanup_all(&mut table)
            .await;
        assert!(report.is_clean());

        // every LUN removal precedes every unmap in the operation log
        let log = array.removal_log().await;
        let last_lun = log.iter().rposition(|op| op.starts_with("lun:")).unwrap();
        let first_unmap = log.iter().position(|op| op.starts_with("unmap:")).unwrap();
        assert!(last_lun < first_unmap);

        // one unmap per initiator, not per LUN
        assert_eq!(
            log.iter().filter(|op| op.starts_with("unmap:")).count(),
            settings.initiators.len()
        );
        for initiator in &settings.initiators {
            assert!(array.initiator_groups(initiator).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_suffix_quirk_discovers_real_host_group() {
        let array = Arc::new(MemoryArray::new(MemoryArrayConfig {
            quirk: VendorQuirk::HostGroupSuffix,
            ..Default::default()
        }));
        let settings = settings();

        let mut table = AllocationTable::new();
        let idx = table.insert_section(section("iscsi_lun", StorageKind::Iscsi));
        let (lun_id, target) = array.create_lun("iscsi_lun_0", "100").await.unwrap();
        // the quirky array suffixes the nominal group name on mapping
        array
            .map_lun(&lun_id, "iscsi_lun", &settings.initiators)
            .await
            .unwrap();
        assert_eq!(
            array.initiator_groups(&settings.initiators[0]).await,
            vec!["iscsi_lun_hg".to_string()]
        );
        table.push_device(
            idx,
            Device::Block {
                address: "10.0.0.3".to_string(),
                lun_id,
                target,
                capacity: "100".to_string(),
                mappings: Vec::new(),
            },
        );

        let report = CleanupCoordinator::new(array.clone(), settings.clone())
            .cleanup_all(&mut table)
            .await;

        assert!(report.is_clean(), "failures: {:?}", report.failures);
        for initiator in &settings.initiators {
            assert!(array.initiator_groups(initiator).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_failed_lun_removal_does_not_stop_the_rest() {
        let array = Arc::new(MemoryArray::new(MemoryArrayConfig::default()));
        let settings = settings();

        let mut table = AllocationTable::new();
        let idx = table.insert_section(section("iscsi_lun", StorageKind::Iscsi));
        // one real LUN and one the array never heard of
        let (lun_id, target) = array.create_lun("iscsi_lun_0", "100").await.unwrap();
        array
            .map_lun(&lun_id, "iscsi_lun", &settings.initiators)
            .await
            .unwrap();
        table.push_device(
            idx,
            Device::Block {
                address: "10.0.0.3".to_string(),
                lun_id: "missing".to_string(),
                target: "iqn.2026-01.lab:ghost".to_string(),
                capacity: "100".to_string(),
                mappings: Vec::new(),
            },
        );
        table.push_device(
            idx,
            Device::Block {
                address: "10.0.0.3".to_string(),
                lun_id,
                target,
                capacity: "100".to_string(),
                mappings: Vec::new(),
            },
        );

        let report = CleanupCoordinator::new(array.clone(), settings.clone())
            .cleanup_all(&mut table)
            .await;

        assert_eq!(report.failures.len(), 1);
        assert!(array.lun_ids().await.is_empty());
        for initiator in &settings.initiators {
            assert!(array.initiator_groups(initiator).await.is_empty());
        }
    }
}
