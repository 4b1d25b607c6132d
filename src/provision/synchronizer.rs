//! Config Synchronizer
//!
//! Serializes the allocation table back into the shared configuration store
//! for downstream test fixtures. The legacy three-pass contract (clean, then
//! append, then collapse single-element lists) is made explicit: a single
//! [`ConfigSynchronizer::sync`] entry point takes a [`SyncMode`], and
//! [`ConfigSynchronizer::sync_all`] always drives the three passes in order.
//! The append pass assumes its keys exist as lists (possibly just emptied by
//! the clean pass); the collapse pass assumes the append pass completed.

use super::allocator::{AllocationTable, SectionEntry};
use crate::config::store::ConfigStore;
use crate::domain::ports::Device;
use crate::error::Result;
use tracing::{debug, info};

/// Marker value written as `<key>_real_storage_type` for local devices
const LOCAL_STORAGE_TYPE: &str = "localfs";

// =============================================================================
// Sync Mode
// =============================================================================

/// One pass of the synchronization sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Reset the target keys to empty lists, avoiding duplicate accumulation
    /// across repeated runs
    Clean,
    /// Append one entry per device to the target keys
    Append,
    /// Collapse exactly-one-element lists into scalars for legacy consumers
    CollapseSingle,
}

// =============================================================================
// Config Synchronizer
// =============================================================================

/// Writes allocation results into the shared config store
pub struct ConfigSynchronizer;

impl ConfigSynchronizer {
    /// Run one synchronization pass over every non-empty section
    pub fn sync(store: &mut ConfigStore, table: &AllocationTable, mode: SyncMode) -> Result<()> {
        for entry in table.entries() {
            if entry.devices.is_empty() {
                continue;
            }
            match mode {
                SyncMode::Clean => Self::clean_entry(store, entry),
                SyncMode::Append => Self::append_entry(store, entry)?,
                SyncMode::CollapseSingle => Self::collapse_entry(store, entry),
            }
        }
        debug!("sync pass {:?} complete", mode);
        Ok(())
    }

    /// Run the full clean -> append -> collapse sequence
    pub fn sync_all(store: &mut ConfigStore, table: &AllocationTable) -> Result<()> {
        Self::sync(store, table, SyncMode::Clean)?;
        Self::sync(store, table, SyncMode::Append)?;
        Self::sync(store, table, SyncMode::CollapseSingle)?;
        info!(
            "synchronized {} device(s) across {} section(s) into config",
            table.device_count(),
            table.entries().iter().filter(|e| !e.devices.is_empty()).count()
        );
        Ok(())
    }

    fn clean_entry(store: &mut ConfigStore, entry: &SectionEntry) {
        let group = &entry.section.target.group;
        let key = &entry.section.target.key;
        store.reset_list(group, &format!("{}_address", key));
        match &entry.devices[0] {
            Device::Nas { .. } | Device::Local { .. } => {
                store.reset_list(group, &format!("{}_path", key));
            }
            Device::Block { .. } => {
                store.reset_list(group, key);
                store.reset_list(group, &format!("{}_target", key));
            }
        }
    }

    fn append_entry(store: &mut ConfigStore, entry: &SectionEntry) -> Result<()> {
        let group = &entry.section.target.group;
        let key = &entry.section.target.key;
        let address_key = format!("{}_address", key);

        for device in &entry.devices {
            store.append(group, &address_key, device.address())?;
            match device {
                Device::Nas { path, fs_type, .. } => {
                    store.append(group, &format!("{}_path", key), path.clone())?;
                    store.set(group, &format!("{}_real_storage_type", key), fs_type.clone());
                }
                Device::Local { path, .. } => {
                    store.append(group, &format!("{}_path", key), path.clone())?;
                    store.set(group, &format!("{}_real_storage_type", key), LOCAL_STORAGE_TYPE);
                }
                Device::Block { lun_id, target, .. } => {
                    store.append(group, key, lun_id.clone())?;
                    store.append(group, &format!("{}_target", key), target.clone())?;
                }
            }
        }
        Ok(())
    }

    fn collapse_entry(store: &mut ConfigStore, entry: &SectionEntry) {
        let group = &entry.section.target.group;
        let key = &entry.section.target.key;
        store.collapse_single(group, &format!("{}_address", key));
        match &entry.devices[0] {
            Device::Nas { .. } | Device::Local { .. } => {
                store.collapse_single(group, &format!("{}_path", key));
            }
            Device::Block { .. } => {
                store.collapse_single(group, key);
                store.collapse_single(group, &format!("{}_target", key));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::sections::{SectionPath, StorageSection};
    use crate::config::store::ConfigValue;
    use crate::domain::ports::StorageKind;

    fn section(name: &str, kind: StorageKind, count: usize) -> StorageSection {
        StorageSection {
            name: name.to_string(),
            target: format!("storage.{}", name).parse::<SectionPath>().unwrap(),
            kind,
            requested: count,
            server: None,
            capacity: None,
            is_specific: false,
        }
    }

    fn nas_device(address: &str, path: &str) -> Device {
        Device::Nas {
            address: address.to_string(),
            path: path.to_string(),
            fs_type: "nfs".to_string(),
        }
    }

    fn two_device_table() -> AllocationTable {
        let mut table = AllocationTable::new();
        let idx = table.insert_section(section("data_domain", StorageKind::Nfs, 2));
        table.push_device(idx, nas_device("A", "/exports/nfs/data_domain_0"));
        table.push_device(idx, nas_device("B", "/exports/nfs/data_domain_1"));
        table
    }

    #[test]
    fn test_multi_device_section_stays_a_list() {
        let table = two_device_table();
        let mut store = ConfigStore::new();
        ConfigSynchronizer::sync_all(&mut store, &table).unwrap();

        assert_eq!(
            store.get_list("storage", "data_domain_address"),
            vec!["A".to_string(), "B".to_string()]
        );
        assert_eq!(
            store.get_list("storage", "data_domain_path"),
            vec![
                "/exports/nfs/data_domain_0".to_string(),
                "/exports/nfs/data_domain_1".to_string()
            ]
        );
        assert_eq!(
            store.get_scalar("storage", "data_domain_real_storage_type").unwrap(),
            "nfs"
        );
        // N>1 lists are not collapsed
        assert!(matches!(
            store.get("storage", "data_domain_address"),
            Some(ConfigValue::List(_))
        ));
    }

    #[test]
    fn test_single_device_section_collapses_to_scalar() {
        let mut table = AllocationTable::new();
        let idx = table.insert_section(section("iso_domain", StorageKind::Iso, 1));
        table.push_device(idx, nas_device("A", "/exports/nfs/iso_domain_0"));

        let mut store = ConfigStore::new();
        ConfigSynchronizer::sync_all(&mut store, &table).unwrap();

        assert_eq!(store.get_scalar("storage", "iso_domain_address").unwrap(), "A");
        assert_eq!(
            store.get_scalar("storage", "iso_domain_path").unwrap(),
            "/exports/nfs/iso_domain_0"
        );
    }

    #[test]
    fn test_block_section_writes_lun_ids_and_targets() {
        let mut table = AllocationTable::new();
        let idx = table.insert_section(section("lun_domain", StorageKind::Iscsi, 2));
        for i in 0..2 {
            table.push_device(
                idx,
                Device::Block {
                    address: "10.0.0.3".to_string(),
                    lun_id: format!("{}", i),
                    target: format!("iqn.2026-01.lab:tgt{}", i),
                    capacity: "100".to_string(),
                    mappings: Vec::new(),
                },
            );
        }

        let mut store = ConfigStore::new();
        ConfigSynchronizer::sync_all(&mut store, &table).unwrap();

        assert_eq!(
            store.get_list("storage", "lun_domain"),
            vec!["0".to_string(), "1".to_string()]
        );
        assert_eq!(store.get_list("storage", "lun_domain_target").len(), 2);
        assert_eq!(
            store.get_list("storage", "lun_domain_address"),
            vec!["10.0.0.3".to_string(), "10.0.0.3".to_string()]
        );
        // no real_storage_type marker for block sections
        assert!(store.get("storage", "lun_domain_real_storage_type").is_none());
    }

    #[test]
    fn test_clean_resets_previous_run_values() {
        let table = two_device_table();
        let mut store = ConfigStore::new();
        // leftovers from an earlier run
        store.set(
            "storage",
            "data_domain_address",
            vec!["old".to_string(), "stale".to_string()],
        );

        ConfigSynchronizer::sync_all(&mut store, &table).unwrap();
        assert_eq!(
            store.get_list("storage", "data_domain_address"),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn test_repeated_sync_all_does_not_accumulate() {
        let table = two_device_table();
        let mut store = ConfigStore::new();
        ConfigSynchronizer::sync_all(&mut store, &table).unwrap();
        ConfigSynchronizer::sync_all(&mut store, &table).unwrap();
        assert_eq!(store.get_list("storage", "data_domain_address").len(), 2);
    }

    #[test]
    fn test_empty_sections_write_nothing() {
        let mut table = AllocationTable::new();
        table.insert_section(section("ghost", StorageKind::Nfs, 2));

        let mut store = ConfigStore::new();
        ConfigSynchronizer::sync_all(&mut store, &table).unwrap();
        assert!(store.get("storage", "ghost_address").is_none());
    }
}
