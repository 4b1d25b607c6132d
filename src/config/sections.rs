//! Storage Section Parsing
//!
//! Interprets the string-typed [`ConfigStore`] into the provisioner's typed
//! inputs: global settings plus one [`StorageSection`] per requested device
//! pool.
//!
//! Expected layout:
//!
//! ```yaml
//! provisioner:
//!   load_balancing: capacity          # capacity | random | none
//!   iso_export_domain_nas: nfs
//!   initiators: [iqn.2026-01.lab:host1, iqn.2026-01.lab:host2]
//!   vendor_quirk: generic             # generic | host_group_suffix
//!   local_credentials: "root:secret"
//!   local_base_path: /home/storage
//!   sections: [nfs_data, iscsi_lun]
//! servers:
//!   nfs: [10.0.0.1, 10.0.0.2]
//!   iscsi: [10.0.0.3]
//! nfs_data:
//!   kind: nfs
//!   count: "2"
//!   target: storage.data_domain
//! iscsi_lun:
//!   kind: iscsi
//!   count: "1"
//!   capacity: "100"
//!   target: storage.lun_domain
//!   is_specific: "false"
//! ```

use super::store::ConfigStore;
use crate::domain::ports::{StorageKind, VendorQuirk};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Config section holding the provisioner's own settings
pub const PROVISIONER_SECTION: &str = "provisioner";

/// Config section holding the per-kind server pools
pub const SERVERS_SECTION: &str = "servers";

// =============================================================================
// Load Balancing Policy
// =============================================================================

/// Strategy used to pick which physical server serves a new device request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancingPolicy {
    /// Rank servers by monitored disk-space-to-CPU-load ratio
    Capacity,
    /// Uniformly random subset of the eligible servers
    Random,
    /// Disabled; explicit per-section servers are required
    None,
}

impl FromStr for LoadBalancingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "capacity" => Ok(LoadBalancingPolicy::Capacity),
            "random" => Ok(LoadBalancingPolicy::Random),
            "none" => Ok(LoadBalancingPolicy::None),
            other => Err(Error::Configuration(format!(
                "unknown load_balancing policy: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for LoadBalancingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadBalancingPolicy::Capacity => write!(f, "capacity"),
            LoadBalancingPolicy::Random => write!(f, "random"),
            LoadBalancingPolicy::None => write!(f, "none"),
        }
    }
}

// =============================================================================
// Section Path
// =============================================================================

/// Target location in the shared config store, written as "Group.key"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SectionPath {
    /// Config group (section) the results land in
    pub group: String,
    /// Base key within the group
    pub key: String,
}

impl FromStr for SectionPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((group, key)) if !group.is_empty() && !key.is_empty() => Ok(Self {
                group: group.to_string(),
                key: key.to_string(),
            }),
            _ => Err(Error::Configuration(format!(
                "section target must be \"Group.key\", got: {}",
                s
            ))),
        }
    }
}

impl TryFrom<String> for SectionPath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SectionPath> for String {
    fn from(path: SectionPath) -> Self {
        path.to_string()
    }
}

impl std::fmt::Display for SectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.group, self.key)
    }
}

// =============================================================================
// Storage Section
// =============================================================================

/// One requested device pool: kind x target config path
///
/// Immutable after parse; owned exclusively by the allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSection {
    /// Name of the config group this section was parsed from
    pub name: String,
    /// Where the allocation results are written
    pub target: SectionPath,
    /// Storage kind to provision
    pub kind: StorageKind,
    /// Requested device count
    pub requested: usize,
    /// Fixed server address, bypassing selection
    pub server: Option<String>,
    /// Capacity hint for block kinds (GiB)
    pub capacity: Option<String>,
    /// Vendor quirk marker carried through to cleanup
    pub is_specific: bool,
}

impl StorageSection {
    /// Parse one section from its config group
    pub fn parse(store: &ConfigStore, name: &str) -> Result<Self> {
        if !store.has_section(name) {
            return Err(Error::Configuration(format!(
                "declared section group missing: {}",
                name
            )));
        }
        let kind_raw = store.get_scalar(name, "kind")?;
        let kind = StorageKind::parse(kind_raw).ok_or_else(|| {
            Error::Configuration(format!("section {}: unknown kind {}", name, kind_raw))
        })?;

        Ok(Self {
            name: name.to_string(),
            target: store.get_scalar(name, "target")?.parse()?,
            kind,
            requested: store.get_usize(name, "count")?,
            server: store.get_scalar_opt(name, "server").map(str::to_string),
            capacity: store.get_scalar_opt(name, "capacity").map(str::to_string),
            is_specific: match store.get(name, "is_specific") {
                Some(_) => store.get_bool(name, "is_specific")?,
                None => false,
            },
        })
    }

    /// Parse every declared section, preserving declaration order
    pub fn parse_all(store: &ConfigStore) -> Result<Vec<Self>> {
        let names = store.get_list(PROVISIONER_SECTION, "sections");
        names.iter().map(|name| Self::parse(store, name)).collect()
    }

    /// Nominal device/host-group name for this section
    pub fn device_name(&self) -> &str {
        &self.name
    }

    /// Name for the i-th device of this section
    pub fn device_name_at(&self, index: usize) -> String {
        format!("{}_{}", self.name, index)
    }
}

// =============================================================================
// Provisioner Settings
// =============================================================================

/// Global settings shared by all sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionerSettings {
    /// Active load-balancing policy
    pub policy: LoadBalancingPolicy,
    /// NAS-compliant filesystem type backing ISO/export domains
    pub iso_export_domain_nas: String,
    /// Host initiator identities to map onto block devices
    pub initiators: Vec<String>,
    /// Vendor quirk flags for the active storage manager
    pub vendor_quirk: VendorQuirk,
    /// Credentials for managing local storage paths
    pub local_credentials: String,
    /// Base path local devices are created under
    pub local_base_path: String,
    /// Eligible servers per kind
    pub servers: BTreeMap<StorageKind, Vec<String>>,
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self {
            policy: LoadBalancingPolicy::None,
            iso_export_domain_nas: "nfs".to_string(),
            initiators: Vec::new(),
            vendor_quirk: VendorQuirk::Generic,
            local_credentials: String::new(),
            local_base_path: "/home/storage".to_string(),
            servers: BTreeMap::new(),
        }
    }
}

impl ProvisionerSettings {
    /// Parse the settings from the shared store
    pub fn from_store(store: &ConfigStore) -> Result<Self> {
        let defaults = Self::default();

        let policy = match store.get_scalar_opt(PROVISIONER_SECTION, "load_balancing") {
            Some(raw) => raw.parse()?,
            None => defaults.policy,
        };

        let vendor_quirk = match store.get_scalar_opt(PROVISIONER_SECTION, "vendor_quirk") {
            Some("generic") | None => VendorQuirk::Generic,
            Some("host_group_suffix") => VendorQuirk::HostGroupSuffix,
            Some(other) => {
                return Err(Error::Configuration(format!(
                    "unknown vendor_quirk: {}",
                    other
                )))
            }
        };

        let mut servers = BTreeMap::new();
        for key in store.section_keys(SERVERS_SECTION) {
            let kind = StorageKind::parse(&key).ok_or_else(|| {
                Error::Configuration(format!("servers section: unknown kind {}", key))
            })?;
            servers.insert(kind, store.get_list(SERVERS_SECTION, &key));
        }

        Ok(Self {
            policy,
            iso_export_domain_nas: store
                .get_scalar_opt(PROVISIONER_SECTION, "iso_export_domain_nas")
                .unwrap_or(&defaults.iso_export_domain_nas)
                .to_string(),
            initiators: store.get_list(PROVISIONER_SECTION, "initiators"),
            vendor_quirk,
            local_credentials: store
                .get_scalar_opt(PROVISIONER_SECTION, "local_credentials")
                .unwrap_or("")
                .to_string(),
            local_base_path: store
                .get_scalar_opt(PROVISIONER_SECTION, "local_base_path")
                .unwrap_or(&defaults.local_base_path)
                .to_string(),
            servers,
        })
    }

    /// Eligible servers for a kind
    pub fn servers_for(&self, kind: StorageKind) -> &[String] {
        self.servers.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Filesystem type for a NAS-family kind
    pub fn nas_fs_type(&self, kind: StorageKind) -> &str {
        kind.nas_fs_type().unwrap_or(&self.iso_export_domain_nas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn lab_store() -> ConfigStore {
        let mut store = ConfigStore::new();
        store.set(PROVISIONER_SECTION, "load_balancing", "random");
        store.set(PROVISIONER_SECTION, "iso_export_domain_nas", "nfs");
        store.set(
            PROVISIONER_SECTION,
            "initiators",
            vec!["iqn.2026-01.lab:host1".to_string()],
        );
        store.set(
            PROVISIONER_SECTION,
            "sections",
            vec!["nfs_data".to_string(), "iscsi_lun".to_string()],
        );
        store.set(SERVERS_SECTION, "nfs", vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
        store.set(SERVERS_SECTION, "iscsi", vec!["10.0.0.3".to_string()]);
        store.set("nfs_data", "kind", "nfs");
        store.set("nfs_data", "count", "2");
        store.set("nfs_data", "target", "storage.data_domain");
        store.set("iscsi_lun", "kind", "iscsi");
        store.set("iscsi_lun", "count", "1");
        store.set("iscsi_lun", "capacity", "100");
        store.set("iscsi_lun", "target", "storage.lun_domain");
        store.set("iscsi_lun", "is_specific", "false");
        store
    }

    #[test]
    fn test_settings_from_store() {
        let settings = ProvisionerSettings::from_store(&lab_store()).unwrap();
        assert_eq!(settings.policy, LoadBalancingPolicy::Random);
        assert_eq!(settings.initiators.len(), 1);
        assert_eq!(settings.vendor_quirk, VendorQuirk::Generic);
        assert_eq!(settings.servers_for(StorageKind::Nfs).len(), 2);
        assert!(settings.servers_for(StorageKind::Gluster).is_empty());
        assert_eq!(settings.nas_fs_type(StorageKind::Gluster), "glusterfs");
        assert_eq!(settings.nas_fs_type(StorageKind::Iso), "nfs");
    }

    #[test]
    fn test_settings_defaults() {
        let settings = ProvisionerSettings::from_store(&ConfigStore::new()).unwrap();
        assert_eq!(settings.policy, LoadBalancingPolicy::None);
        assert!(settings.initiators.is_empty());
    }

    #[test]
    fn test_section_parse_all_preserves_order() {
        let sections = StorageSection::parse_all(&lab_store()).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, "nfs_data");
        assert_eq!(sections[0].kind, StorageKind::Nfs);
        assert_eq!(sections[0].requested, 2);
        assert_eq!(sections[0].target.group, "storage");
        assert_eq!(sections[0].target.key, "data_domain");
        assert!(!sections[0].is_specific);
        assert_eq!(sections[1].capacity.as_deref(), Some("100"));
    }

    #[test]
    fn test_section_device_names() {
        let sections = StorageSection::parse_all(&lab_store()).unwrap();
        assert_eq!(sections[1].device_name(), "iscsi_lun");
        assert_eq!(sections[1].device_name_at(0), "iscsi_lun_0");
    }

    #[test]
    fn test_bad_target_and_kind() {
        let mut store = lab_store();
        store.set("nfs_data", "target", "no-dot");
        assert_matches!(
            StorageSection::parse(&store, "nfs_data"),
            Err(Error::Configuration(_))
        );

        let mut store = lab_store();
        store.set("nfs_data", "kind", "ceph");
        assert_matches!(
            StorageSection::parse(&store, "nfs_data"),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn test_missing_declared_section() {
        let mut store = lab_store();
        store.set(
            PROVISIONER_SECTION,
            "sections",
            vec!["ghost".to_string()],
        );
        assert_matches!(
            StorageSection::parse_all(&store),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "capacity".parse::<LoadBalancingPolicy>().unwrap(),
            LoadBalancingPolicy::Capacity
        );
        assert!("round_robin".parse::<LoadBalancingPolicy>().is_err());
    }
}
