//! Domain Ports - Core types and trait definitions for the provisioner
//!
//! These traits define the boundaries between the provisioning logic and the
//! external systems: the vendor storage array (device driver) and the
//! capacity monitoring endpoint. Adapters implement these traits to provide
//! concrete functionality.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Storage Kinds
// =============================================================================

/// Storage kinds supported by the provisioner
///
/// `Iso` and `Export` are NAS-family kinds allocated through the same path as
/// regular NAS shares but tracked in their own config sections because they
/// feed different downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Gluster,
    Nfs,
    Pnfs,
    Iscsi,
    Fcp,
    Local,
    Iso,
    Export,
}

impl StorageKind {
    /// Parse a kind from its lowercase config name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gluster" => Some(StorageKind::Gluster),
            "nfs" => Some(StorageKind::Nfs),
            "pnfs" => Some(StorageKind::Pnfs),
            "iscsi" => Some(StorageKind::Iscsi),
            "fcp" => Some(StorageKind::Fcp),
            "local" => Some(StorageKind::Local),
            "iso" => Some(StorageKind::Iso),
            "export" => Some(StorageKind::Export),
            _ => None,
        }
    }

    /// Device family this kind provisions into
    pub fn family(&self) -> DeviceFamily {
        match self {
            StorageKind::Gluster
            | StorageKind::Nfs
            | StorageKind::Pnfs
            | StorageKind::Iso
            | StorageKind::Export => DeviceFamily::Nas,
            StorageKind::Iscsi | StorageKind::Fcp => DeviceFamily::Block,
            StorageKind::Local => DeviceFamily::Local,
        }
    }

    /// Filesystem type used for the NAS export, for NAS-proper kinds
    ///
    /// `Iso`/`Export` take theirs from the global `iso_export_domain_nas`
    /// setting instead.
    pub fn nas_fs_type(&self) -> Option<&'static str> {
        match self {
            StorageKind::Gluster => Some("glusterfs"),
            StorageKind::Nfs => Some("nfs"),
            StorageKind::Pnfs => Some("pnfs"),
            _ => None,
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::Gluster => write!(f, "gluster"),
            StorageKind::Nfs => write!(f, "nfs"),
            StorageKind::Pnfs => write!(f, "pnfs"),
            StorageKind::Iscsi => write!(f, "iscsi"),
            StorageKind::Fcp => write!(f, "fcp"),
            StorageKind::Local => write!(f, "local"),
            StorageKind::Iso => write!(f, "iso"),
            StorageKind::Export => write!(f, "export"),
        }
    }
}

/// Coarse device family, deciding which driver operations apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    Nas,
    Block,
    Local,
}

// =============================================================================
// Storage Servers
// =============================================================================

/// A physical/virtual storage endpoint serving one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageServer {
    /// Network address of the server
    pub address: String,
    /// Storage kind it serves
    pub kind: StorageKind,
    /// Disk-space-to-CPU-load ratio reported by monitoring, when known
    pub available_ratio: Option<f64>,
}

impl StorageServer {
    /// Create a server with no capacity estimate
    pub fn new(address: impl Into<String>, kind: StorageKind) -> Self {
        Self {
            address: address.into(),
            kind,
            available_ratio: None,
        }
    }
}

// =============================================================================
// Devices
// =============================================================================

/// Relation between a host initiator identity and a LUN's host group
///
/// Invariant: at most one mapping per (initiator, host-group) pair at any
/// time. Stale mappings to a different host group must be removed before a
/// new one is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiatorMapping {
    /// IQN or WWN by which the host is recognized by the array
    pub initiator: String,
    /// Array-side host group the initiator is mapped into
    pub host_group: String,
}

/// A provisioned storage device
///
/// Devices are appended to a per-section ordered list (insertion order =
/// creation order) and never mutated after creation except mapping changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum Device {
    /// Network-attached export (NFS/Gluster/pNFS share)
    Nas {
        /// Server address that exposes the export
        address: String,
        /// Export path on the server
        path: String,
        /// Filesystem type of the export
        fs_type: String,
    },
    /// Block device (LUN) exposed over iSCSI/FCP
    Block {
        /// Array/portal address
        address: String,
        /// Logical unit id
        lun_id: String,
        /// Target name
        target: String,
        /// Requested capacity (GiB, as configured)
        capacity: String,
        /// Initiator mappings established for this LUN
        mappings: Vec<InitiatorMapping>,
    },
    /// Local filesystem path on a given server
    Local {
        /// Owning server address
        address: String,
        /// Filesystem path
        path: String,
        /// Credentials used to manage the path
        credentials: String,
    },
}

impl Device {
    /// Server address the device lives on
    pub fn address(&self) -> &str {
        match self {
            Device::Nas { address, .. }
            | Device::Block { address, .. }
            | Device::Local { address, .. } => address,
        }
    }

    /// Identifier used in logs and cleanup reports
    pub fn identifier(&self) -> String {
        match self {
            Device::Nas { address, path, .. } => format!("{}:{}", address, path),
            Device::Block { lun_id, target, .. } => format!("{}@{}", lun_id, target),
            Device::Local { address, path, .. } => format!("{}:{}", address, path),
        }
    }
}

/// Information about a LUN as reported by the array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LunInfo {
    /// Logical unit id
    pub lun_id: String,
    /// Target name
    pub target: String,
    /// Serial number, when the array reports one
    pub serial: Option<String>,
    /// Host groups the LUN is currently exposed to
    pub host_groups: Vec<String>,
}

// =============================================================================
// Vendor Quirks
// =============================================================================

/// Vendor-specific behavior flags for the device driver
///
/// Resolved at construction time from configuration, never inferred from the
/// driver's runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorQuirk {
    /// Array honors the nominal host-group name as configured
    Generic,
    /// Array suffixes the nominal host-group name; the real name must be
    /// discovered from an initiator's current memberships
    HostGroupSuffix,
}

impl Default for VendorQuirk {
    fn default() -> Self {
        VendorQuirk::Generic
    }
}

// =============================================================================
// Device Driver Port
// =============================================================================

/// Port for vendor storage-array operations
///
/// One implementation per storage manager. Calls block until the array
/// answers; the provisioner adds no timeout layer on top.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Create a NAS export on a server, returning its path
    async fn create_nas_device(&self, server: &str, name: &str, fs_type: &str) -> Result<String>;

    /// Remove a NAS export from a server
    async fn remove_nas_device(&self, server: &str, path: &str, fs_type: &str) -> Result<()>;

    /// Create a LUN, returning (lun_id, target)
    async fn create_lun(&self, name: &str, capacity: &str) -> Result<(String, String)>;

    /// Host groups an initiator is currently a member of
    async fn get_initiator_host_groups(&self, initiator: &str) -> Result<Vec<String>>;

    /// Remove an initiator from a host group
    async fn unmap_initiator(&self, group: &str, initiator: &str) -> Result<()>;

    /// Map a LUN into a host group and add the initiators to that group
    async fn map_lun(&self, lun_id: &str, group: &str, initiators: &[String]) -> Result<()>;

    /// Look up a LUN by id
    async fn get_lun(&self, lun_id: &str) -> Result<LunInfo>;

    /// Remove a LUN by id
    async fn remove_lun(&self, lun_id: &str) -> Result<()>;

    /// Create a local filesystem path on the driver's server
    ///
    /// Fails with [`crate::Error::FileAlreadyExists`] when the path exists;
    /// callers treat that as success.
    async fn create_local_storage(&self, path: &str) -> Result<()>;

    /// Remove a local filesystem path
    async fn remove_local_storage(&self, path: &str, force: bool) -> Result<()>;

    /// Driver name, for logs
    fn driver_name(&self) -> &str;

    /// Vendor quirk flags for this driver
    fn quirk(&self) -> VendorQuirk;
}

// =============================================================================
// Capacity Monitor Port
// =============================================================================

/// Port for the capacity monitoring endpoint
///
/// Used only under the `capacity` load-balancing policy.
#[async_trait]
pub trait CapacityMonitor: Send + Sync {
    /// Servers ranked best-first by disk-space-to-CPU-load ratio
    async fn servers_by_disk_space_to_cpu_ratio(
        &self,
        kind: StorageKind,
    ) -> Result<Vec<StorageServer>>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type DeviceDriverRef = Arc<dyn DeviceDriver>;
pub type CapacityMonitorRef = Arc<dyn CapacityMonitor>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(format!("{}", StorageKind::Nfs), "nfs");
        assert_eq!(format!("{}", StorageKind::Iscsi), "iscsi");
        assert_eq!(format!("{}", StorageKind::Export), "export");
    }

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in [
            StorageKind::Gluster,
            StorageKind::Nfs,
            StorageKind::Pnfs,
            StorageKind::Iscsi,
            StorageKind::Fcp,
            StorageKind::Local,
            StorageKind::Iso,
            StorageKind::Export,
        ] {
            assert_eq!(StorageKind::parse(&kind.to_string()), Some(kind));
        }
        assert_eq!(StorageKind::parse("ceph"), None);
    }

    #[test]
    fn test_kind_family() {
        assert_eq!(StorageKind::Gluster.family(), DeviceFamily::Nas);
        assert_eq!(StorageKind::Iso.family(), DeviceFamily::Nas);
        assert_eq!(StorageKind::Fcp.family(), DeviceFamily::Block);
        assert_eq!(StorageKind::Local.family(), DeviceFamily::Local);
    }

    #[test]
    fn test_iso_export_have_no_intrinsic_fs_type() {
        assert_eq!(StorageKind::Nfs.nas_fs_type(), Some("nfs"));
        assert_eq!(StorageKind::Iso.nas_fs_type(), None);
        assert_eq!(StorageKind::Export.nas_fs_type(), None);
    }

    #[test]
    fn test_device_identifier() {
        let dev = Device::Block {
            address: "10.0.0.3".into(),
            lun_id: "7".into(),
            target: "iqn.2026-01.lab:tgt1".into(),
            capacity: "100".into(),
            mappings: Vec::new(),
        };
        assert_eq!(dev.identifier(), "7@iqn.2026-01.lab:tgt1");
        assert_eq!(dev.address(), "10.0.0.3");
    }
}
