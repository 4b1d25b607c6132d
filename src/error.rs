//! Error types for the storage provisioner
//!
//! Provides structured error types for all provisioner components including
//! server selection, device provisioning, configuration and cleanup.

use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Config Store Errors
    // =========================================================================
    #[error("Config key not found: {section}.{key}")]
    KeyNotFound { section: String, key: String },

    #[error("Config value for {section}.{key} has the wrong shape: expected {expected}")]
    ValueType {
        section: String,
        key: String,
        expected: &'static str,
    },

    // =========================================================================
    // Monitoring Errors
    // =========================================================================
    #[error("Monitoring connection error: {0}")]
    MonitoringConnection(#[from] reqwest::Error),

    #[error("Monitoring query error: {0}")]
    MonitoringQuery(String),

    #[error("Monitoring response parse error: {0}")]
    MonitoringResponseParse(String),

    // =========================================================================
    // Server Selection Errors
    // =========================================================================
    #[error("Server selection failed for kind {kind}: {reason}")]
    ServerSelection { kind: String, reason: String },

    // =========================================================================
    // Device Provisioning Errors
    // =========================================================================
    #[error("Device provisioning failed for {kind} section {target}: {reason}")]
    DeviceProvisioning {
        kind: String,
        target: String,
        reason: String,
    },

    #[error("Local storage path already exists: {path}")]
    FileAlreadyExists { path: String },

    #[error("LUN not found: {lun_id}")]
    LunNotFound { lun_id: String },

    #[error("No host group found for initiator: {initiator}")]
    HostGroupNotFound { initiator: String },

    #[error("Device removal failed for {device}: {reason}")]
    DeviceRemoval { device: String, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is the idempotent local-create collision
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::FileAlreadyExists { .. })
    }

    /// Check if this error is a per-kind selection failure
    ///
    /// Selection failures are fatal for that kind's sections only; the
    /// allocator skips them and continues with the remaining kinds.
    pub fn is_selection(&self) -> bool {
        matches!(
            self,
            Error::ServerSelection { .. }
                | Error::MonitoringConnection(_)
                | Error::MonitoringQuery(_)
                | Error::MonitoringResponseParse(_)
        )
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_predicate() {
        let err = Error::FileAlreadyExists {
            path: "/mnt/local_1".into(),
        };
        assert!(err.is_already_exists());
        assert!(!err.is_selection());

        let err = Error::DeviceProvisioning {
            kind: "nfs".into(),
            target: "storage.data_domain".into(),
            reason: "export failed".into(),
        };
        assert!(!err.is_already_exists());
    }

    #[test]
    fn test_selection_predicate() {
        let err = Error::ServerSelection {
            kind: "iscsi".into(),
            reason: "no capacity data".into(),
        };
        assert!(err.is_selection());

        let err = Error::MonitoringQuery("empty result".into());
        assert!(err.is_selection());

        let err = Error::Configuration("bad section".into());
        assert!(!err.is_selection());
    }
}
