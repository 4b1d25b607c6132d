//! Shared Configuration Store
//!
//! A nested section -> key -> value store persisted as YAML. Downstream test
//! fixtures re-read the same file, so every leaf is a string scalar or a
//! string list; typed interpretation happens at the parse layer.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// Config Value
// =============================================================================

/// A configuration leaf: a scalar string or an ordered list of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Scalar(String),
    List(Vec<String>),
}

impl ConfigValue {
    /// View the value as a list, promoting a scalar to a one-element list
    pub fn as_list(&self) -> Vec<String> {
        match self {
            ConfigValue::Scalar(s) => vec![s.clone()],
            ConfigValue::List(items) => items.clone(),
        }
    }

    /// View the value as a scalar, when it is one
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            ConfigValue::Scalar(s) => Some(s),
            ConfigValue::List(_) => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Scalar(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Scalar(s)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(items: Vec<String>) -> Self {
        ConfigValue::List(items)
    }
}

// =============================================================================
// Config Store
// =============================================================================

/// Nested section -> key -> value configuration store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigStore {
    sections: BTreeMap<String, BTreeMap<String, ConfigValue>>,
}

impl ConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a store from a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serialize the store to a YAML document
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Load a store from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Persist the store to a YAML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Whether a section exists
    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    /// Raw value lookup
    pub fn get(&self, section: &str, key: &str) -> Option<&ConfigValue> {
        self.sections.get(section).and_then(|keys| keys.get(key))
    }

    /// Scalar lookup; errors when the key is missing or holds a list
    pub fn get_scalar(&self, section: &str, key: &str) -> Result<&str> {
        match self.get(section, key) {
            Some(ConfigValue::Scalar(s)) => Ok(s),
            Some(ConfigValue::List(_)) => Err(Error::ValueType {
                section: section.to_string(),
                key: key.to_string(),
                expected: "scalar",
            }),
            None => Err(Error::KeyNotFound {
                section: section.to_string(),
                key: key.to_string(),
            }),
        }
    }

    /// Optional scalar lookup; empty strings count as absent
    pub fn get_scalar_opt(&self, section: &str, key: &str) -> Option<&str> {
        match self.get(section, key) {
            Some(ConfigValue::Scalar(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// List lookup, promoting a scalar to a one-element list; missing keys
    /// yield an empty list
    pub fn get_list(&self, section: &str, key: &str) -> Vec<String> {
        self.get(section, key).map(|v| v.as_list()).unwrap_or_default()
    }

    /// Parse a scalar as usize
    pub fn get_usize(&self, section: &str, key: &str) -> Result<usize> {
        let raw = self.get_scalar(section, key)?;
        raw.parse().map_err(|_| Error::ValueType {
            section: section.to_string(),
            key: key.to_string(),
            expected: "unsigned integer",
        })
    }

    /// Parse a scalar as bool ("true"/"false", "yes"/"no")
    pub fn get_bool(&self, section: &str, key: &str) -> Result<bool> {
        match self.get_scalar(section, key)? {
            "true" | "yes" => Ok(true),
            "false" | "no" => Ok(false),
            _ => Err(Error::ValueType {
                section: section.to_string(),
                key: key.to_string(),
                expected: "boolean",
            }),
        }
    }

    /// Set a value, creating the section when needed
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<ConfigValue>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Reset a key to an empty list
    ///
    /// The synchronizer's clean pass uses this so the subsequent append pass
    /// always finds a list to extend.
    pub fn reset_list(&mut self, section: &str, key: &str) {
        self.set(section, key, Vec::<String>::new());
    }

    /// Append a value to an existing list key
    ///
    /// The key must already exist as a list (possibly just emptied by
    /// [`ConfigStore::reset_list`]); appending to a scalar is a shape error.
    pub fn append(&mut self, section: &str, key: &str, value: impl Into<String>) -> Result<()> {
        match self
            .sections
            .get_mut(section)
            .and_then(|keys| keys.get_mut(key))
        {
            Some(ConfigValue::List(items)) => {
                items.push(value.into());
                Ok(())
            }
            Some(ConfigValue::Scalar(_)) => Err(Error::ValueType {
                section: section.to_string(),
                key: key.to_string(),
                expected: "list",
            }),
            None => Err(Error::KeyNotFound {
                section: section.to_string(),
                key: key.to_string(),
            }),
        }
    }

    /// Collapse a one-element list down to a scalar
    ///
    /// Legacy consumers expect a bare string when there is exactly one
    /// device. Lists of any other length are left untouched.
    pub fn collapse_single(&mut self, section: &str, key: &str) {
        if let Some(keys) = self.sections.get_mut(section) {
            if let Some(ConfigValue::List(items)) = keys.get(key) {
                if items.len() == 1 {
                    let single = items[0].clone();
                    keys.insert(key.to_string(), ConfigValue::Scalar(single));
                }
            }
        }
    }

    /// Iterate the keys of a section
    pub fn section_keys(&self, section: &str) -> Vec<String> {
        self.sections
            .get(section)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }
}
