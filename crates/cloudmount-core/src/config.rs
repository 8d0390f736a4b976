//! On-disk configuration for a personal cloud
//!
//! A single JSON document holding this node's display name, the cloud's
//! master key (hex) and the provider records to attach at startup:
//!
//! ```json
//! {
//!   "node_name": "Desk",
//!   "master_key": "00112233…",
//!   "providers": [
//!     { "type": "Memory", "name": "Scratch", "visibility": "private", "settings": null }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::{NameCipher, KEY_SIZE};
use crate::error::{CloudError, CloudResult};
use crate::types::ProviderRecord;

/// Persisted cloud configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// This node's display name
    pub node_name: String,
    /// Master key shared by every cloud member, hex encoded
    pub master_key: String,
    /// Providers attached at startup
    #[serde(default)]
    pub providers: Vec<ProviderRecord>,
}

impl CloudConfig {
    /// Fresh configuration with a newly generated master key
    pub fn generate(node_name: impl Into<String>) -> Self {
        Self::new(node_name, &NameCipher::generate_key())
    }

    /// Configuration for an existing key
    pub fn new(node_name: impl Into<String>, key: &[u8; KEY_SIZE]) -> Self {
        Self {
            node_name: node_name.into(),
            master_key: hex::encode(key),
            providers: Vec::new(),
        }
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> CloudResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> CloudResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a file
    pub fn load(path: impl AsRef<Path>) -> CloudResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CloudError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Write to a file, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> CloudResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Decode and validate the master key
    pub fn master_key(&self) -> CloudResult<[u8; KEY_SIZE]> {
        let bytes = hex::decode(self.master_key.trim())
            .map_err(|e| CloudError::Config(format!("master key is not hex: {}", e)))?;
        bytes.try_into().map_err(|bytes: Vec<u8>| {
            CloudError::Config(format!(
                "master key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;
    use tempfile::tempdir;

    #[test]
    fn test_generate_has_valid_key() {
        let config = CloudConfig::generate("Desk");
        assert_eq!(config.master_key.len(), KEY_SIZE * 2);
        assert!(config.master_key().is_ok());
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = CloudConfig::new("Laptop", &[7u8; KEY_SIZE]);
        config.providers.push(
            ProviderRecord::new(ProviderKind::Memory, "Scratch").with_visibility("private"),
        );
        config.save(&path).unwrap();

        let loaded = CloudConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.master_key().unwrap(), [7u8; KEY_SIZE]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = CloudConfig::load(dir.path().join("absent.json"));
        assert!(matches!(result, Err(CloudError::Config(_))));
    }

    #[test]
    fn test_from_json_defaults_providers() {
        let json = format!(r#"{{"node_name": "Desk", "master_key": "{}"}}"#, "ab".repeat(32));
        let config = CloudConfig::from_json(&json).unwrap();
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_from_json_reads_provider_type() {
        let json = format!(
            r#"{{"node_name": "Desk", "master_key": "{}",
                "providers": [{{"type": "AzureBlob", "name": "Archive", "settings": {{"container": "c"}}}}]}}"#,
            "00".repeat(32)
        );
        let config = CloudConfig::from_json(&json).unwrap();
        assert_eq!(config.providers[0].kind, ProviderKind::AzureBlob);
        assert_eq!(config.providers[0].visibility, "");
        assert_eq!(config.providers[0].settings["container"], "c");
    }

    #[test]
    fn test_bad_master_key() {
        let mut config = CloudConfig::generate("Desk");

        config.master_key = "not hex".to_string();
        assert!(matches!(config.master_key(), Err(CloudError::Config(_))));

        config.master_key = "abcd".to_string();
        assert!(matches!(config.master_key(), Err(CloudError::Config(_))));
    }
}
