//! Core types for cloudmount

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a node in the cloud
///
/// Nodes keep the same id across restarts; it is the key of the peer table
/// and the identity of a peer mount, independent of its display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random NodeId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// The nil id is never a valid node
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Most recently seen state of a remote peer node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Stable node identifier
    pub node_id: NodeId,
    /// Version tag of the peer's cloud software
    pub protocol_version: String,
    /// Beacon timestamp used as the last-writer-wins tie-breaker
    pub logical_timestamp: i64,
    /// Where the peer's filesystem endpoint is reachable
    pub endpoint_url: String,
    /// Decoded human-readable name
    pub display_name: String,
}

/// Kind of storage provider backing a mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Azure Blob Storage container (client supplied by the embedder)
    AzureBlob,
    /// In-process scratch filesystem
    Memory,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::AzureBlob => write!(f, "AzureBlob"),
            ProviderKind::Memory => write!(f, "Memory"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "azureblob" | "azure-blob" | "azure" => Ok(ProviderKind::AzureBlob),
            "memory" => Ok(ProviderKind::Memory),
            other => Err(format!("unknown provider kind: {}", other)),
        }
    }
}

/// Whether two provider names refer to the same provider (case-insensitive)
pub fn provider_names_equal(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Persisted shape of a configured storage provider
///
/// Supplied by configuration loading and handed back by
/// `PersonalCloud::provider_records` so the live set can be saved again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Provider discriminator
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    /// User-facing mount name
    pub name: String,
    /// Access-scope tag, opaque to the core
    #[serde(default)]
    pub visibility: String,
    /// Provider-specific configuration
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl ProviderRecord {
    /// Create a record with empty visibility and settings
    pub fn new(kind: ProviderKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            visibility: String::new(),
            settings: serde_json::Value::Null,
        }
    }

    /// Whether this record answers to `name`, ignoring case
    pub fn matches_name(&self, name: &str) -> bool {
        provider_names_equal(&self.name, name)
    }

    /// Set the visibility tag
    pub fn with_visibility(mut self, visibility: impl Into<String>) -> Self {
        self.visibility = visibility.into();
        self
    }

    /// Set the provider settings
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }
}
