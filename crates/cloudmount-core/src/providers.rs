//! Configured storage providers attached to the cloud
//!
//! Each [`ProviderInstance`] gets a fresh runtime id when it is built. Provider
//! mounts refer back to their instance by that id only, so removing an
//! instance can never leave a mount pointing at freed state.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CloudResult;
use crate::fs::{Endpoint, EndpointFactory};
use crate::types::{provider_names_equal, ProviderKind, ProviderRecord};

/// Identifier of a provider instance, valid for the life of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuntimeId(pub Uuid);

impl RuntimeId {
    /// Generate a new runtime id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuntimeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A constructed storage provider
#[derive(Debug, Clone)]
pub struct ProviderInstance {
    runtime_id: RuntimeId,
    name: String,
    kind: ProviderKind,
    visibility: String,
    settings: String,
    endpoint: Endpoint,
}

impl ProviderInstance {
    /// Build an instance, constructing its endpoint through `factory`.
    ///
    /// Fails when the factory rejects the settings; nothing is retained then.
    pub fn build(
        name: impl Into<String>,
        kind: ProviderKind,
        settings: impl Into<String>,
        visibility: impl Into<String>,
        factory: &dyn EndpointFactory,
    ) -> CloudResult<Self> {
        let settings = settings.into();
        let visibility = visibility.into();
        let endpoint = factory.provider_endpoint(kind, &settings, &visibility)?;

        Ok(Self {
            runtime_id: RuntimeId::new(),
            name: name.into(),
            kind,
            visibility,
            settings,
            endpoint,
        })
    }

    /// Build from a persisted record
    pub fn from_record(record: &ProviderRecord, factory: &dyn EndpointFactory) -> CloudResult<Self> {
        let settings = if record.settings.is_null() {
            String::new()
        } else {
            serde_json::to_string(&record.settings)?
        };
        Self::build(
            record.name.clone(),
            record.kind,
            settings,
            record.visibility.clone(),
            factory,
        )
    }

    /// Runtime id
    pub fn runtime_id(&self) -> RuntimeId {
        self.runtime_id
    }

    /// Mount name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider kind
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Visibility tag
    pub fn visibility(&self) -> &str {
        &self.visibility
    }

    /// Serialized settings
    pub fn settings(&self) -> &str {
        &self.settings
    }

    /// Endpoint handle shared with the instance's mount
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Persistable record for this instance
    pub fn to_record(&self) -> ProviderRecord {
        let settings = if self.settings.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&self.settings)
                .unwrap_or_else(|_| serde_json::Value::String(self.settings.clone()))
        };
        ProviderRecord {
            kind: self.kind,
            name: self.name.clone(),
            visibility: self.visibility.clone(),
            settings,
        }
    }

    /// Whether this instance answers to `name`, ignoring case
    pub fn matches_name(&self, name: &str) -> bool {
        provider_names_equal(&self.name, name)
    }
}

/// Provider instances keyed by case-insensitive name
#[derive(Debug, Default)]
pub struct ProviderSet {
    instances: Vec<ProviderInstance>,
}

impl ProviderSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an instance with this name exists, ignoring case
    pub fn contains_name(&self, name: &str) -> bool {
        self.instances.iter().any(|p| p.matches_name(name))
    }

    /// Insert an instance; returns false when the name is taken
    pub fn insert(&mut self, instance: ProviderInstance) -> bool {
        if self.contains_name(&instance.name) {
            return false;
        }
        self.instances.push(instance);
        true
    }

    /// Remove the instance with this name, ignoring case
    pub fn remove(&mut self, name: &str) -> Option<ProviderInstance> {
        let idx = self.instances.iter().position(|p| p.matches_name(name))?;
        Some(self.instances.remove(idx))
    }

    /// Find by name, ignoring case
    pub fn find(&self, name: &str) -> Option<&ProviderInstance> {
        self.instances.iter().find(|p| p.matches_name(name))
    }

    /// Find by runtime id
    pub fn get(&self, runtime_id: RuntimeId) -> Option<&ProviderInstance> {
        self.instances.iter().find(|p| p.runtime_id == runtime_id)
    }

    /// Whether an instance with this runtime id exists
    pub fn contains_runtime_id(&self, runtime_id: RuntimeId) -> bool {
        self.get(runtime_id).is_some()
    }

    /// Iterate instances in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &ProviderInstance> {
        self.instances.iter()
    }

    /// Records for every instance, in insertion order
    pub fn records(&self) -> Vec<ProviderRecord> {
        self.instances.iter().map(ProviderInstance::to_record).collect()
    }

    /// Number of instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use crate::fs::LocalEndpointFactory;

    fn memory(name: &str) -> ProviderInstance {
        ProviderInstance::build(name, ProviderKind::Memory, "", "private", &LocalEndpointFactory)
            .unwrap()
    }

    #[test]
    fn test_build_assigns_unique_runtime_ids() {
        let a = memory("a");
        let b = memory("a");
        assert_ne!(a.runtime_id(), b.runtime_id());
    }

    #[test]
    fn test_build_failure_propagates() {
        let result = ProviderInstance::build(
            "cloud",
            ProviderKind::AzureBlob,
            "{}",
            "",
            &LocalEndpointFactory,
        );
        assert!(matches!(result, Err(CloudError::EndpointConstruction(_))));

        let result =
            ProviderInstance::build("bad", ProviderKind::Memory, "[]", "", &LocalEndpointFactory);
        assert!(result.is_err());
    }

    #[test]
    fn test_insert_rejects_case_insensitive_duplicate() {
        let mut set = ProviderSet::new();
        assert!(set.insert(memory("Backup")));
        assert!(!set.insert(memory("backup")));
        assert!(!set.insert(memory("BACKUP")));
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().name(), "Backup");
    }

    #[test]
    fn test_remove_ignores_case() {
        let mut set = ProviderSet::new();
        set.insert(memory("Photos"));

        assert!(set.remove("missing").is_none());
        let removed = set.remove("PHOTOS").unwrap();
        assert_eq!(removed.name(), "Photos");
        assert!(set.is_empty());
    }

    #[test]
    fn test_lookup_by_runtime_id() {
        let mut set = ProviderSet::new();
        let instance = memory("Scratch");
        let id = instance.runtime_id();
        set.insert(instance);

        assert!(set.contains_runtime_id(id));
        assert_eq!(set.get(id).unwrap().name(), "Scratch");
        assert!(!set.contains_runtime_id(RuntimeId::new()));
    }

    #[test]
    fn test_unicode_names_compare_case_insensitively() {
        let mut set = ProviderSet::new();
        assert!(set.insert(memory("Ärchiv")));
        assert!(set.contains_name("ärchiv"));
        assert!(set.find("ÄRCHIV").is_some());
    }

    #[test]
    fn test_record_roundtrip_keeps_settings() {
        let record = ProviderRecord::new(ProviderKind::Memory, "scratch")
            .with_visibility("shared")
            .with_settings(serde_json::json!({"files": {"/a": "b"}}));

        let instance = ProviderInstance::from_record(&record, &LocalEndpointFactory).unwrap();
        assert_eq!(instance.visibility(), "shared");
        assert_eq!(instance.to_record(), record);
    }

    #[test]
    fn test_record_with_null_settings() {
        let record = ProviderRecord::new(ProviderKind::Memory, "scratch");
        let instance = ProviderInstance::from_record(&record, &LocalEndpointFactory).unwrap();
        assert_eq!(instance.settings(), "");
        assert!(instance.to_record().settings.is_null());
    }
}
