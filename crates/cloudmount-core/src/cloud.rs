//! PersonalCloud - the entry point for the root filesystem
//!
//! PersonalCloud owns the peer table, the provider set, the mount table and
//! the name cipher, and exposes the operations used by:
//! - the discovery layer (`on_peer_observed`, `on_peer_absent`, `encoded_name`)
//! - the provider-configuration layer (`add_provider`, `remove_provider`,
//!   `resync_providers`, `provider_records`)
//! - the serving layer (`list_root`, `resolve`, `mount`, `on_mounts_changed`)
//!
//! # Locking
//!
//! ```text
//! peers lock      PeerTable + peer reconciliation pass
//! providers lock  ProviderSet + provider reconciliation pass
//! MountTable      concurrent map, never blocks readers
//! ```
//!
//! The two locks are independent. Events are published only after the lock
//! that produced them has been released, so an observer may call straight
//! back into the cloud.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cloudmount_core::{LocalEndpointFactory, NameCipher, PersonalCloud, ProviderKind};
//!
//! let key = NameCipher::generate_key();
//! let cloud = PersonalCloud::new("Desk", &key, Arc::new(LocalEndpointFactory)).unwrap();
//!
//! assert!(cloud.add_provider("Scratch", ProviderKind::Memory, "", "private").unwrap());
//! assert_eq!(cloud.list_root()[0].name, "Scratch");
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CloudConfig;
use crate::crypto::{NameCipher, KEY_SIZE};
use crate::error::{CloudError, CloudResult};
use crate::events::{CloudEvent, EventBus, MountChanges};
use crate::fs::{DirEntry, EndpointFactory};
use crate::mounts::{MountEntry, MountInfo, MountTable, ResolvedPath};
use crate::peers::{MergeOutcome, PeerTable};
use crate::providers::{ProviderInstance, ProviderSet};
use crate::reconcile::{reconcile_peers, reconcile_providers};
use crate::types::{NodeId, PeerDescriptor, ProviderKind, ProviderRecord};

/// This node's display name and its lazily computed blob
struct LocalName {
    name: String,
    encoded: Option<Vec<u8>>,
}

/// Unified root filesystem over LAN peers and storage providers
pub struct PersonalCloud {
    /// Cipher for display names in discovery payloads
    cipher: NameCipher,
    /// Own display name (with cached encoded form)
    local_name: Mutex<LocalName>,
    /// Peer presence cache; its lock also covers the peer pass
    peers: Mutex<PeerTable>,
    /// Attached providers; its lock also covers the provider pass
    providers: Mutex<ProviderSet>,
    /// The root filesystem
    mounts: Arc<MountTable>,
    /// Builds peer and provider endpoints
    factory: Arc<dyn EndpointFactory>,
    /// Change notifications
    events: EventBus,
}

impl PersonalCloud {
    /// Create an empty cloud.
    ///
    /// # Errors
    ///
    /// Returns `CloudError::InvalidArgument` if `node_name` is empty.
    pub fn new(
        node_name: impl Into<String>,
        key: &[u8; KEY_SIZE],
        factory: Arc<dyn EndpointFactory>,
    ) -> CloudResult<Self> {
        let node_name = node_name.into();
        if node_name.trim().is_empty() {
            return Err(CloudError::InvalidArgument("node name is empty".to_string()));
        }
        info!(node_name = %node_name, "Initializing PersonalCloud");

        Ok(Self {
            cipher: NameCipher::new(key),
            local_name: Mutex::new(LocalName {
                name: node_name,
                encoded: None,
            }),
            peers: Mutex::new(PeerTable::new()),
            providers: Mutex::new(ProviderSet::new()),
            mounts: Arc::new(MountTable::new()),
            factory,
            events: EventBus::default(),
        })
    }

    /// Create a cloud from configuration and attach its providers.
    ///
    /// Providers that fail to build, or repeat an earlier name, are logged
    /// and skipped.
    ///
    /// # Errors
    ///
    /// Returns `CloudError::Config` for a bad master key and
    /// `CloudError::InvalidArgument` for an empty node name.
    pub fn from_config(config: &CloudConfig, factory: Arc<dyn EndpointFactory>) -> CloudResult<Self> {
        let key = config.master_key()?;
        let cloud = Self::new(config.node_name.clone(), &key, factory)?;

        {
            let mut providers = cloud.providers.lock();
            for record in &config.providers {
                if providers.contains_name(&record.name) {
                    warn!(provider = %record.name, "Duplicate provider in configuration; skipped");
                    continue;
                }
                match ProviderInstance::from_record(record, cloud.factory.as_ref()) {
                    Ok(instance) => {
                        providers.insert(instance);
                    }
                    Err(e) => {
                        warn!(provider = %record.name, error = %e, "Provider failed to construct; skipped");
                    }
                }
            }
            reconcile_providers(&providers, &cloud.mounts);
        }

        Ok(cloud)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Local Identity
    // ═══════════════════════════════════════════════════════════════════════

    /// This node's display name
    pub fn node_name(&self) -> String {
        self.local_name.lock().name.clone()
    }

    /// Change this node's display name.
    ///
    /// The next call to [`PersonalCloud::encoded_name`] produces a fresh blob.
    pub fn set_node_name(&self, name: impl Into<String>) -> CloudResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CloudError::InvalidArgument("node name is empty".to_string()));
        }
        let mut local = self.local_name.lock();
        local.name = name;
        local.encoded = None;
        Ok(())
    }

    /// Encoded display name for this node's outgoing discovery beacon.
    ///
    /// Computed once per display name and reused.
    pub fn encoded_name(&self) -> Vec<u8> {
        let mut local = self.local_name.lock();
        if let Some(encoded) = &local.encoded {
            return encoded.clone();
        }
        let encoded = self.cipher.encode(&local.name);
        local.encoded = Some(encoded.clone());
        encoded
    }

    /// Name cipher for this cloud's master key
    pub fn cipher(&self) -> &NameCipher {
        &self.cipher
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Peer Presence
    // ═══════════════════════════════════════════════════════════════════════

    /// Merge a discovery observation.
    ///
    /// Returns `Ok(true)` if the peer table changed. A blob that does not
    /// decode under this cloud's key is logged and ignored (`Ok(false)`).
    ///
    /// # Errors
    ///
    /// Returns `CloudError::InvalidArgument` for a nil node id.
    pub fn on_peer_observed(
        &self,
        node_id: NodeId,
        protocol_version: &str,
        endpoint_url: &str,
        encoded_name: &[u8],
        logical_timestamp: i64,
    ) -> CloudResult<bool> {
        if node_id.is_nil() {
            return Err(CloudError::InvalidArgument("node id is nil".to_string()));
        }

        let display_name = match self.cipher.decode(encoded_name) {
            Ok(name) => name,
            Err(e) => {
                warn!(%node_id, error = %e, "Ignoring peer with undecodable name");
                return Ok(false);
            }
        };

        let descriptor = PeerDescriptor {
            node_id,
            protocol_version: protocol_version.to_string(),
            logical_timestamp,
            endpoint_url: endpoint_url.to_string(),
            display_name,
        };

        let event = {
            let mut peers = self.peers.lock();
            let outcome = peers.merge(descriptor);
            if !outcome.changed() {
                debug!(%node_id, logical_timestamp, "Stale or duplicate peer observation");
                return Ok(false);
            }
            let changes = reconcile_peers(&peers, &self.mounts, self.factory.as_ref());
            CloudEvent::PeersChanged {
                peer_count: peers.len(),
                mounts: changes,
            }
        };

        self.events.publish(event);
        Ok(true)
    }

    /// Forget every cached peer not in `observed`.
    ///
    /// Returns how many peers were removed.
    pub fn on_peer_absent(&self, observed: &HashSet<NodeId>) -> usize {
        let (removed, event) = {
            let mut peers = self.peers.lock();
            let removed = peers.retain_observed(observed);
            if removed.is_empty() {
                return 0;
            }
            for peer in &removed {
                debug!(node_id = %peer.node_id, "Peer no longer observed");
            }
            let changes = reconcile_peers(&peers, &self.mounts, self.factory.as_ref());
            (
                removed.len(),
                CloudEvent::PeersChanged {
                    peer_count: peers.len(),
                    mounts: changes,
                },
            )
        };

        self.events.publish(event);
        removed
    }

    /// Insert a peer learned out of band (invite or share flow).
    ///
    /// Uses the same last-writer-wins merge as discovery but always runs
    /// reconciliation, so a peer whose endpoint failed earlier gets another
    /// try. An event is published only when the table or the mounts changed.
    ///
    /// # Errors
    ///
    /// Returns `CloudError::InvalidArgument` for a nil node id or an empty
    /// name.
    pub fn on_peer_added(
        &self,
        node_id: NodeId,
        endpoint_url: &str,
        protocol_version: &str,
        name: &str,
        logical_timestamp: i64,
    ) -> CloudResult<MergeOutcome> {
        if node_id.is_nil() {
            return Err(CloudError::InvalidArgument("node id is nil".to_string()));
        }
        if name.trim().is_empty() {
            return Err(CloudError::InvalidArgument("peer name is empty".to_string()));
        }

        let descriptor = PeerDescriptor {
            node_id,
            protocol_version: protocol_version.to_string(),
            logical_timestamp,
            endpoint_url: endpoint_url.to_string(),
            display_name: name.to_string(),
        };

        let (outcome, event) = {
            let mut peers = self.peers.lock();
            let outcome = peers.merge(descriptor);
            let changes = reconcile_peers(&peers, &self.mounts, self.factory.as_ref());
            let event = (outcome.changed() || !changes.is_empty()).then(|| {
                CloudEvent::PeersChanged {
                    peer_count: peers.len(),
                    mounts: changes,
                }
            });
            (outcome, event)
        };

        info!(%node_id, ?outcome, "Peer added out of band");
        if let Some(event) = event {
            self.events.publish(event);
        }
        Ok(outcome)
    }

    /// Cached peers, sorted by node id
    pub fn peers(&self) -> Vec<PeerDescriptor> {
        self.peers.lock().list()
    }

    /// A single cached peer
    pub fn peer(&self, node_id: &NodeId) -> Option<PeerDescriptor> {
        self.peers.lock().get(node_id).cloned()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Providers
    // ═══════════════════════════════════════════════════════════════════════

    /// Attach a storage provider.
    ///
    /// Returns `Ok(false)` without changing anything when a provider with the
    /// same name (ignoring case) exists, or when its endpoint cannot be built.
    ///
    /// # Errors
    ///
    /// Returns `CloudError::InvalidArgument` for an empty name.
    pub fn add_provider(
        &self,
        name: &str,
        kind: ProviderKind,
        settings: &str,
        visibility: &str,
    ) -> CloudResult<bool> {
        if name.trim().is_empty() {
            return Err(CloudError::InvalidArgument("provider name is empty".to_string()));
        }

        let event = {
            let mut providers = self.providers.lock();
            if providers.contains_name(name) {
                debug!(provider = %name, "Provider name already in use");
                return Ok(false);
            }

            let instance =
                match ProviderInstance::build(name, kind, settings, visibility, self.factory.as_ref()) {
                    Ok(instance) => instance,
                    Err(e) => {
                        warn!(provider = %name, %kind, error = %e, "Provider failed to construct");
                        return Ok(false);
                    }
                };
            info!(provider = %name, %kind, runtime_id = %instance.runtime_id(), "Provider added");
            providers.insert(instance);

            let changes = reconcile_providers(&providers, &self.mounts);
            CloudEvent::ProvidersChanged {
                provider_count: providers.len(),
                mounts: changes,
            }
        };

        self.events.publish(event);
        Ok(true)
    }

    /// Detach a storage provider by name, ignoring case.
    ///
    /// Returns `Ok(false)` when no such provider exists.
    ///
    /// # Errors
    ///
    /// Returns `CloudError::InvalidArgument` for an empty name.
    pub fn remove_provider(&self, name: &str) -> CloudResult<bool> {
        if name.trim().is_empty() {
            return Err(CloudError::InvalidArgument("provider name is empty".to_string()));
        }

        let event = {
            let mut providers = self.providers.lock();
            let Some(instance) = providers.remove(name) else {
                debug!(provider = %name, "No provider to remove");
                return Ok(false);
            };
            info!(provider = %instance.name(), runtime_id = %instance.runtime_id(), "Provider removed");

            let changes = reconcile_providers(&providers, &self.mounts);
            CloudEvent::ProvidersChanged {
                provider_count: providers.len(),
                mounts: changes,
            }
        };

        self.events.publish(event);
        Ok(true)
    }

    /// Run a full provider reconciliation pass.
    ///
    /// Publishes an event only if a mount changed.
    pub fn resync_providers(&self) -> MountChanges {
        let (changes, provider_count) = {
            let providers = self.providers.lock();
            (reconcile_providers(&providers, &self.mounts), providers.len())
        };

        if !changes.is_empty() {
            self.events.publish(CloudEvent::ProvidersChanged {
                provider_count,
                mounts: changes.clone(),
            });
        }
        changes
    }

    /// Attached provider instances, in insertion order
    pub fn providers(&self) -> Vec<ProviderInstance> {
        self.providers.lock().iter().cloned().collect()
    }

    /// Records for every attached provider, ready to persist
    pub fn provider_records(&self) -> Vec<ProviderRecord> {
        self.providers.lock().records()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Root Filesystem
    // ═══════════════════════════════════════════════════════════════════════

    /// Shared handle to the mount table for the serving layer
    pub fn mount_table(&self) -> Arc<MountTable> {
        self.mounts.clone()
    }

    /// All mounts, sorted by name
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.mounts.snapshot()
    }

    /// A mount by exact name
    pub fn mount(&self, name: &str) -> Option<MountEntry> {
        self.mounts.get(name)
    }

    /// Root directory listing
    pub fn list_root(&self) -> Vec<DirEntry> {
        self.mounts.list_root()
    }

    /// Resolve a request path to its mount and the path inside it
    pub fn resolve(&self, path: &str) -> Option<ResolvedPath> {
        self.mounts.resolve(path)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Events
    // ═══════════════════════════════════════════════════════════════════════

    /// Subscribe to change events
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut events = cloud.subscribe_events();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         println!("root changed: {:?}", event.mounts());
    ///     }
    /// });
    /// ```
    pub fn subscribe_events(&self) -> broadcast::Receiver<CloudEvent> {
        self.events.subscribe()
    }

    /// Call `callback` on a background task for every change event.
    ///
    /// A panic inside the callback is contained; later events still arrive.
    ///
    /// # Errors
    ///
    /// Returns `CloudError::Config` when called outside a Tokio runtime.
    pub fn on_mounts_changed<F>(&self, callback: F) -> CloudResult<JoinHandle<()>>
    where
        F: Fn(CloudEvent) + Send + 'static,
    {
        self.events.on_event(callback)
    }
}

impl std::fmt::Debug for PersonalCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonalCloud")
            .field("node_name", &self.local_name.lock().name)
            .field("peers", &self.peers.lock().len())
            .field("providers", &self.providers.lock().len())
            .field("mounts", &self.mounts.len())
            .finish_non_exhaustive()
    }
}
