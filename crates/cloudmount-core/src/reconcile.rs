//! Derives the mount table from the peer table and the provider set
//!
//! Two independent passes, each run by `PersonalCloud` while holding the lock
//! of its source collection:
//!
//! - **peer pass**: sweep mounts of forgotten nodes, then mount new nodes and
//!   refresh stale ones (re-keying on a display name change)
//! - **provider pass**: drop mounts of removed instances, mount new instances
//!
//! A mount that is renamed keeps its node id and its endpoint handle; only
//! the key moves.

use tracing::{info, warn};

use crate::events::MountChanges;
use crate::fs::EndpointFactory;
use crate::mounts::{MountEntry, MountTable, PeerEndpoint, ProviderEndpoint};
use crate::peers::PeerTable;
use crate::providers::ProviderSet;

/// Bring every peer mount in line with `peers`.
pub fn reconcile_peers(
    peers: &PeerTable,
    mounts: &MountTable,
    factory: &dyn EndpointFactory,
) -> MountChanges {
    let mut changes = MountChanges::default();

    // Sweep first so names freed by departed nodes are available below.
    for (name, node_id) in mounts.peer_mounts() {
        if !peers.contains(&node_id) && mounts.remove(&name).is_some() {
            info!(mount = %name, %node_id, "Unmounted departed peer");
            changes.removed.push(name);
        }
    }

    for peer in peers.iter() {
        let Some(current) = mounts.find_peer(peer.node_id) else {
            match factory.peer_endpoint(peer) {
                Ok(fs) => {
                    let name =
                        mounts.insert_unique(&peer.display_name, MountEntry::peer(peer.into(), fs));
                    info!(mount = %name, node_id = %peer.node_id, url = %peer.endpoint_url, "Mounted peer");
                    changes.added.push(name);
                }
                Err(e) => {
                    warn!(node_id = %peer.node_id, error = %e, "Peer endpoint unavailable; left unmounted");
                }
            }
            continue;
        };

        if current.endpoint.logical_timestamp >= peer.logical_timestamp {
            continue;
        }

        let fs = if current.endpoint.endpoint_url == peer.endpoint_url {
            current.fs
        } else {
            match factory.peer_endpoint(peer) {
                Ok(fs) => fs,
                Err(e) => {
                    warn!(node_id = %peer.node_id, error = %e, "Peer endpoint moved and could not be rebuilt; unmounting");
                    if mounts.remove(&current.name).is_some() {
                        changes.removed.push(current.name);
                    }
                    continue;
                }
            }
        };

        let entry = MountEntry::peer(PeerEndpoint::from(peer), fs);
        if current.endpoint.display_name != peer.display_name {
            let name = mounts.rekey(&current.name, &peer.display_name, entry);
            if name == current.name {
                changes.updated.push(name);
            } else {
                info!(from = %current.name, to = %name, node_id = %peer.node_id, "Renamed peer mount");
                changes.renamed.push((current.name, name));
            }
        } else {
            mounts.replace(&current.name, entry);
            changes.updated.push(current.name);
        }
    }

    changes
}

/// Bring every provider mount in line with `providers`.
pub fn reconcile_providers(providers: &ProviderSet, mounts: &MountTable) -> MountChanges {
    let mut changes = MountChanges::default();

    for (name, runtime_id) in mounts.provider_mounts() {
        if !providers.contains_runtime_id(runtime_id) && mounts.remove(&name).is_some() {
            info!(mount = %name, %runtime_id, "Unmounted provider");
            changes.removed.push(name);
        }
    }

    for instance in providers.iter() {
        if mounts.find_provider(instance.runtime_id()).is_some() {
            continue;
        }
        let endpoint = ProviderEndpoint {
            runtime_id: instance.runtime_id(),
            kind: instance.kind(),
            visibility: instance.visibility().to_string(),
        };
        let entry = MountEntry::provider(endpoint, instance.endpoint().clone());
        let name = mounts.insert_unique(instance.name(), entry);
        info!(mount = %name, kind = %instance.kind(), "Mounted provider");
        changes.added.push(name);
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CloudError, CloudResult};
    use crate::fs::{Endpoint, LocalEndpointFactory, MemoryFs};
    use crate::providers::ProviderInstance;
    use crate::types::{NodeId, PeerDescriptor, ProviderKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Builds memory endpoints for peers, refusing URLs containing "offline"
    #[derive(Default)]
    struct PeerFactory {
        built: AtomicUsize,
    }

    impl EndpointFactory for PeerFactory {
        fn peer_endpoint(&self, peer: &PeerDescriptor) -> CloudResult<Endpoint> {
            if peer.endpoint_url.contains("offline") {
                return Err(CloudError::EndpointConstruction(peer.endpoint_url.clone()));
            }
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MemoryFs::new()))
        }

        fn provider_endpoint(
            &self,
            kind: ProviderKind,
            settings: &str,
            visibility: &str,
        ) -> CloudResult<Endpoint> {
            LocalEndpointFactory.provider_endpoint(kind, settings, visibility)
        }
    }

    fn peer(node_id: NodeId, ts: i64, name: &str) -> PeerDescriptor {
        PeerDescriptor {
            node_id,
            protocol_version: "1".to_string(),
            logical_timestamp: ts,
            endpoint_url: "http://10.0.0.3:5680".to_string(),
            display_name: name.to_string(),
        }
    }

    #[test]
    fn test_new_peers_mount_with_collision_names() {
        let factory = PeerFactory::default();
        let mounts = MountTable::new();
        let mut peers = PeerTable::new();
        let ids: Vec<NodeId> = (0..3).map(|_| NodeId::new()).collect();
        for id in &ids {
            peers.merge(peer(*id, 1, "X"));
        }

        let changes = reconcile_peers(&peers, &mounts, &factory);
        assert_eq!(changes.added.len(), 3);
        assert_eq!(mounts.names(), vec!["X", "X(2)", "X(3)"]);
        for id in ids {
            assert!(mounts.find_peer(id).is_some());
        }
    }

    #[test]
    fn test_current_mount_is_noop() {
        let factory = PeerFactory::default();
        let mounts = MountTable::new();
        let mut peers = PeerTable::new();
        peers.merge(peer(NodeId::new(), 5, "Desk"));

        reconcile_peers(&peers, &mounts, &factory);
        let changes = reconcile_peers(&peers, &mounts, &factory);
        assert!(changes.is_empty());
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_mount_updates_in_place() {
        let factory = PeerFactory::default();
        let mounts = MountTable::new();
        let mut peers = PeerTable::new();
        let id = NodeId::new();
        peers.merge(peer(id, 1, "Desk"));
        reconcile_peers(&peers, &mounts, &factory);
        let before = mounts.find_peer(id).unwrap();

        peers.merge(peer(id, 2, "Desk"));
        let changes = reconcile_peers(&peers, &mounts, &factory);

        assert_eq!(changes.updated, vec!["Desk".to_string()]);
        let after = mounts.find_peer(id).unwrap();
        assert_eq!(after.endpoint.logical_timestamp, 2);
        assert!(Arc::ptr_eq(&before.fs, &after.fs));
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_url_change_rebuilds_endpoint() {
        let factory = PeerFactory::default();
        let mounts = MountTable::new();
        let mut peers = PeerTable::new();
        let id = NodeId::new();
        peers.merge(peer(id, 1, "Desk"));
        reconcile_peers(&peers, &mounts, &factory);
        let before = mounts.find_peer(id).unwrap();

        let mut moved = peer(id, 2, "Desk");
        moved.endpoint_url = "http://10.0.0.99:5680".to_string();
        peers.merge(moved);
        reconcile_peers(&peers, &mounts, &factory);

        let after = mounts.find_peer(id).unwrap();
        assert_eq!(after.endpoint.endpoint_url, "http://10.0.0.99:5680");
        assert!(!Arc::ptr_eq(&before.fs, &after.fs));
        assert_eq!(factory.built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rename_preserves_identity_and_endpoint() {
        let factory = PeerFactory::default();
        let mounts = MountTable::new();
        let mut peers = PeerTable::new();
        let id = NodeId::new();
        peers.merge(peer(id, 1, "Old"));
        reconcile_peers(&peers, &mounts, &factory);
        let before = mounts.find_peer(id).unwrap();

        peers.merge(peer(id, 2, "New"));
        let changes = reconcile_peers(&peers, &mounts, &factory);

        assert_eq!(changes.renamed, vec![("Old".to_string(), "New".to_string())]);
        assert!(!mounts.contains("Old"));
        let after = mounts.find_peer(id).unwrap();
        assert_eq!(after.name, "New");
        assert!(Arc::ptr_eq(&before.fs, &after.fs));
        assert_eq!(mounts.len(), 1);
    }

    #[test]
    fn test_sweep_removes_orphans() {
        let factory = PeerFactory::default();
        let mounts = MountTable::new();
        let mut peers = PeerTable::new();
        let id = NodeId::new();
        peers.merge(peer(id, 1, "Gone"));
        reconcile_peers(&peers, &mounts, &factory);

        peers.remove(&id);
        let changes = reconcile_peers(&peers, &mounts, &factory);
        assert_eq!(changes.removed, vec!["Gone".to_string()]);
        assert!(mounts.is_empty());
    }

    #[test]
    fn test_sweep_frees_name_for_newcomer() {
        let factory = PeerFactory::default();
        let mounts = MountTable::new();
        let mut peers = PeerTable::new();
        let first = NodeId::new();
        peers.merge(peer(first, 1, "Home"));
        reconcile_peers(&peers, &mounts, &factory);

        peers.remove(&first);
        let second = NodeId::new();
        peers.merge(peer(second, 1, "Home"));
        reconcile_peers(&peers, &mounts, &factory);

        assert_eq!(mounts.find_peer(second).unwrap().name, "Home");
        assert_eq!(mounts.len(), 1);
    }

    #[test]
    fn test_unbuildable_peer_stays_unmounted_and_retries() {
        let factory = PeerFactory::default();
        let mounts = MountTable::new();
        let mut peers = PeerTable::new();
        let id = NodeId::new();
        let mut offline = peer(id, 1, "Flaky");
        offline.endpoint_url = "http://offline".to_string();
        peers.merge(offline);

        let changes = reconcile_peers(&peers, &mounts, &factory);
        assert!(changes.is_empty());
        assert!(mounts.is_empty());

        peers.merge(peer(id, 2, "Flaky"));
        reconcile_peers(&peers, &mounts, &factory);
        assert_eq!(mounts.find_peer(id).unwrap().name, "Flaky");
    }

    #[test]
    fn test_provider_pass_adds_and_removes() {
        let mounts = MountTable::new();
        let mut providers = ProviderSet::new();
        let instance =
            ProviderInstance::build("Scratch", ProviderKind::Memory, "", "", &LocalEndpointFactory)
                .unwrap();
        let runtime_id = instance.runtime_id();
        providers.insert(instance);

        let changes = reconcile_providers(&providers, &mounts);
        assert_eq!(changes.added, vec!["Scratch".to_string()]);
        assert_eq!(mounts.find_provider(runtime_id), Some("Scratch".to_string()));

        assert!(reconcile_providers(&providers, &mounts).is_empty());

        providers.remove("scratch");
        let changes = reconcile_providers(&providers, &mounts);
        assert_eq!(changes.removed, vec!["Scratch".to_string()]);
        assert!(mounts.is_empty());
    }

    #[test]
    fn test_provider_collides_with_peer_name() {
        let factory = PeerFactory::default();
        let mounts = MountTable::new();
        let mut peers = PeerTable::new();
        peers.merge(peer(NodeId::new(), 1, "Backup"));
        reconcile_peers(&peers, &mounts, &factory);

        let mut providers = ProviderSet::new();
        providers.insert(
            ProviderInstance::build("Backup", ProviderKind::Memory, "", "", &LocalEndpointFactory)
                .unwrap(),
        );
        let changes = reconcile_providers(&providers, &mounts);
        assert_eq!(changes.added, vec!["Backup(2)".to_string()]);

        // Peer pass must never touch the provider mount
        let changes = reconcile_peers(&PeerTable::new(), &mounts, &factory);
        assert_eq!(changes.removed, vec!["Backup".to_string()]);
        assert_eq!(mounts.names(), vec!["Backup(2)"]);
    }
}
