//! Edge case and boundary condition tests
//!
//! These tests verify the cloud handles hostile beacons, odd names and
//! failing endpoints without corrupting its state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cbc::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use cloudmount_core::{
    CloudError, CloudResult, Endpoint, EndpointFactory, LocalEndpointFactory, MemoryFs,
    NameCipher, NodeId, PeerDescriptor, PersonalCloud, ProviderKind,
};

const KEY: [u8; 32] = [0x17; 32];

/// Peer endpoints that can be switched off
struct SwitchFactory {
    online: AtomicBool,
}

impl SwitchFactory {
    fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
        })
    }
}

impl EndpointFactory for SwitchFactory {
    fn peer_endpoint(&self, peer: &PeerDescriptor) -> CloudResult<Endpoint> {
        if self.online.load(Ordering::SeqCst) {
            Ok(Arc::new(MemoryFs::new()))
        } else {
            Err(CloudError::EndpointConstruction(peer.endpoint_url.clone()))
        }
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

fn create_cloud(online: bool) -> (PersonalCloud, Arc<SwitchFactory>) {
    let factory = SwitchFactory::new(online);
    let cloud = PersonalCloud::new("Desk", &KEY, factory.clone()).unwrap();
    (cloud, factory)
}

/// Encrypt an arbitrary plaintext the way name blobs are encrypted
fn raw_blob(plaintext: &[u8]) -> Vec<u8> {
    cbc::Encryptor::<aes::Aes256>::new(&KEY.into(), &[0u8; 16].into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

// ============================================================================
// Hostile Beacons
// ============================================================================

/// A blob with a tampered version byte is ignored
#[test]
fn test_tampered_version_is_ignored() {
    let (cloud, _) = create_cloud(true);
    let mut plaintext = vec![1, 2, 3, 4, 2];
    plaintext.extend("Home".encode_utf16().flat_map(u16::to_le_bytes));

    let blob = raw_blob(&plaintext);
    assert!(matches!(
        NameCipher::new(&KEY).decode(&blob),
        Err(CloudError::NameVersionUnsupported(2))
    ));
    assert!(!cloud
        .on_peer_observed(NodeId::new(), "1", "http://10.0.0.1:5680", &blob, 1)
        .unwrap());
    assert!(cloud.peers().is_empty());
}

/// Garbage, empty and truncated blobs never reach the table
#[test]
fn test_malformed_blobs_are_ignored() {
    let (cloud, _) = create_cloud(true);
    let good = cloud.encoded_name();

    let blobs: Vec<Vec<u8>> = vec![
        Vec::new(),
        vec![0u8; 7],
        good[..good.len() - 1].to_vec(),
        raw_blob(&[1, 2, 3, 4]),
        raw_blob(&[1, 2, 3, 4, 1, 0x41]),
    ];

    for blob in blobs {
        let changed = cloud
            .on_peer_observed(NodeId::new(), "1", "http://10.0.0.1:5680", &blob, 1)
            .unwrap();
        assert!(!changed);
    }
    assert!(cloud.peers().is_empty());
    assert!(cloud.mounts().is_empty());
}

/// A blob from another cloud leaves an existing peer untouched
#[test]
fn test_foreign_cloud_cannot_overwrite_peer() {
    let (cloud, _) = create_cloud(true);
    let id = NodeId::new();
    let ours = NameCipher::new(&KEY).encode("Home");
    let theirs = NameCipher::new(&[0x99; 32]).encode("Evil");

    cloud.on_peer_observed(id, "1", "http://10.0.0.1:5680", &ours, 1).unwrap();
    cloud.on_peer_observed(id, "1", "http://6.6.6.6:5680", &theirs, 100).unwrap();

    let peer = cloud.peer(&id).unwrap();
    assert_eq!(peer.display_name, "Home");
    assert_eq!(peer.logical_timestamp, 1);
}

// ============================================================================
// Names
// ============================================================================

/// Names that are not usable as path components are sanitized
#[test]
fn test_unusable_display_names() {
    let (cloud, _) = create_cloud(true);
    let cipher = NameCipher::new(&KEY);

    for (i, name) in ["a/b", "  ", "back\\slash", ".", ".."].iter().enumerate() {
        cloud
            .on_peer_observed(NodeId::new(), "1", "http://10.0.0.1:5680", &cipher.encode(name), i as i64)
            .unwrap();
    }

    let names: Vec<String> = cloud.list_root().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["Untitled", "_.", "_..", "a_b", "back_slash"]);

    for name in &names {
        let resolved = cloud.resolve(&format!("/{}/file", name)).unwrap();
        assert_eq!(&resolved.mount, name);
        assert_eq!(resolved.remainder, "/file");
    }
}

/// Non-BMP characters survive the UTF-16 round trip into a mount name
#[test]
fn test_emoji_display_name() {
    let (cloud, _) = create_cloud(true);
    let blob = NameCipher::new(&KEY).encode("Küche 🍳");

    cloud
        .on_peer_observed(NodeId::new(), "1", "http://10.0.0.1:5680", &blob, 1)
        .unwrap();
    assert!(cloud.mount("Küche 🍳").is_some());
}

/// Mount names are case-sensitive even though provider names are not
#[test]
fn test_mount_names_case_sensitive() {
    let (cloud, _) = create_cloud(true);
    let blob = NameCipher::new(&KEY).encode("home");
    cloud
        .on_peer_observed(NodeId::new(), "1", "http://10.0.0.1:5680", &blob, 1)
        .unwrap();
    cloud.add_provider("Home", ProviderKind::Memory, "", "").unwrap();

    assert!(cloud.mount("home").is_some());
    assert!(cloud.mount("Home").is_some());
}

/// Out-of-band inserts reject empty arguments
#[test]
fn test_peer_added_rejects_empty_arguments() {
    let (cloud, _) = create_cloud(true);
    let nil = NodeId::from_uuid(uuid::Uuid::nil());

    assert!(matches!(
        cloud.on_peer_added(nil, "http://10.0.0.1:5680", "1", "Home", 1),
        Err(CloudError::InvalidArgument(_))
    ));
    assert!(matches!(
        cloud.on_peer_added(NodeId::new(), "http://10.0.0.1:5680", "1", "", 1),
        Err(CloudError::InvalidArgument(_))
    ));
    assert!(cloud.peers().is_empty());
}

// ============================================================================
// Failing Endpoints
// ============================================================================

/// An unreachable peer stays cached and mounts on the next pass
#[test]
fn test_unbuildable_peer_mounts_later() {
    let (cloud, factory) = create_cloud(false);
    let id = NodeId::new();
    let cipher = NameCipher::new(&KEY);

    assert!(cloud
        .on_peer_observed(id, "1", "http://10.0.0.1:5680", &cipher.encode("Home"), 1)
        .unwrap());
    assert_eq!(cloud.peers().len(), 1);
    assert!(cloud.mounts().is_empty());

    factory.online.store(true, Ordering::SeqCst);
    cloud
        .on_peer_observed(id, "1", "http://10.0.0.1:5680", &cipher.encode("Home"), 2)
        .unwrap();
    assert!(cloud.mount("Home").is_some());
}

/// A peer that moves to an unreachable address is unmounted, not left stale
#[test]
fn test_moved_peer_unreachable() {
    let (cloud, factory) = create_cloud(true);
    let id = NodeId::new();
    let blob = NameCipher::new(&KEY).encode("Home");

    cloud.on_peer_observed(id, "1", "http://10.0.0.1:5680", &blob, 1).unwrap();
    factory.online.store(false, Ordering::SeqCst);
    cloud.on_peer_observed(id, "1", "http://10.0.0.2:5680", &blob, 2).unwrap();

    assert!(cloud.mount("Home").is_none());
    assert_eq!(cloud.peer(&id).unwrap().endpoint_url, "http://10.0.0.2:5680");
}

/// Malformed provider settings are swallowed
#[test]
fn test_bad_provider_settings() {
    let (cloud, _) = create_cloud(true);

    for settings in ["{broken", "[1]", r#"{"files": 5}"#] {
        assert!(!cloud
            .add_provider("Scratch", ProviderKind::Memory, settings, "")
            .unwrap());
    }
    assert!(cloud.providers().is_empty());

    // The name is still free afterwards
    assert!(cloud.add_provider("Scratch", ProviderKind::Memory, "", "").unwrap());
}

// ============================================================================
// Path Resolution
// ============================================================================

#[test]
fn test_resolve_edge_paths() {
    let (cloud, _) = create_cloud(true);
    cloud.add_provider("Scratch", ProviderKind::Memory, "", "").unwrap();

    assert!(cloud.resolve("").is_none());
    assert!(cloud.resolve("/").is_none());
    assert!(cloud.resolve("/Nope/a").is_none());
    assert!(cloud.resolve("/scratch").is_none());

    let resolved = cloud.resolve("//Scratch//a/./b/").unwrap();
    assert_eq!(resolved.mount, "Scratch");
    assert_eq!(resolved.remainder, "/a/b");

    let resolved = cloud.resolve("/Other/../Scratch/x").unwrap();
    assert_eq!(resolved.remainder, "/x");
}

/// Events need a runtime; the error says so instead of panicking
#[test]
fn test_observer_outside_runtime() {
    let (cloud, _) = create_cloud(true);
    assert!(matches!(
        cloud.on_mounts_changed(|_| {}),
        Err(CloudError::Config(_))
    ));
}
