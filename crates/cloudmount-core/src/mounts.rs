//! The root filesystem's mount table
//!
//! A concurrent name → endpoint map. The serving layer reads it at any time
//! to resolve the first component of a request path; only the reconciliation
//! passes write to it.
//!
//! ## Naming
//!
//! ```text
//! desired "Home"  →  "Home" if free
//!                 →  else "Home(2)", "Home(3)", … first free key
//! ```
//!
//! Every insert claims its key through the map's entry API, so the peer and
//! provider passes can run concurrently without ever overwriting each other.
//! A reverse index from source to mount name keeps the passes' per-peer and
//! per-provider lookups constant-time.

use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::CloudResult;
use crate::fs::{normalize_path, DirEntry, Endpoint, FileAttributes};
use crate::providers::RuntimeId;
use crate::types::{NodeId, PeerDescriptor, ProviderKind};

/// Name used when a peer or provider has no usable name
pub const UNNAMED_MOUNT: &str = "Untitled";

/// Mount backed by a peer node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    /// Identity of the mount; survives renames
    pub node_id: NodeId,
    /// Where the peer serves its filesystem
    pub endpoint_url: String,
    /// Timestamp of the descriptor this mount mirrors
    pub logical_timestamp: i64,
    /// Display name the mount name was derived from
    pub display_name: String,
}

impl From<&PeerDescriptor> for PeerEndpoint {
    fn from(peer: &PeerDescriptor) -> Self {
        Self {
            node_id: peer.node_id,
            endpoint_url: peer.endpoint_url.clone(),
            logical_timestamp: peer.logical_timestamp,
            display_name: peer.display_name.clone(),
        }
    }
}

/// Mount backed by a storage provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    /// Lookup key of the owning provider instance
    pub runtime_id: RuntimeId,
    /// Provider kind
    pub kind: ProviderKind,
    /// Visibility tag passed through from the instance
    pub visibility: String,
}

/// What a mount is derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountEndpoint {
    /// Derived from a peer descriptor
    Peer(PeerEndpoint),
    /// Derived from a provider instance
    Provider(ProviderEndpoint),
}

/// Source a mount is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MountOwner {
    Peer(NodeId),
    Provider(RuntimeId),
}

/// One entry of the root filesystem
#[derive(Debug, Clone)]
pub struct MountEntry {
    endpoint: MountEndpoint,
    fs: Endpoint,
}

impl MountEntry {
    /// Peer mount
    pub fn peer(endpoint: PeerEndpoint, fs: Endpoint) -> Self {
        Self {
            endpoint: MountEndpoint::Peer(endpoint),
            fs,
        }
    }

    /// Provider mount
    pub fn provider(endpoint: ProviderEndpoint, fs: Endpoint) -> Self {
        Self {
            endpoint: MountEndpoint::Provider(endpoint),
            fs,
        }
    }

    /// What the mount is derived from
    pub fn endpoint(&self) -> &MountEndpoint {
        &self.endpoint
    }

    /// Filesystem handle
    pub fn fs(&self) -> &Endpoint {
        &self.fs
    }

    /// Node id for peer mounts
    pub fn node_id(&self) -> Option<NodeId> {
        match &self.endpoint {
            MountEndpoint::Peer(peer) => Some(peer.node_id),
            MountEndpoint::Provider(_) => None,
        }
    }

    /// Runtime id for provider mounts
    pub fn runtime_id(&self) -> Option<RuntimeId> {
        match &self.endpoint {
            MountEndpoint::Provider(provider) => Some(provider.runtime_id),
            MountEndpoint::Peer(_) => None,
        }
    }

    fn owner(&self) -> MountOwner {
        match &self.endpoint {
            MountEndpoint::Peer(peer) => MountOwner::Peer(peer.node_id),
            MountEndpoint::Provider(provider) => MountOwner::Provider(provider.runtime_id),
        }
    }

    /// List a directory inside the mount
    pub async fn list(&self, path: &str) -> CloudResult<Vec<DirEntry>> {
        self.fs.list(path).await
    }

    /// Stat a path inside the mount
    pub async fn stat(&self, path: &str) -> CloudResult<FileAttributes> {
        self.fs.stat(path).await
    }

    /// Read a file inside the mount
    pub async fn read(&self, path: &str) -> CloudResult<Vec<u8>> {
        self.fs.read(path).await
    }
}

/// Summary of a mount for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// Mount name
    pub name: String,
    /// What the mount is derived from
    pub endpoint: MountEndpoint,
}

impl fmt::Display for MountInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.endpoint {
            MountEndpoint::Peer(peer) => {
                write!(f, "{} -> peer {} ({})", self.name, peer.node_id, peer.endpoint_url)
            }
            MountEndpoint::Provider(provider) => {
                write!(f, "{} -> {} provider {}", self.name, provider.kind, provider.runtime_id)
            }
        }
    }
}

/// A peer mount located by node id
#[derive(Debug, Clone)]
pub struct PeerMount {
    /// Current mount name
    pub name: String,
    /// Peer data the mount mirrors
    pub endpoint: PeerEndpoint,
    /// Filesystem handle
    pub fs: Endpoint,
}

/// A request path split at its mount
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// Mount name (first path component)
    pub mount: String,
    /// The mount's entry
    pub entry: MountEntry,
    /// Path inside the mount, always absolute
    pub remainder: String,
}

/// Turn a display or provider name into a usable mount name
pub fn mount_base_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" => UNNAMED_MOUNT.to_string(),
        // `.` and `..` are path navigation, not names
        "." | ".." => format!("_{}", cleaned),
        _ => cleaned,
    }
}

/// Candidate key for the `attempt`-th probe (1-based)
pub fn candidate_name(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        base.to_string()
    } else {
        format!("{}({})", base, attempt)
    }
}

/// Concurrent name → mount map
///
/// Writers never hold a guard on `entries` while touching `owners`, so the
/// two maps cannot deadlock against each other.
#[derive(Debug, Default)]
pub struct MountTable {
    entries: DashMap<String, MountEntry>,
    owners: DashMap<MountOwner, String>,
}

impl MountTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under the first free collision-safe name; returns that name
    pub(crate) fn insert_unique(&self, desired: &str, entry: MountEntry) -> String {
        let base = mount_base_name(desired);
        let owner = entry.owner();
        let mut attempt = 1;
        loop {
            let candidate = candidate_name(&base, attempt);
            match self.entries.entry(candidate.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                    self.owners.insert(owner, candidate.clone());
                    return candidate;
                }
                Entry::Occupied(_) => attempt += 1,
            }
        }
    }

    /// Move the entry at `old` to a collision-safe name derived from
    /// `desired`, replacing it with `entry`.
    ///
    /// The new key is claimed before the old one is released, so readers
    /// never see the mount missing. If probing reaches `old` itself the entry
    /// is replaced in place.
    pub(crate) fn rekey(&self, old: &str, desired: &str, entry: MountEntry) -> String {
        let base = mount_base_name(desired);
        let owner = entry.owner();
        let mut attempt = 1;
        loop {
            let candidate = candidate_name(&base, attempt);
            if candidate == old {
                self.entries.insert(candidate.clone(), entry);
                self.owners.insert(owner, candidate.clone());
                return candidate;
            }
            match self.entries.entry(candidate.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                    self.owners.insert(owner, candidate.clone());
                    self.entries.remove(old);
                    return candidate;
                }
                Entry::Occupied(_) => attempt += 1,
            }
        }
    }

    /// Replace the entry stored under `name`
    pub(crate) fn replace(&self, name: &str, entry: MountEntry) {
        self.owners.insert(entry.owner(), name.to_string());
        self.entries.insert(name.to_string(), entry);
    }

    /// Remove a mount, returning its entry
    pub(crate) fn remove(&self, name: &str) -> Option<MountEntry> {
        let (_, entry) = self.entries.remove(name)?;
        self.owners.remove_if(&entry.owner(), |_, indexed| indexed == name);
        Some(entry)
    }

    /// Current name of the mount derived from `owner`
    fn owned_name(&self, owner: MountOwner) -> Option<String> {
        self.owners.get(&owner).map(|name| name.value().clone())
    }

    /// Get a mount by exact name
    pub fn get(&self, name: &str) -> Option<MountEntry> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    /// Whether a mount exists
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Find the mount derived from a node
    pub fn find_peer(&self, node_id: NodeId) -> Option<PeerMount> {
        let name = self.owned_name(MountOwner::Peer(node_id))?;
        let entry = self.get(&name)?;
        match entry.endpoint() {
            MountEndpoint::Peer(peer) if peer.node_id == node_id => Some(PeerMount {
                endpoint: peer.clone(),
                fs: entry.fs().clone(),
                name,
            }),
            _ => None,
        }
    }

    /// Find the mount derived from a provider instance
    pub fn find_provider(&self, runtime_id: RuntimeId) -> Option<String> {
        let name = self.owned_name(MountOwner::Provider(runtime_id))?;
        self.get(&name)
            .filter(|entry| entry.runtime_id() == Some(runtime_id))
            .map(|_| name)
    }

    /// Names and node ids of all peer mounts
    pub fn peer_mounts(&self) -> Vec<(String, NodeId)> {
        self.entries
            .iter()
            .filter_map(|item| item.value().node_id().map(|id| (item.key().clone(), id)))
            .collect()
    }

    /// Names and runtime ids of all provider mounts
    pub fn provider_mounts(&self) -> Vec<(String, RuntimeId)> {
        self.entries
            .iter()
            .filter_map(|item| item.value().runtime_id().map(|id| (item.key().clone(), id)))
            .collect()
    }

    /// Mount names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|item| item.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot of all mounts, sorted by name
    pub fn snapshot(&self) -> Vec<MountInfo> {
        let mut mounts: Vec<MountInfo> = self
            .entries
            .iter()
            .map(|item| MountInfo {
                name: item.key().clone(),
                endpoint: item.value().endpoint().clone(),
            })
            .collect();
        mounts.sort_by(|a, b| a.name.cmp(&b.name));
        mounts
    }

    /// The root directory listing: one directory per mount
    pub fn list_root(&self) -> Vec<DirEntry> {
        self.names().into_iter().map(DirEntry::directory).collect()
    }

    /// Split `path` at its first component and look that mount up.
    ///
    /// Returns `None` for the root itself or an unknown mount.
    pub fn resolve(&self, path: &str) -> Option<ResolvedPath> {
        let normalized = normalize_path(path);
        let trimmed = normalized.trim_start_matches('/');
        if trimmed.is_empty() {
            return None;
        }

        let (mount, rest) = match trimmed.split_once('/') {
            Some((mount, rest)) => (mount, rest),
            None => (trimmed, ""),
        };

        let entry = self.get(mount)?;
        Some(ResolvedPath {
            mount: mount.to_string(),
            entry,
            remainder: format!("/{}", rest),
        })
    }

    /// Number of mounts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
