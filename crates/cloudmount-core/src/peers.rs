//! Peer presence cache with last-writer-wins merge
//!
//! Discovery beacons arrive unordered and are re-broadcast periodically, so
//! the same node is reported many times, sometimes with stale data. The
//! table keeps exactly one descriptor per node: the one carrying the highest
//! logical timestamp seen so far.
//!
//! ## Merge Rule
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  incoming(node, ts)                                             │
//! │  ├── absent                 → insert          (Inserted)        │
//! │  ├── cached.ts >= ts        → keep cached     (Stale)           │
//! │  └── cached.ts <  ts        → replace         (Replaced)        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An equal timestamp never replaces, even when other fields differ.
//!
//! The table itself is not synchronized; `PersonalCloud` guards it together
//! with the peer reconciliation pass under one lock.

use std::collections::{HashMap, HashSet};

use crate::types::{NodeId, PeerDescriptor};

/// Result of merging one observation into the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Node was not cached before
    Inserted,
    /// Cached descriptor was older and has been superseded
    Replaced,
    /// Cached descriptor is as new or newer; nothing changed
    Stale,
}

impl MergeOutcome {
    /// Whether the table changed
    pub fn changed(&self) -> bool {
        !matches!(self, MergeOutcome::Stale)
    }
}

/// Most-recent-per-node view of peer presence
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<NodeId, PeerDescriptor>,
}

impl PeerTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an observation under the last-writer-wins rule
    pub fn merge(&mut self, descriptor: PeerDescriptor) -> MergeOutcome {
        match self.peers.get(&descriptor.node_id) {
            Some(cached) if cached.logical_timestamp >= descriptor.logical_timestamp => {
                MergeOutcome::Stale
            }
            Some(_) => {
                self.peers.insert(descriptor.node_id, descriptor);
                MergeOutcome::Replaced
            }
            None => {
                self.peers.insert(descriptor.node_id, descriptor);
                MergeOutcome::Inserted
            }
        }
    }

    /// Drop every node not in `observed`, returning the removed descriptors
    pub fn retain_observed(&mut self, observed: &HashSet<NodeId>) -> Vec<PeerDescriptor> {
        let gone: Vec<NodeId> = self
            .peers
            .keys()
            .filter(|id| !observed.contains(id))
            .copied()
            .collect();

        gone.into_iter()
            .filter_map(|id| self.peers.remove(&id))
            .collect()
    }

    /// Remove a single node
    pub fn remove(&mut self, node_id: &NodeId) -> Option<PeerDescriptor> {
        self.peers.remove(node_id)
    }

    /// Get a node's descriptor
    pub fn get(&self, node_id: &NodeId) -> Option<&PeerDescriptor> {
        self.peers.get(node_id)
    }

    /// Whether a node is cached
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.peers.contains_key(node_id)
    }

    /// Iterate cached descriptors in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = &PeerDescriptor> {
        self.peers.values()
    }

    /// Snapshot sorted by node id
    pub fn list(&self) -> Vec<PeerDescriptor> {
        let mut peers: Vec<PeerDescriptor> = self.peers.values().cloned().collect();
        peers.sort_by_key(|p| p.node_id);
        peers
    }

    /// Number of cached nodes
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
