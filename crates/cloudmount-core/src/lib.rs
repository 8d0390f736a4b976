//! cloudmount Core Library
//!
//! One root filesystem assembled from LAN peers and storage providers.
//!
//! ## Overview
//!
//! Nodes of the same private cloud announce themselves on the local network.
//! Every announcement carries the node's display name, obscured with the
//! cloud's master key. cloudmount keeps a last-writer-wins cache of those
//! announcements, adds the configured storage providers, and derives a
//! single name → endpoint mount table that a file server can expose as its
//! root directory.
//!
//! ## Core Principles
//!
//! - **Never lose a mount**: renames claim the new name before giving up the old
//! - **Never duplicate a name**: collisions become `Name(2)`, `Name(3)`, …
//! - **Never block readers**: the mount table is a concurrent map
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use cloudmount_core::{CloudConfig, PersonalCloud};
//!
//! let config = CloudConfig::load("~/.cloudmount/config.json")?;
//! let cloud = PersonalCloud::from_config(&config, Arc::new(MyFactory::new()))?;
//!
//! // Feed discovery
//! cloud.on_peer_observed(node_id, "1", "http://10.0.0.5:5680", &blob, ts)?;
//!
//! // Serve the root
//! for entry in cloud.list_root() {
//!     println!("{}", entry.name);
//! }
//! ```

pub mod cloud;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod fs;
pub mod mounts;
pub mod peers;
pub mod providers;
pub mod reconcile;
pub mod types;

// Re-exports
pub use cloud::PersonalCloud;
pub use config::CloudConfig;
pub use crypto::NameCipher;
pub use error::{CloudError, CloudResult};
pub use events::{CloudEvent, EventBus, MountChanges};
pub use fs::{
    DirEntry, Endpoint, EndpointFactory, FileAttributes, FileSystem, FileType,
    LocalEndpointFactory, MemoryFs,
};
pub use mounts::{
    MountEndpoint, MountEntry, MountInfo, MountTable, PeerEndpoint, ProviderEndpoint,
    ResolvedPath,
};
pub use peers::{MergeOutcome, PeerTable};
pub use providers::{ProviderInstance, ProviderSet, RuntimeId};
pub use types::*;
