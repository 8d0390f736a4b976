//! Filesystem capability surface shared by every mount endpoint
//!
//! Peer mounts and provider mounts both expose the same small surface
//! (list/stat/read/write). The concrete clients (HTTP to a peer, object
//! storage for a provider) live outside this crate and are produced by an
//! [`EndpointFactory`] supplied by the embedder. Construction must not block
//! on the network; connecting is deferred to first use.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CloudError, CloudResult};
use crate::types::{PeerDescriptor, ProviderKind};

/// Shared handle to a mount endpoint
///
/// The mount table holds the owning handle; dropping the last clone releases
/// whatever connection the endpoint keeps.
pub type Endpoint = Arc<dyn FileSystem>;

/// File type for directory entries and attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file
    File,
    /// Directory
    Directory,
}

/// A single entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (no path separators)
    pub name: String,
    /// Entry type
    pub file_type: FileType,
}

impl DirEntry {
    /// Directory entry
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::Directory,
        }
    }

    /// File entry
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::File,
        }
    }
}

/// File metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    /// File type
    pub file_type: FileType,
    /// Size in bytes (0 for directories)
    pub size: u64,
}

/// Operations every mount endpoint supports
#[async_trait]
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// List a directory
    async fn list(&self, path: &str) -> CloudResult<Vec<DirEntry>>;

    /// Get metadata for a path
    async fn stat(&self, path: &str) -> CloudResult<FileAttributes>;

    /// Read a whole file
    async fn read(&self, path: &str) -> CloudResult<Vec<u8>>;

    /// Write a whole file, creating parent directories
    async fn write(&self, path: &str, data: &[u8]) -> CloudResult<()> {
        let _ = data;
        Err(CloudError::Unsupported(format!("write to {}", path)))
    }
}

/// Builds endpoints for peers and providers
///
/// Implementations must return promptly; failures are logged by the caller
/// and leave the peer or provider unmounted.
pub trait EndpointFactory: Send + Sync {
    /// Build the endpoint for a remote peer node
    fn peer_endpoint(&self, peer: &PeerDescriptor) -> CloudResult<Endpoint>;

    /// Build the endpoint for a storage provider from its serialized settings
    fn provider_endpoint(
        &self,
        kind: ProviderKind,
        settings: &str,
        visibility: &str,
    ) -> CloudResult<Endpoint>;
}

/// Factory for endpoints that need no external client.
///
/// Builds [`MemoryFs`] for [`ProviderKind::Memory`] and refuses everything
/// else, so peers and external providers stay cached but unmounted.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalEndpointFactory;

impl EndpointFactory for LocalEndpointFactory {
    fn peer_endpoint(&self, peer: &PeerDescriptor) -> CloudResult<Endpoint> {
        Err(CloudError::EndpointConstruction(format!(
            "no peer client available for {}",
            peer.endpoint_url
        )))
    }

    fn provider_endpoint(
        &self,
        kind: ProviderKind,
        settings: &str,
        _visibility: &str,
    ) -> CloudResult<Endpoint> {
        match kind {
            ProviderKind::Memory => Ok(Arc::new(MemoryFs::from_settings(settings)?)),
            other => Err(CloudError::EndpointConstruction(format!(
                "no client registered for provider kind {}",
                other
            ))),
        }
    }
}

/// Normalize a path to `/a/b` form, resolving `.` and `..`.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

#[derive(Debug, Clone)]
enum MemNode {
    File(Vec<u8>),
    Directory,
}

/// In-process scratch filesystem
///
/// Keys are normalized absolute paths; the root always exists.
#[derive(Debug)]
pub struct MemoryFs {
    nodes: RwLock<BTreeMap<String, MemNode>>,
}

impl MemoryFs {
    /// Create an empty filesystem
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), MemNode::Directory);
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Build from provider settings.
    ///
    /// Accepts an empty string, `null`, or a JSON object whose optional
    /// `files` map seeds file contents (`{"files": {"/a.txt": "hello"}}`).
    pub fn from_settings(settings: &str) -> CloudResult<Self> {
        let fs = Self::new();
        if settings.trim().is_empty() {
            return Ok(fs);
        }

        let value: serde_json::Value = serde_json::from_str(settings)?;
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::Object(map) => {
                if let Some(files) = map.get("files") {
                    let files = files.as_object().ok_or_else(|| {
                        CloudError::EndpointConstruction("`files` must be an object".to_string())
                    })?;
                    for (path, contents) in files {
                        let contents = contents.as_str().ok_or_else(|| {
                            CloudError::EndpointConstruction(format!(
                                "contents of {} must be a string",
                                path
                            ))
                        })?;
                        fs.insert_file(path, contents.as_bytes().to_vec())?;
                    }
                }
            }
            _ => {
                return Err(CloudError::EndpointConstruction(
                    "memory provider settings must be a JSON object".to_string(),
                ))
            }
        }
        Ok(fs)
    }

    fn insert_file(&self, path: &str, data: Vec<u8>) -> CloudResult<()> {
        let path = normalize_path(path);
        if path == "/" {
            return Err(CloudError::IsDirectory(path));
        }

        let mut nodes = self.nodes.write();
        if let Some(MemNode::Directory) = nodes.get(&path) {
            return Err(CloudError::IsDirectory(path));
        }

        let mut ancestor = parent_of(&path);
        while let Some(dir) = ancestor {
            match nodes.get(dir) {
                Some(MemNode::File(_)) => return Err(CloudError::NotDirectory(dir.to_string())),
                Some(MemNode::Directory) => {}
                None => {
                    nodes.insert(dir.to_string(), MemNode::Directory);
                }
            }
            ancestor = parent_of(dir);
        }

        nodes.insert(path, MemNode::File(data));
        Ok(())
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn list(&self, path: &str) -> CloudResult<Vec<DirEntry>> {
        let path = normalize_path(path);
        let nodes = self.nodes.read();

        match nodes.get(&path) {
            None => return Err(CloudError::NotFound(path)),
            Some(MemNode::File(_)) => return Err(CloudError::NotDirectory(path)),
            Some(MemNode::Directory) => {}
        }

        let entries = nodes
            .iter()
            .filter(|(key, _)| key.as_str() != path && parent_of(key) == Some(path.as_str()))
            .map(|(key, node)| {
                let name = key.rsplit('/').next().unwrap_or_default();
                match node {
                    MemNode::File(_) => DirEntry::file(name),
                    MemNode::Directory => DirEntry::directory(name),
                }
            })
            .collect();
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> CloudResult<FileAttributes> {
        let path = normalize_path(path);
        match self.nodes.read().get(&path) {
            Some(MemNode::File(data)) => Ok(FileAttributes {
                file_type: FileType::File,
                size: data.len() as u64,
            }),
            Some(MemNode::Directory) => Ok(FileAttributes {
                file_type: FileType::Directory,
                size: 0,
            }),
            None => Err(CloudError::NotFound(path)),
        }
    }

    async fn read(&self, path: &str) -> CloudResult<Vec<u8>> {
        let path = normalize_path(path);
        match self.nodes.read().get(&path) {
            Some(MemNode::File(data)) => Ok(data.clone()),
            Some(MemNode::Directory) => Err(CloudError::IsDirectory(path)),
            None => Err(CloudError::NotFound(path)),
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> CloudResult<()> {
        self.insert_file(path, data.to_vec())
    }
}
