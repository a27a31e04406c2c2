//! Cached metadata for remote files and directories.

use crate::path;
use serde::Serialize;
use std::time::{Duration, Instant, SystemTime};

/// Metadata record for one remote file or directory.
///
/// The remote tree is a DAG, so a node may have several parent ids. The
/// `path` is the one this node was reached through and is also its key in
/// the [`TreeCache`](crate::TreeCache).
///
/// Providers hand out fresh `Node` values; the cache stores its own copies
/// and never shares them with callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Opaque remote identity.
    pub id: String,
    /// Absolute normalized path.
    pub path: String,
    /// Display name (last path segment).
    pub name: String,
    /// Path of the containing directory.
    pub parent_path: String,
    /// Remote ids of every parent of this node.
    pub parent_ids: Vec<String>,
    /// Content length in bytes (0 for directories).
    pub length: u64,
    /// True for directories.
    pub is_directory: bool,
    pub created: SystemTime,
    pub last_access: SystemTime,
    pub last_write: SystemTime,
    /// When this record was fetched from the remote store.
    pub fetched_at: Instant,
}

impl Node {
    /// Start building a node for `path`.
    pub fn builder(id: impl Into<String>, path: &str) -> NodeBuilder {
        NodeBuilder::new(id, path)
    }

    /// Returns true if this record is older than `ttl`.
    #[inline]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }

    /// Returns a copy of this node relocated to `new_path`.
    ///
    /// The fetch timestamp is kept; relocation does not refresh metadata.
    #[must_use]
    pub fn relocated(&self, new_path: &str) -> Node {
        let new_path = path::normalize(new_path);
        let parent_path = path::parent(&new_path).unwrap_or(path::ROOT).to_string();
        Node {
            name: path::file_name(&new_path).to_string(),
            parent_path,
            path: new_path,
            ..self.clone()
        }
    }

    /// Serialized description served through the info alternate stream.
    pub fn info_blob(&self) -> Vec<u8> {
        #[derive(Serialize)]
        struct Info<'a> {
            id: &'a str,
            path: &'a str,
            parent_ids: &'a [String],
            length: u64,
            is_directory: bool,
        }

        let info = Info {
            id: &self.id,
            path: &self.path,
            parent_ids: &self.parent_ids,
            length: self.length,
            is_directory: self.is_directory,
        };
        // Serializing plain strings and integers cannot fail
        serde_json::to_vec(&info).unwrap_or_default()
    }
}

/// Builder for [`Node`].
///
/// ```
/// use cloudmount_cache::Node;
///
/// let node = Node::builder("abc", "/docs/report.pdf").length(42).build();
/// assert_eq!(node.name, "report.pdf");
/// assert_eq!(node.parent_path, "/docs");
/// assert!(!node.is_directory);
/// ```
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    fn new(id: impl Into<String>, raw_path: &str) -> Self {
        let path = path::normalize(raw_path);
        let now = SystemTime::now();
        Self {
            node: Node {
                id: id.into(),
                name: path::file_name(&path).to_string(),
                parent_path: path::parent(&path).unwrap_or(path::ROOT).to_string(),
                path,
                parent_ids: Vec::new(),
                length: 0,
                is_directory: false,
                created: now,
                last_access: now,
                last_write: now,
                fetched_at: Instant::now(),
            },
        }
    }

    #[must_use]
    pub fn directory(mut self) -> Self {
        self.node.is_directory = true;
        self
    }

    #[must_use]
    pub fn length(mut self, length: u64) -> Self {
        self.node.length = length;
        self
    }

    #[must_use]
    pub fn parent_id(mut self, id: impl Into<String>) -> Self {
        self.node.parent_ids.push(id.into());
        self
    }

    #[must_use]
    pub fn times(mut self, created: SystemTime, last_access: SystemTime, last_write: SystemTime) -> Self {
        self.node.created = created;
        self.node.last_access = last_access;
        self.node.last_write = last_write;
        self
    }

    /// Override the fetch timestamp (used to age entries in tests).
    #[must_use]
    pub fn fetched_at(mut self, at: Instant) -> Self {
        self.node.fetched_at = at;
        self
    }

    pub fn build(self) -> Node {
        self.node
    }
}
