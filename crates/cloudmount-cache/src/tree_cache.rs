//! Metadata tree cache with time-bounded validity.
//!
//! Maps paths to [`Node`] records and directory paths to listing snapshots.
//! Nodes and listings expire independently: listings are short-lived since
//! directory shape changes more often than file attributes.
//!
//! # Locking
//!
//! All state sits behind one `parking_lot::RwLock`. Lookups take the shared
//! lock. A lookup that finds an expired entry releases it, takes the
//! exclusive lock, re-checks and evicts. Between the two another writer may
//! have refreshed the entry, which the re-check tolerates.
//!
//! Every mutation runs under a single exclusive guard, so compound
//! operations such as [`TreeCache::move_file`] are observed atomically.
//!
//! None of these operations touch the network; resolving a miss against
//! the provider and feeding the result back is the caller's job.

use crate::node::Node;
use crate::path;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::trace;

/// Default lifetime of a cached node (5 minutes).
pub const DEFAULT_NODE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default lifetime of a cached directory listing (60 seconds).
pub const DEFAULT_LISTING_TTL: Duration = Duration::from_secs(60);

/// Expiry settings for a [`TreeCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeCacheConfig {
    /// Lifetime of a node, measured from [`Node::fetched_at`].
    pub node_ttl: Duration,
    /// Lifetime of a listing, measured from when it was stored.
    pub listing_ttl: Duration,
}

impl Default for TreeCacheConfig {
    fn default() -> Self {
        Self {
            node_ttl: DEFAULT_NODE_TTL,
            listing_ttl: DEFAULT_LISTING_TTL,
        }
    }
}

#[derive(Debug)]
struct Listing {
    items: HashSet<String>,
    expires: Instant,
}

impl Listing {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires
    }
}

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<String, Node>,
    listings: HashMap<String, Listing>,
}

impl Inner {
    fn add(&mut self, node: Node) {
        if let Some(listing) = self.listings.get_mut(&node.parent_path) {
            listing.items.insert(node.path.clone());
        }
        self.nodes.insert(node.path.clone(), node);
    }

    fn unlink_from_parent(&mut self, file_path: &str) {
        if let Some(parent) = path::parent(file_path)
            && let Some(listing) = self.listings.get_mut(parent)
        {
            listing.items.remove(file_path);
        }
    }

    fn delete_file(&mut self, file_path: &str) {
        self.unlink_from_parent(file_path);
        self.nodes.remove(file_path);
    }

    fn delete_dir(&mut self, dir_path: &str) {
        self.unlink_from_parent(dir_path);
        self.nodes
            .retain(|key, _| !path::is_same_or_descendant(key, dir_path));
        self.listings
            .retain(|key, _| !path::is_same_or_descendant(key, dir_path));
    }
}

/// Thread-safe cache of the remote tree's metadata.
///
/// ```
/// use cloudmount_cache::{Node, TreeCache};
///
/// let cache = TreeCache::default();
/// cache.add_directory_listing("/", vec![Node::builder("1", "/a.txt").build()]);
///
/// assert_eq!(cache.get_directory_listing("/"), Some(vec!["/a.txt".to_string()]));
/// assert!(cache.get_node("/a.txt").is_some());
/// ```
#[derive(Debug, Default)]
pub struct TreeCache {
    inner: RwLock<Inner>,
    config: TreeCacheConfig,
}

impl TreeCache {
    pub fn new(config: TreeCacheConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            config,
        }
    }

    pub fn config(&self) -> TreeCacheConfig {
        self.config
    }

    /// Look up the node stored under `file_path`.
    ///
    /// Returns `None` when absent or expired; an expired node is evicted.
    pub fn get_node(&self, file_path: &str) -> Option<Node> {
        {
            let inner = self.inner.read();
            let node = inner.nodes.get(file_path)?;
            if !node.is_expired(self.config.node_ttl) {
                return Some(node.clone());
            }
        }

        let mut inner = self.inner.write();
        match inner.nodes.get(file_path) {
            Some(node) if node.is_expired(self.config.node_ttl) => {
                trace!(path = file_path, "Evicting expired node");
                inner.nodes.remove(file_path);
                None
            }
            // Refreshed while we waited for the write lock
            Some(node) => Some(node.clone()),
            None => None,
        }
    }

    /// Look up the child paths of `dir_path`.
    ///
    /// Returns `None` when absent or expired; an expired listing is evicted.
    pub fn get_directory_listing(&self, dir_path: &str) -> Option<Vec<String>> {
        {
            let inner = self.inner.read();
            let listing = inner.listings.get(dir_path)?;
            if !listing.is_expired() {
                return Some(listing.items.iter().cloned().collect());
            }
        }

        let mut inner = self.inner.write();
        match inner.listings.get(dir_path) {
            Some(listing) if listing.is_expired() => {
                trace!(path = dir_path, "Evicting expired listing");
                inner.listings.remove(dir_path);
                None
            }
            Some(listing) => Some(listing.items.iter().cloned().collect()),
            None => None,
        }
    }

    /// Insert or overwrite a node.
    ///
    /// If the parent directory has a cached listing the path is appended to
    /// it; the listing's expiry is left unchanged.
    pub fn add(&self, node: Node) {
        self.inner.write().add(node);
    }

    /// Replace the listing of `dir_path` and (re)insert every child node.
    pub fn add_directory_listing(&self, dir_path: &str, items: Vec<Node>) {
        let listing = Listing {
            items: items.iter().map(|n| n.path.clone()).collect(),
            expires: Instant::now() + self.config.listing_ttl,
        };

        let mut inner = self.inner.write();
        inner.listings.insert(dir_path.to_string(), listing);
        for node in items {
            inner.nodes.insert(node.path.clone(), node);
        }
    }

    /// Replace a node only if one is already cached under its path.
    pub fn update(&self, node: Node) {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.nodes.get_mut(&node.path) {
            *existing = node;
        }
    }

    /// Remove `old_path` and insert `new_node`, as one step.
    pub fn move_file(&self, old_path: &str, new_node: Node) {
        let mut inner = self.inner.write();
        inner.delete_file(old_path);
        inner.add(new_node);
    }

    /// Remove the subtree at `old_path` and insert `new_node`, as one step.
    ///
    /// Descendants are not carried over to the new location; they are
    /// fetched again on the next listing of the new path.
    pub fn move_dir(&self, old_path: &str, new_node: Node) {
        let mut inner = self.inner.write();
        inner.delete_dir(old_path);
        inner.add(new_node);
    }

    pub fn delete_file(&self, file_path: &str) {
        self.inner.write().delete_file(file_path);
    }

    /// Remove a directory, every node below it and every listing below it.
    pub fn delete_dir(&self, dir_path: &str) {
        self.inner.write().delete_dir(dir_path);
    }

    /// Number of cached nodes, expired ones included.
    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Number of cached listings, expired ones included.
    pub fn listing_count(&self) -> usize {
        self.inner.read().listings.len()
    }
}
