use crate::error::{ProviderError, ProviderResult};
use crate::node::Node;
use crate::path;
use crate::provider::{
    ByteConsumer, DownloadClient, FileMode, FileOptions, FileShare, IoAccess, StorageProvider,
};
use crate::stream::{ByteArrayReader, ContentStream, NewFileWriter};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Capacity reported by [`MemoryStore::total_size`] (1 GiB).
const TOTAL_SIZE: u64 = 1 << 30;

#[derive(Debug)]
struct Entry {
    node: Node,
    content: Vec<u8>,
}

#[derive(Debug, Default)]
struct Tree {
    entries: BTreeMap<String, Entry>,
    next_id: u64,
}

impl Tree {
    fn insert(&mut self, node_path: &str, is_directory: bool, content: Vec<u8>) -> Node {
        self.next_id += 1;
        let mut builder = Node::builder(format!("n{}", self.next_id), node_path)
            .length(content.len() as u64);
        if is_directory {
            builder = builder.directory();
        }
        let mut node = builder.build();
        if let Some(parent) = self.entries.get(&node.parent_path) {
            node.parent_ids.push(parent.node.id.clone());
        }
        self.entries.insert(
            node.path.clone(),
            Entry {
                node: node.clone(),
                content,
            },
        );
        node
    }

    fn fresh(&self, node_path: &str) -> Option<Node> {
        self.entries.get(node_path).map(|e| Node {
            fetched_at: Instant::now(),
            ..e.node.clone()
        })
    }
}

/// In-memory remote store with call accounting.
#[derive(Debug)]
pub struct MemoryStore {
    tree: Arc<Mutex<Tree>>,
    staging_dir: PathBuf,
    calls: DashMap<&'static str, u64>,
    fail_listings: AtomicBool,
    listing_delay: Mutex<Duration>,
    download_delay: Mutex<Duration>,
    download_chunk: Mutex<usize>,
    downloads: AtomicU64,
}

impl MemoryStore {
    /// Create a store containing only the root directory.
    ///
    /// Writers returned by `open_file` stage their bytes under `staging_dir`.
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        let mut tree = Tree::default();
        tree.insert(path::ROOT, true, Vec::new());
        Self {
            tree: Arc::new(Mutex::new(tree)),
            staging_dir: staging_dir.into(),
            calls: DashMap::new(),
            fail_listings: AtomicBool::new(false),
            listing_delay: Mutex::new(Duration::ZERO),
            download_delay: Mutex::new(Duration::ZERO),
            download_chunk: Mutex::new(usize::MAX),
            downloads: AtomicU64::new(0),
        }
    }

    pub fn add_file(&self, file_path: &str, content: &[u8]) -> Node {
        self.tree
            .lock()
            .insert(&path::normalize(file_path), false, content.to_vec())
    }

    pub fn add_dir(&self, dir_path: &str) -> Node {
        self.tree
            .lock()
            .insert(&path::normalize(dir_path), true, Vec::new())
    }

    /// Stored content of a file, bypassing call accounting.
    pub fn content(&self, file_path: &str) -> Option<Vec<u8>> {
        self.tree
            .lock()
            .entries
            .get(file_path)
            .map(|e| e.content.clone())
    }

    /// Whether `path` exists, bypassing call accounting.
    pub fn contains(&self, node_path: &str) -> bool {
        self.tree.lock().entries.contains_key(node_path)
    }

    /// Number of calls made to operation `op` (e.g. `"get_item"`).
    pub fn call_count(&self, op: &str) -> u64 {
        self.calls.get(op).map_or(0, |c| *c)
    }

    /// Number of calls made to any operation.
    pub fn total_calls(&self) -> u64 {
        self.calls.iter().map(|c| *c.value()).sum()
    }

    pub fn reset_calls(&self) {
        self.calls.clear();
    }

    /// Number of `download` round-trips served.
    pub fn downloads(&self) -> u64 {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Make `get_directory_items` fail with a remote error.
    pub fn set_fail_listings(&self, fail: bool) {
        self.fail_listings.store(fail, Ordering::SeqCst);
    }

    pub fn set_listing_delay(&self, delay: Duration) {
        *self.listing_delay.lock() = delay;
    }

    /// Delay before each chunk of a download is delivered.
    pub fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.lock() = delay;
    }

    /// Maximum bytes delivered per `download` round-trip.
    pub fn set_download_chunk(&self, bytes: usize) {
        *self.download_chunk.lock() = bytes.max(1);
    }

    fn record(&self, op: &'static str) {
        *self.calls.entry(op).or_insert(0) += 1;
    }

    fn staging_path(&self, file_path: &str) -> PathBuf {
        let name: String = file_path
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.staging_dir.join(format!("upload{name}"))
    }
}

#[async_trait]
impl StorageProvider for MemoryStore {
    fn get_item(&self, item_path: &str) -> ProviderResult<Option<Node>> {
        self.record("get_item");
        Ok(self.tree.lock().fresh(item_path))
    }

    async fn get_directory_items(&self, dir_path: &str) -> ProviderResult<Vec<Node>> {
        self.record("get_directory_items");
        let delay = *self.listing_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listings.load(Ordering::SeqCst) {
            return Err(ProviderError::Remote("listing unavailable".into()));
        }

        let tree = self.tree.lock();
        if !tree.entries.get(dir_path).is_some_and(|e| e.node.is_directory) {
            return Err(ProviderError::NotFound(dir_path.to_string()));
        }
        Ok(tree
            .entries
            .values()
            .filter(|e| e.node.parent_path == dir_path && e.node.path != dir_path)
            .map(|e| Node {
                fetched_at: Instant::now(),
                ..e.node.clone()
            })
            .collect())
    }

    fn open_file(
        &self,
        file_path: &str,
        mode: FileMode,
        access: IoAccess,
        _share: FileShare,
        _options: FileOptions,
    ) -> ProviderResult<Option<Box<dyn ContentStream>>> {
        self.record("open_file");
        let existing = self.tree.lock().entries.get(file_path).map(|e| {
            (e.node.clone(), e.content.clone())
        });

        if !access.can_write() {
            return Ok(existing.map(|(_, content)| {
                Box::new(ByteArrayReader::new(content)) as Box<dyn ContentStream>
            }));
        }

        let keep_content = matches!(
            mode,
            FileMode::Open | FileMode::OpenOrCreate | FileMode::Append
        );
        let (node, initial) = match existing {
            Some((node, content)) => (node, if keep_content { content } else { Vec::new() }),
            None => {
                if matches!(mode, FileMode::Open | FileMode::Truncate) {
                    return Err(ProviderError::NotFound(file_path.to_string()));
                }
                (self.tree.lock().insert(file_path, false, Vec::new()), Vec::new())
            }
        };

        std::fs::create_dir_all(&self.staging_dir)?;
        let tree = Arc::clone(&self.tree);
        let writer = NewFileWriter::create(node, self.staging_path(file_path))?.on_close(
            Box::new(move |node: &Node, staged: &Path| {
                let content = std::fs::read(staged).unwrap_or_default();
                let mut tree = tree.lock();
                if let Some(entry) = tree.entries.get_mut(&node.path) {
                    entry.node.length = content.len() as u64;
                    entry.content = content;
                }
            }),
        );
        if !initial.is_empty() {
            writer
                .write(0, &initial)
                .map_err(|e| ProviderError::Remote(e.to_string()))?;
        }
        Ok(Some(Box::new(writer)))
    }

    fn create_dir(&self, dir_path: &str) -> ProviderResult<Node> {
        self.record("create_dir");
        let mut tree = self.tree.lock();
        if tree.entries.contains_key(dir_path) {
            return Err(ProviderError::AlreadyExists(dir_path.to_string()));
        }
        Ok(tree.insert(dir_path, true, Vec::new()))
    }

    fn delete_file(&self, file_path: &str) -> ProviderResult<()> {
        self.record("delete_file");
        self.tree
            .lock()
            .entries
            .remove(file_path)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(file_path.to_string()))
    }

    fn delete_dir(&self, dir_path: &str) -> ProviderResult<()> {
        self.record("delete_dir");
        let mut tree = self.tree.lock();
        if !tree.entries.contains_key(dir_path) {
            return Err(ProviderError::NotFound(dir_path.to_string()));
        }
        tree.entries
            .retain(|key, _| !path::is_same_or_descendant(key, dir_path));
        Ok(())
    }

    fn move_file(&self, old_path: &str, new_path: &str, replace: bool) -> ProviderResult<Node> {
        self.record("move_file");
        let mut tree = self.tree.lock();
        if !tree.entries.contains_key(old_path) {
            return Err(ProviderError::NotFound(old_path.to_string()));
        }
        if tree.entries.contains_key(new_path) && !replace {
            return Err(ProviderError::AlreadyExists(new_path.to_string()));
        }

        let moved: Vec<String> = tree
            .entries
            .keys()
            .filter(|k| path::is_same_or_descendant(k, old_path))
            .cloned()
            .collect();
        for key in moved {
            if let Some(entry) = tree.entries.remove(&key) {
                let relocated = format!("{new_path}{}", &key[old_path.len()..]);
                let node = entry.node.relocated(&relocated);
                tree.entries.insert(
                    node.path.clone(),
                    Entry {
                        node,
                        content: entry.content,
                    },
                );
            }
        }
        tree.fresh(new_path)
            .ok_or_else(|| ProviderError::NotFound(new_path.to_string()))
    }

    fn exists(&self, item_path: &str) -> ProviderResult<bool> {
        self.record("exists");
        Ok(self.tree.lock().entries.contains_key(item_path))
    }

    fn total_size(&self) -> u64 {
        TOTAL_SIZE
    }

    fn used_space(&self) -> u64 {
        self.tree
            .lock()
            .entries
            .values()
            .map(|e| e.content.len() as u64)
            .sum()
    }

    fn volume_name(&self) -> String {
        "Memory".to_string()
    }

    fn filesystem_name(&self) -> String {
        "MemoryFS".to_string()
    }
}

#[async_trait]
impl DownloadClient for MemoryStore {
    async fn download(
        &self,
        id: &str,
        offset: u64,
        consumer: &mut (dyn ByteConsumer + Send),
    ) -> ProviderResult<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let content = {
            let tree = self.tree.lock();
            tree.entries
                .values()
                .find(|e| e.node.id == id)
                .map(|e| e.content.clone())
                .ok_or_else(|| ProviderError::NotFound(id.to_string()))?
        };

        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(content.len());
        let chunk = *self.download_chunk.lock();
        let end = start.saturating_add(chunk).min(content.len());
        let delay = *self.download_delay.lock();
        for piece in content[start..end].chunks(4096) {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            consumer.consume(piece)?;
        }
        Ok(())
    }
}
