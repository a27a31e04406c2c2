//! Caching core for mounting a remote object store as a local drive.
//!
//! # Components
//!
//! ## Metadata
//!
//! - [`Node`] - Cached metadata record of a remote file or directory
//! - [`TreeCache`] - Path-indexed node and listing cache with TTL expiry
//! - [`path`] - Normalized, segment-aware path helpers
//!
//! ## Content
//!
//! - [`ContentStream`] - Random-access stream contract for open files
//! - [`ContentCache`] - Deduplicated background downloads into staging files
//! - [`NewFileWriter`] - Concurrent positional writer for files being created
//!
//! ## Remote Store Seam
//!
//! - [`StorageProvider`] - Metadata and mutation operations on the remote store
//! - [`DownloadClient`] - Streaming content download from an offset
//!
//! ## Implementation Utilities
//!
//! - [`HandleTable`] - Thread-safe handle management
//! - [`testing`] - In-memory remote store for tests
//!
//! # Example
//!
//! ```
//! use cloudmount_cache::{Node, TreeCache};
//! use cloudmount_cache::path::normalize;
//!
//! let cache = TreeCache::default();
//! let path = normalize("docs/report.txt");
//! cache.add(Node::builder("id-1", &path).length(42).build());
//!
//! let node = cache.get_node("/docs/report.txt").unwrap();
//! assert_eq!(node.name, "report.txt");
//! assert_eq!(node.parent_path, "/docs");
//! ```

pub mod content_cache;
pub mod error;
pub mod handle_table;
pub mod node;
pub mod path;
pub mod provider;
pub mod stream;
pub mod testing;
pub mod tree_cache;

pub use content_cache::{ContentCache, ContentCacheStats, DEFAULT_RETRY_DELAY};
pub use error::{ProviderError, ProviderResult, StreamError, StreamResult};
pub use handle_table::HandleTable;
pub use node::{Node, NodeBuilder};
pub use provider::{
    ByteConsumer, DownloadClient, FileAccess, FileMode, FileOptions, FileShare, IoAccess,
    StorageProvider,
};
pub use stream::{
    ByteArrayReader, CloseHook, ContentStream, DownloadProgress, DownloadStatus, FileReader,
    NewFileWriter, PartialDownloadReader,
};
pub use tree_cache::{DEFAULT_LISTING_TTL, DEFAULT_NODE_TTL, TreeCache, TreeCacheConfig};
