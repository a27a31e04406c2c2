//! Test doubles for the remote store.
//!
//! [`MemoryStore`] implements both [`StorageProvider`](crate::StorageProvider)
//! and [`DownloadClient`](crate::DownloadClient) over an in-memory tree and
//! counts every call, so tests can assert that a code path did (or did not)
//! reach the remote store.
//!
//! ```ignore
//! use cloudmount_cache::testing::MemoryStore;
//!
//! let store = MemoryStore::new(staging_dir);
//! store.add_file("/docs/a.txt", b"hello");
//! assert_eq!(store.call_count("get_item"), 0);
//! ```

mod memory;

pub use memory::MemoryStore;

/// Deterministic content of `len` bytes: `i & 0xff` at position `i`.
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    (0..len).map(|i| (i & 0xff) as u8).collect()
}
