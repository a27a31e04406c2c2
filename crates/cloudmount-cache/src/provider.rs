//! Boundaries to the remote store.
//!
//! The HTTP client for the remote store lives outside this crate. The
//! caches and the drive adapter talk to it only through the traits here,
//! which keeps both testable against in-memory fakes.

use crate::error::ProviderResult;
use crate::node::Node;
use crate::stream::ContentStream;
use async_trait::async_trait;
use std::io;
use std::ops::BitOr;

/// How a create/open call treats an existing or missing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Create; fail if the file exists.
    CreateNew,
    /// Create, overwriting an existing file.
    Create,
    /// Open; fail if the file is missing.
    Open,
    /// Open, creating the file if missing.
    OpenOrCreate,
    /// Open and truncate; fail if the file is missing.
    Truncate,
    /// Open for appending, creating the file if missing.
    Append,
}

/// Access rights requested by the caller, as a bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileAccess(u32);

impl FileAccess {
    pub const NONE: Self = Self(0);
    pub const READ_DATA: Self = Self(0x0000_0001);
    pub const WRITE_DATA: Self = Self(0x0000_0002);
    pub const APPEND_DATA: Self = Self(0x0000_0004);
    pub const EXECUTE: Self = Self(0x0000_0020);
    pub const READ_ATTRIBUTES: Self = Self(0x0000_0080);
    pub const WRITE_ATTRIBUTES: Self = Self(0x0000_0100);
    pub const DELETE: Self = Self(0x0001_0000);
    pub const SYNCHRONIZE: Self = Self(0x0010_0000);
    pub const GENERIC_EXECUTE: Self = Self(0x2000_0000);
    pub const GENERIC_WRITE: Self = Self(0x4000_0000);
    pub const GENERIC_READ: Self = Self(0x8000_0000);

    /// Any bit that touches file content.
    pub const DATA: Self = Self(
        Self::READ_DATA.0
            | Self::WRITE_DATA.0
            | Self::APPEND_DATA.0
            | Self::EXECUTE.0
            | Self::GENERIC_EXECUTE.0
            | Self::GENERIC_WRITE.0
            | Self::GENERIC_READ.0,
    );

    /// Bits that read file content.
    pub const DATA_READ: Self = Self(
        Self::READ_DATA.0 | Self::EXECUTE.0 | Self::GENERIC_EXECUTE.0 | Self::GENERIC_READ.0,
    );

    /// Bits that modify file content or remove the file.
    pub const DATA_WRITE: Self = Self(
        Self::WRITE_DATA.0 | Self::APPEND_DATA.0 | Self::DELETE.0 | Self::GENERIC_WRITE.0,
    );

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns true if any bit of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns true if the request only concerns attributes or security.
    pub const fn is_metadata_only(self) -> bool {
        !self.intersects(Self::DATA)
    }

    /// Collapse the request into the access a content stream needs.
    pub const fn io_access(self) -> IoAccess {
        let read = self.intersects(Self::DATA_READ);
        let write = self.intersects(Self::DATA_WRITE);
        match (read, write) {
            (true, true) => IoAccess::ReadWrite,
            (false, true) => IoAccess::Write,
            _ => IoAccess::Read,
        }
    }
}

impl BitOr for FileAccess {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Sharing mode requested by the caller (passed through to the provider).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileShare(u32);

impl FileShare {
    pub const NONE: Self = Self(0);
    pub const READ: Self = Self(0x1);
    pub const WRITE: Self = Self(0x2);
    pub const DELETE: Self = Self(0x4);

    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for FileShare {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Driver open options (opaque to the adapter, passed through).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileOptions(pub u32);

/// Access a content stream is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoAccess {
    Read,
    Write,
    ReadWrite,
}

impl IoAccess {
    pub fn can_write(self) -> bool {
        matches!(self, IoAccess::Write | IoAccess::ReadWrite)
    }
}

/// Metadata and mutation calls against the remote store.
///
/// Returned [`Node`]s are fresh values; implementations must not keep
/// references into the adapter's cache.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Fetch one item, or `None` if the path does not exist remotely.
    fn get_item(&self, path: &str) -> ProviderResult<Option<Node>>;

    /// Fetch every child of a directory.
    async fn get_directory_items(&self, path: &str) -> ProviderResult<Vec<Node>>;

    /// Open a content stream for write or read-write access.
    ///
    /// `None` means the provider refuses the combination of flags.
    fn open_file(
        &self,
        path: &str,
        mode: FileMode,
        access: IoAccess,
        share: FileShare,
        options: FileOptions,
    ) -> ProviderResult<Option<Box<dyn ContentStream>>>;

    /// Create a directory and return its node.
    fn create_dir(&self, path: &str) -> ProviderResult<Node>;

    fn delete_file(&self, path: &str) -> ProviderResult<()>;

    fn delete_dir(&self, path: &str) -> ProviderResult<()>;

    /// Move or rename, returning the node at its new location.
    fn move_file(&self, old_path: &str, new_path: &str, replace: bool) -> ProviderResult<Node>;

    fn exists(&self, path: &str) -> ProviderResult<bool>;

    /// Total capacity of the remote store in bytes.
    fn total_size(&self) -> u64;

    /// Bytes used on the remote store.
    fn used_space(&self) -> u64;

    fn volume_name(&self) -> String;

    fn filesystem_name(&self) -> String;
}

/// Receives raw bytes from a [`DownloadClient`].
pub trait ByteConsumer {
    fn consume(&mut self, chunk: &[u8]) -> io::Result<()>;
}

/// Streams remote file content starting at an offset.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Stream bytes of `id` from `offset` into `consumer`.
    ///
    /// May return before the end of the file; callers re-issue the request
    /// from the new offset.
    async fn download(
        &self,
        id: &str,
        offset: u64,
        consumer: &mut (dyn ByteConsumer + Send),
    ) -> ProviderResult<()>;
}
