//! Values exchanged with the driver: per-call context and the records
//! returned by listing, information and volume callbacks.

use cloudmount_cache::Node;
use std::ops::BitOr;
use std::time::SystemTime;

/// Per-call driver context.
///
/// `context` names the [`OpenHandle`](crate::handles::OpenHandle) attached by
/// `create_file`; it is `None` until a successful open and after `close_file`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveFileInfo {
    pub process_id: u32,
    pub is_directory: bool,
    pub delete_on_close: bool,
    pub context: Option<u64>,
}

impl DriveFileInfo {
    pub fn new(process_id: u32) -> Self {
        Self {
            process_id,
            ..Default::default()
        }
    }

    /// Marks the request as targeting a directory.
    #[must_use]
    pub fn directory(mut self) -> Self {
        self.is_directory = true;
        self
    }

    #[must_use]
    pub fn delete_on_close(mut self) -> Self {
        self.delete_on_close = true;
        self
    }
}

/// File attribute bits reported to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileAttributes(u32);

impl FileAttributes {
    pub const READ_ONLY: Self = Self(0x0000_0001);
    pub const DIRECTORY: Self = Self(0x0000_0010);
    pub const NORMAL: Self = Self(0x0000_0080);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FileAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One entry of a directory or stream listing, or a single file's information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInformation {
    pub file_name: String,
    pub attributes: FileAttributes,
    pub length: u64,
    pub creation_time: Option<SystemTime>,
    pub last_access_time: Option<SystemTime>,
    pub last_write_time: Option<SystemTime>,
}

impl FileInformation {
    pub fn from_node(node: &Node, read_only: bool) -> Self {
        let mut attributes = if node.is_directory {
            FileAttributes::DIRECTORY
        } else {
            FileAttributes::NORMAL
        };
        if read_only {
            attributes = attributes | FileAttributes::READ_ONLY;
        }
        Self {
            file_name: node.name.clone(),
            attributes,
            length: node.length,
            creation_time: Some(node.created),
            last_access_time: Some(node.last_access),
            last_write_time: Some(node.last_write),
        }
    }

    /// Entry for an alternate data stream.
    pub fn stream(name: impl Into<String>, length: u64) -> Self {
        Self {
            file_name: name.into(),
            attributes: FileAttributes::NORMAL,
            length,
            creation_time: None,
            last_access_time: None,
            last_write_time: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskFreeSpace {
    pub free_bytes_available: u64,
    pub total_bytes: u64,
    pub total_free_bytes: u64,
}

/// Filesystem feature bits reported with the volume information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VolumeFeatures(u32);

impl VolumeFeatures {
    pub const CASE_SENSITIVE_SEARCH: Self = Self(0x0000_0001);
    pub const CASE_PRESERVED_NAMES: Self = Self(0x0000_0002);
    pub const UNICODE_ON_DISK: Self = Self(0x0000_0004);
    pub const SUPPORTS_REMOTE_STORAGE: Self = Self(0x0000_0100);
    pub const NAMED_STREAMS: Self = Self(0x0004_0000);
    pub const READ_ONLY_VOLUME: Self = Self(0x0008_0000);
    pub const SEQUENTIAL_WRITE_ONCE: Self = Self(0x0010_0000);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for VolumeFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInformation {
    pub label: String,
    pub features: VolumeFeatures,
    pub filesystem_name: String,
}
