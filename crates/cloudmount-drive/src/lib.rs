//! Filesystem callback adapter for a remote object store.
//!
//! This crate turns synchronous, multi-threaded filesystem driver callbacks
//! into operations on the caches from `cloudmount-cache` and on a remote
//! [`StorageProvider`](cloudmount_cache::StorageProvider).
//!
//! # Features
//!
//! - Metadata and listing caching with independent TTLs
//! - Deduplicated background downloads that can be read while in flight
//! - Read-only mounts enforced before any cache or remote access
//! - Creator-only access control through a pluggable [`IdentityResolver`]
//! - A synthetic alternate stream exposing each node's remote metadata
//! - Panic containment at the callback boundary
//!
//! # Usage
//!
//! ```ignore
//! use cloudmount_drive::{DriveFileInfo, MountConfig, VirtualDrive};
//!
//! let drive = VirtualDrive::new(config, provider, client, identity, pid, handle)?;
//! let entries = drive.find_files("\\Documents", &DriveFileInfo::new(pid))?;
//! ```

pub mod async_bridge;
pub mod config;
pub mod drive;
pub mod error;
pub mod handles;
pub mod identity;
pub mod info;
pub mod status;

pub use async_bridge::{BridgeError, BridgeStats};
pub use config::MountConfig;
pub use drive::{MountHook, VirtualDrive};
pub use error::{DriveError, DriveResult};
pub use handles::{DriveHandleTable, HandleKind, HandleState, OpenHandle};
pub use identity::{AccessPolicy, FixedIdentity, IdentityResolver, SYSTEM_IDENTITY};
pub use info::{
    DiskFreeSpace, DriveFileInfo, FileAttributes, FileInformation, VolumeFeatures,
    VolumeInformation,
};
pub use status::{DriveReply, DriveStatus};
