//! Error handling and mapping for the virtual drive.
//!
//! Failures from the caches, the remote store and the async bridge are
//! collected into [`DriveError`], which maps each one to a [`DriveStatus`]
//! for the driver and to a POSIX errno for platforms that want one.

use crate::async_bridge::BridgeError;
use crate::status::DriveStatus;
use cloudmount_cache::{ProviderError, StreamError};
use std::io;
use thiserror::Error;

/// Errors that can occur while serving a driver callback.
#[derive(Debug, Error)]
pub enum DriveError {
    /// Content stream error.
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Remote store error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Async bridge error (timeout, cancelled, etc.).
    #[error("Async bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Local IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Parent path or directory does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// File does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Target of a create already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Caller may not perform this operation.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Mutation attempted on a read-only mount.
    #[error("Drive is mounted read-only")]
    ReadOnly,

    /// Context id does not name an open handle.
    #[error("Invalid handle: {0}")]
    InvalidHandle(u64),

    /// Operation not supported.
    #[error("Operation not supported")]
    NotSupported,
}

impl DriveError {
    /// Status reported to the driver for this error.
    pub fn status(&self) -> DriveStatus {
        match self {
            DriveError::Stream(e) => match e {
                StreamError::Timeout(_) => DriveStatus::Timeout,
                StreamError::NotSupported => DriveStatus::NotImplemented,
                StreamError::Io(e) => io_error_status(e),
                StreamError::Closed | StreamError::DownloadAborted(_) => DriveStatus::GenericError,
            },
            DriveError::Provider(e) => match e {
                ProviderError::NotFound(_) => DriveStatus::FileNotFound,
                ProviderError::AlreadyExists(_) => DriveStatus::AlreadyExists,
                ProviderError::Io(e) => io_error_status(e),
                ProviderError::Remote(_) => DriveStatus::GenericError,
            },
            DriveError::Bridge(BridgeError::Timeout(_)) => DriveStatus::Timeout,
            DriveError::Bridge(_) | DriveError::InvalidHandle(_) => DriveStatus::GenericError,
            DriveError::Io(e) => io_error_status(e),
            DriveError::PathNotFound(_) => DriveStatus::PathNotFound,
            DriveError::FileNotFound(_) => DriveStatus::FileNotFound,
            DriveError::AlreadyExists(_) => DriveStatus::AlreadyExists,
            DriveError::AccessDenied(_) | DriveError::ReadOnly => DriveStatus::AccessDenied,
            DriveError::NotSupported => DriveStatus::NotImplemented,
        }
    }

    /// Converts this error to a libc error code.
    pub fn to_errno(&self) -> i32 {
        match self {
            DriveError::Stream(StreamError::Io(e))
            | DriveError::Provider(ProviderError::Io(e))
            | DriveError::Io(e) => io_error_to_errno(e),
            DriveError::Bridge(e) => e.to_errno(),
            DriveError::ReadOnly => libc::EROFS,
            DriveError::InvalidHandle(_) => libc::EBADF,
            DriveError::NotSupported | DriveError::Stream(StreamError::NotSupported) => {
                libc::ENOTSUP
            }
            other => other.status().to_errno(),
        }
    }

    /// Whether this error is an expected refusal rather than a fault.
    pub fn is_denial(&self) -> bool {
        matches!(self, DriveError::AccessDenied(_) | DriveError::ReadOnly)
    }

    /// Whether this error only reports that a path is absent or taken.
    pub fn is_lookup_miss(&self) -> bool {
        matches!(
            self.status(),
            DriveStatus::PathNotFound | DriveStatus::FileNotFound | DriveStatus::AlreadyExists
        )
    }
}

/// Converts an IO error to a libc error code, defaulting to `EIO`.
pub fn io_error_to_errno(e: &io::Error) -> i32 {
    e.raw_os_error().unwrap_or(libc::EIO)
}

fn io_error_status(e: &io::Error) -> DriveStatus {
    match e.kind() {
        io::ErrorKind::NotFound => DriveStatus::FileNotFound,
        io::ErrorKind::PermissionDenied => DriveStatus::AccessDenied,
        io::ErrorKind::AlreadyExists => DriveStatus::AlreadyExists,
        io::ErrorKind::TimedOut => DriveStatus::Timeout,
        _ => DriveStatus::GenericError,
    }
}

/// Result type for drive operations.
pub type DriveResult<T> = Result<T, DriveError>;
