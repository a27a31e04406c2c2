//! Error types for content streams and external collaborators.
//!
//! Cache lookups never fail; absence is an ordinary `None`. The errors here
//! cover byte I/O on open handles and calls into the remote store.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors from [`ContentStream`](crate::ContentStream) operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The requested bytes did not become available in time.
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// The stream was already closed.
    #[error("stream is closed")]
    Closed,

    /// The stream variant does not support this operation.
    #[error("operation not supported by this stream")]
    NotSupported,

    /// The background download stopped before the requested range arrived.
    #[error("download aborted for {0}")]
    DownloadAborted(String),

    /// IO error on the local staging file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors reported by a [`StorageProvider`](crate::StorageProvider) or
/// [`DownloadClient`](crate::DownloadClient).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failure reported by the remote store itself.
    #[error("remote store error: {0}")]
    Remote(String),
}

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;
