//! Per-open handle state.
//!
//! Every successful `create_file` attaches an [`OpenHandle`] to the driver
//! context. The handle moves through [`HandleState`] as the driver opens,
//! cleans up and closes it; content access goes through the attached
//! [`ContentStream`] when there is one.

use cloudmount_cache::{ContentStream, HandleTable, StreamResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// What a handle is attached to.
pub enum HandleKind {
    /// Attribute or security access only, no data.
    Marker,
    /// An open directory.
    Directory,
    /// File content: remote reader, staged writer or in-memory buffer.
    Stream(Box<dyn ContentStream>),
}

impl fmt::Debug for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Marker => f.write_str("Marker"),
            HandleKind::Directory => f.write_str("Directory"),
            HandleKind::Stream(s) => f.debug_tuple("Stream").field(s).finish(),
        }
    }
}

/// Lifecycle of an open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Opening,
    Open,
    Closing,
    Closed,
}

impl HandleState {
    fn can_become(self, next: HandleState) -> bool {
        matches!(
            (self, next),
            (HandleState::Opening, HandleState::Open | HandleState::Closing)
                | (HandleState::Open, HandleState::Closing | HandleState::Closed)
                | (HandleState::Closing, HandleState::Closed)
        )
    }
}

/// Driver-visible context of one open operation.
#[derive(Debug)]
pub struct OpenHandle {
    path: String,
    kind: HandleKind,
    writable: bool,
    state: Mutex<HandleState>,
}

impl OpenHandle {
    pub fn new(path: impl Into<String>, kind: HandleKind) -> Self {
        Self {
            path: path.into(),
            kind,
            writable: false,
            state: Mutex::new(HandleState::Opening),
        }
    }

    /// Marks the handle as carrying writes that must be reflected in metadata on close.
    #[must_use]
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> &HandleKind {
        &self.kind
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, HandleKind::Directory)
    }

    pub fn stream(&self) -> Option<&dyn ContentStream> {
        match &self.kind {
            HandleKind::Stream(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn state(&self) -> HandleState {
        *self.state.lock()
    }

    /// Moves to `next`. Illegal transitions are logged and ignored.
    pub fn transition(&self, next: HandleState) -> bool {
        let mut state = self.state.lock();
        if state.can_become(next) {
            *state = next;
            true
        } else {
            warn!(path = %self.path, from = ?*state, to = ?next, "Ignoring illegal handle transition");
            false
        }
    }

    /// Closes the attached stream, if any. Safe to call more than once.
    pub fn release(&self) -> StreamResult<()> {
        match &self.kind {
            HandleKind::Stream(s) => s.close(),
            _ => Ok(()),
        }
    }
}

/// Thread-safe table of open handles keyed by driver context id.
pub type DriveHandleTable = HandleTable<u64, Arc<OpenHandle>>;

#[cfg(test)]
mod tests {
    use super::*;
    use cloudmount_cache::{ByteArrayReader, StreamError};
    use std::time::Duration;

    #[test]
    fn test_lifecycle() {
        let handle = OpenHandle::new("/a", HandleKind::Marker);
        assert_eq!(handle.state(), HandleState::Opening);
        assert!(handle.transition(HandleState::Open));
        assert!(handle.transition(HandleState::Closing));
        assert!(handle.transition(HandleState::Closed));
        assert_eq!(handle.state(), HandleState::Closed);
    }

    #[test]
    fn test_illegal_transition_ignored() {
        let handle = OpenHandle::new("/a", HandleKind::Directory);
        assert!(!handle.transition(HandleState::Closed));
        assert_eq!(handle.state(), HandleState::Opening);

        handle.transition(HandleState::Open);
        handle.transition(HandleState::Closed);
        assert!(!handle.transition(HandleState::Open));
        assert_eq!(handle.state(), HandleState::Closed);
    }

    #[test]
    fn test_release_closes_stream() {
        let reader = ByteArrayReader::new(b"abc".to_vec());
        let handle = OpenHandle::new("/a:info", HandleKind::Stream(Box::new(reader)));
        let mut buf = [0u8; 3];
        let stream = handle.stream().unwrap();
        assert_eq!(stream.read(0, &mut buf, Duration::from_secs(1)).unwrap(), 3);

        handle.release().unwrap();
        assert!(matches!(
            stream.read(0, &mut buf, Duration::from_secs(1)),
            Err(StreamError::Closed)
        ));
        handle.release().unwrap();
    }

    #[test]
    fn test_table_operations() {
        let table = DriveHandleTable::new();
        let id = table.insert_auto(Arc::new(OpenHandle::new("/d", HandleKind::Directory)));
        assert_eq!(id, 1);
        assert!(table.get_cloned(&id).unwrap().is_directory());
        assert!(table.remove(&id).is_some());
        assert!(table.is_empty());
    }
}
