//! Writer for files created through the mount.
//!
//! Bytes go to a local staging file with positional writes, so chunked
//! writers at disjoint offsets proceed in parallel. Two kinds of operation
//! are serialized:
//!
//! - writes whose byte ranges overlap wait for each other (range lock)
//! - length changes, flush and close exclude every write (gate)

use super::{ContentStream, read_full_at, write_all_at};
use crate::error::{StreamError, StreamResult};
use crate::node::Node;
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, trace};

/// Called once when the writer closes, with the final node and staging path.
///
/// This is where an uploader picks the file up.
pub type CloseHook = Box<dyn FnOnce(&Node, &Path) + Send>;

/// Set of byte ranges currently being written.
#[derive(Debug, Default)]
struct RangeLock {
    active: Mutex<Vec<(u64, u64)>>,
    released: Condvar,
}

impl RangeLock {
    fn acquire(&self, start: u64, end: u64) -> RangeGuard<'_> {
        let mut active = self.active.lock();
        while active.iter().any(|&(s, e)| start < e && s < end) {
            self.released.wait(&mut active);
        }
        active.push((start, end));
        RangeGuard {
            lock: self,
            range: (start, end),
        }
    }
}

struct RangeGuard<'a> {
    lock: &'a RangeLock,
    range: (u64, u64),
}

impl Drop for RangeGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.lock.active.lock();
        if let Some(pos) = active.iter().position(|r| *r == self.range) {
            active.swap_remove(pos);
        }
        self.lock.released.notify_all();
    }
}

/// Content stream for a newly created file.
///
/// ```
/// use cloudmount_cache::{ContentStream, Node, NewFileWriter};
///
/// let dir = tempfile::tempdir().unwrap();
/// let node = Node::builder("new", "/hello.txt").build();
/// let writer = NewFileWriter::create(node, dir.path().join("hello.txt")).unwrap();
///
/// writer.write(6, b"world").unwrap();
/// writer.write(0, b"hello ").unwrap();
/// writer.close().unwrap();
/// assert_eq!(writer.node().length, 11);
/// ```
pub struct NewFileWriter {
    file: File,
    staging_path: PathBuf,
    node: Mutex<Node>,
    length: AtomicU64,
    gate: RwLock<()>,
    ranges: RangeLock,
    closed: AtomicBool,
    on_close: Mutex<Option<CloseHook>>,
}

impl NewFileWriter {
    /// Create (or truncate) the staging file at `staging_path`.
    pub fn create(node: Node, staging_path: impl Into<PathBuf>) -> io::Result<Self> {
        let staging_path = staging_path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging_path)?;
        debug!(path = %node.path, staging = %staging_path.display(), "Created new file writer");
        Ok(Self {
            file,
            staging_path,
            node: Mutex::new(Node { length: 0, ..node }),
            length: AtomicU64::new(0),
            gate: RwLock::new(()),
            ranges: RangeLock::default(),
            closed: AtomicBool::new(false),
            on_close: Mutex::new(None),
        })
    }

    /// Register a hook to run when the writer is closed.
    #[must_use]
    pub fn on_close(self, hook: CloseHook) -> Self {
        *self.on_close.lock() = Some(hook);
        self
    }

    /// Snapshot of the node with the current length.
    pub fn node(&self) -> Node {
        let mut node = self.node.lock().clone();
        node.length = self.length.load(Ordering::Acquire);
        node
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }
}

impl fmt::Debug for NewFileWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewFileWriter")
            .field("staging_path", &self.staging_path)
            .field("length", &self.length.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ContentStream for NewFileWriter {
    fn read(&self, offset: u64, buf: &mut [u8], _timeout: Duration) -> StreamResult<usize> {
        let _gate = self.gate.read();
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }
        let length = self.length.load(Ordering::Acquire);
        if offset >= length {
            return Ok(0);
        }
        let available = usize::try_from(length - offset).unwrap_or(usize::MAX);
        let n = buf.len().min(available);
        Ok(read_full_at(&self.file, &mut buf[..n], offset)?)
    }

    fn write(&self, offset: u64, data: &[u8]) -> StreamResult<usize> {
        let _gate = self.gate.read();
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let end = offset.checked_add(data.len() as u64).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "write past the largest file offset")
        })?;
        {
            let _range = self.ranges.acquire(offset, end);
            write_all_at(&self.file, data, offset)?;
        }
        self.length.fetch_max(end, Ordering::AcqRel);
        trace!(offset, len = data.len(), "Staged write");
        Ok(data.len())
    }

    fn set_length(&self, length: u64) -> StreamResult<()> {
        let _gate = self.gate.write();
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }
        self.file.set_len(length)?;
        self.length.store(length, Ordering::Release);
        Ok(())
    }

    fn flush(&self) -> StreamResult<()> {
        let _gate = self.gate.write();
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }
        self.file.sync_data()?;
        Ok(())
    }

    fn close(&self) -> StreamResult<()> {
        let _gate = self.gate.write();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.file.sync_all()?;

        let node = {
            let mut node = self.node.lock();
            node.length = self.length.load(Ordering::Acquire);
            node.last_write = SystemTime::now();
            node.clone()
        };
        debug!(path = %node.path, length = node.length, "Closed new file writer");

        if let Some(hook) = self.on_close.lock().take() {
            hook(&node, &self.staging_path);
        }
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::Acquire)
    }
}
