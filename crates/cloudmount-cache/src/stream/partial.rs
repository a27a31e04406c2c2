//! Reader over a staging file that is still being downloaded.
//!
//! The download task appends to the staging file and reports each chunk to
//! a shared [`DownloadProgress`]. Readers block on its condition variable
//! until the bytes they asked for are staged, the download ends, or their
//! timeout passes.

use super::{ContentStream, read_full_at};
use crate::error::{StreamError, StreamResult};
use parking_lot::{Condvar, Mutex};
use std::fs::File;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Lifecycle of a background download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Running,
    Complete,
    Failed,
}

#[derive(Debug)]
struct ProgressState {
    staged: u64,
    status: DownloadStatus,
}

/// Shared download progress for one remote file.
#[derive(Debug)]
pub struct DownloadProgress {
    target: u64,
    state: Mutex<ProgressState>,
    changed: Condvar,
}

impl DownloadProgress {
    /// Progress for a download that still has to fetch `target - staged` bytes.
    pub fn running(staged: u64, target: u64) -> Self {
        Self {
            target,
            state: Mutex::new(ProgressState {
                staged,
                status: DownloadStatus::Running,
            }),
            changed: Condvar::new(),
        }
    }

    /// Progress for a staging file that is already complete.
    pub fn complete(target: u64) -> Self {
        Self {
            target,
            state: Mutex::new(ProgressState {
                staged: target,
                status: DownloadStatus::Complete,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn staged(&self) -> u64 {
        self.state.lock().staged
    }

    pub fn status(&self) -> DownloadStatus {
        self.state.lock().status
    }

    /// Record `bytes` newly appended to the staging file.
    pub fn advance(&self, bytes: u64) {
        let mut state = self.state.lock();
        state.staged += bytes;
        self.changed.notify_all();
    }

    pub fn finish(&self) {
        self.set_status(DownloadStatus::Complete);
    }

    pub fn fail(&self) {
        self.set_status(DownloadStatus::Failed);
    }

    /// Resume a failed download from `staged` bytes.
    pub fn restart(&self, staged: u64) {
        let mut state = self.state.lock();
        state.staged = staged;
        state.status = DownloadStatus::Running;
        self.changed.notify_all();
    }

    fn set_status(&self, status: DownloadStatus) {
        let mut state = self.state.lock();
        state.status = status;
        self.changed.notify_all();
    }

    /// Block until at least `end` bytes are staged.
    ///
    /// Returns early once the download completes. Fails with
    /// [`StreamError::DownloadAborted`] if the download stopped short, or
    /// [`StreamError::Timeout`] if `timeout` passes first.
    pub fn wait_for(&self, id: &str, end: u64, timeout: Duration) -> StreamResult<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.staged >= end || state.status == DownloadStatus::Complete {
                return Ok(());
            }
            if state.status == DownloadStatus::Failed {
                return Err(StreamError::DownloadAborted(id.to_string()));
            }
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return if state.staged >= end {
                    Ok(())
                } else {
                    Err(StreamError::Timeout(timeout))
                };
            }
        }
    }
}

/// Content stream over a possibly incomplete staging file.
#[derive(Debug)]
pub struct PartialDownloadReader {
    id: String,
    file: File,
    progress: Arc<DownloadProgress>,
    closed: AtomicBool,
}

impl PartialDownloadReader {
    pub fn new(id: String, file: File, progress: Arc<DownloadProgress>) -> Self {
        Self {
            id,
            file,
            progress,
            closed: AtomicBool::new(false),
        }
    }
}

impl ContentStream for PartialDownloadReader {
    fn read(&self, offset: u64, buf: &mut [u8], timeout: Duration) -> StreamResult<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }
        let target = self.progress.target();
        if offset >= target {
            return Ok(0);
        }
        let end = target.min(offset + buf.len() as u64);
        self.progress.wait_for(&self.id, end, timeout)?;

        #[allow(clippy::cast_possible_truncation)]
        let want = (end - offset) as usize;
        Ok(read_full_at(&self.file, &mut buf[..want], offset)?)
    }

    fn close(&self) -> StreamResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn length(&self) -> u64 {
        self.progress.target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::thread;

    fn staging() -> (tempfile::NamedTempFile, File) {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let reader = File::open(tmp.path()).unwrap();
        (tmp, reader)
    }

    #[test]
    fn test_complete_file_reads_immediately() {
        let (mut tmp, file) = staging();
        tmp.write_all(b"complete").unwrap();
        let reader = PartialDownloadReader::new(
            "id".into(),
            file,
            Arc::new(DownloadProgress::complete(8)),
        );

        let mut buf = [0u8; 16];
        assert_eq!(reader.read(0, &mut buf, Duration::ZERO).unwrap(), 8);
        assert_eq!(&buf[..8], b"complete");
        assert_eq!(reader.read(8, &mut buf, Duration::ZERO).unwrap(), 0);
    }

    #[test]
    fn test_read_times_out_when_bytes_never_arrive() {
        let (_tmp, file) = staging();
        let progress = Arc::new(DownloadProgress::running(0, 100));
        let reader = PartialDownloadReader::new("id".into(), file, progress);

        let mut buf = [0u8; 10];
        let start = Instant::now();
        let result = reader.read(0, &mut buf, Duration::from_millis(50));
        assert!(matches!(result, Err(StreamError::Timeout(_))));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_read_wakes_when_bytes_are_staged() {
        let (mut tmp, file) = staging();
        let progress = Arc::new(DownloadProgress::running(0, 6));
        let reader = PartialDownloadReader::new("id".into(), file, Arc::clone(&progress));

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tmp.write_all(b"abc").unwrap();
            tmp.flush().unwrap();
            progress.advance(3);
            thread::sleep(Duration::from_millis(20));
            tmp.write_all(b"def").unwrap();
            tmp.flush().unwrap();
            progress.advance(3);
            progress.finish();
            tmp
        });

        let mut buf = [0u8; 6];
        let n = reader.read(0, &mut buf, Duration::from_secs(5)).unwrap();
        assert_eq!(n, 6, "reader must not return a short read");
        assert_eq!(&buf, b"abcdef");
        let _tmp = writer.join().unwrap();
    }

    #[test]
    fn test_failed_download_aborts_waiters() {
        let (_tmp, file) = staging();
        let progress = Arc::new(DownloadProgress::running(0, 10));
        let reader = PartialDownloadReader::new("xyz".into(), file, Arc::clone(&progress));
        progress.fail();

        let mut buf = [0u8; 4];
        assert!(matches!(
            reader.read(0, &mut buf, Duration::from_secs(5)),
            Err(StreamError::DownloadAborted(id)) if id == "xyz"
        ));
    }

    #[test]
    fn test_restart_resets_status() {
        let progress = DownloadProgress::running(0, 10);
        progress.fail();
        assert_eq!(progress.status(), DownloadStatus::Failed);
        progress.restart(4);
        assert_eq!(progress.status(), DownloadStatus::Running);
        assert_eq!(progress.staged(), 4);
    }
}
