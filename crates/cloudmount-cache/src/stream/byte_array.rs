use super::ContentStream;
use crate::error::{StreamError, StreamResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Serves a fixed in-memory byte array; writes are accepted and dropped.
///
/// Used for synthetic side streams such as the per-file info stream.
#[derive(Debug)]
pub struct ByteArrayReader {
    data: Vec<u8>,
    closed: AtomicBool,
}

impl ByteArrayReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            closed: AtomicBool::new(false),
        }
    }
}

impl ContentStream for ByteArrayReader {
    fn read(&self, offset: u64, buf: &mut [u8], _timeout: Duration) -> StreamResult<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn write(&self, _offset: u64, _data: &[u8]) -> StreamResult<usize> {
        Ok(0)
    }

    fn close(&self) -> StreamResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }
}
