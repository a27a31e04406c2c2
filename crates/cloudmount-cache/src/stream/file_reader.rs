use super::{ContentStream, read_full_at};
use crate::error::{StreamError, StreamResult};
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Reads a complete local file.
#[derive(Debug)]
pub struct FileReader {
    file: File,
    length: u64,
    closed: AtomicBool,
}

impl FileReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        Ok(Self {
            file,
            length,
            closed: AtomicBool::new(false),
        })
    }
}

impl ContentStream for FileReader {
    fn read(&self, offset: u64, buf: &mut [u8], _timeout: Duration) -> StreamResult<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }
        if offset >= self.length {
            return Ok(0);
        }
        Ok(read_full_at(&self.file, buf, offset)?)
    }

    fn close(&self) -> StreamResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_and_reject_write() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();

        let reader = FileReader::open(tmp.path()).unwrap();
        assert_eq!(reader.length(), 10);

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(8, &mut buf, Duration::ZERO).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
        assert!(matches!(
            reader.write(0, b"x"),
            Err(StreamError::NotSupported)
        ));
    }
}
