//! Byte-range streams behind every open handle.
//!
//! All variants implement [`ContentStream`] with `&self` methods so a single
//! open handle can serve overlapping calls from several driver threads.
//!
//! | Variant | Backing | Writes |
//! |---------|---------|--------|
//! | [`NewFileWriter`] | local staging file | yes, disjoint ranges in parallel |
//! | [`FileReader`] | complete local file | no |
//! | [`PartialDownloadReader`] | staging file still being downloaded | no |
//! | [`ByteArrayReader`] | in-memory bytes | ignored |

mod byte_array;
mod file_reader;
mod new_file;
mod partial;

pub use byte_array::ByteArrayReader;
pub use file_reader::FileReader;
pub use new_file::{CloseHook, NewFileWriter};
pub use partial::{DownloadProgress, DownloadStatus, PartialDownloadReader};

use crate::error::{StreamError, StreamResult};
use std::fmt;
use std::fs::File;
use std::io;
use std::time::Duration;

/// Uniform read/write interface over a byte range.
pub trait ContentStream: Send + Sync + fmt::Debug {
    /// Read up to `buf.len()` bytes at `offset`.
    ///
    /// Returns 0 at end of file. Variants whose data is still arriving wait
    /// up to `timeout` and fail with [`StreamError::Timeout`] rather than
    /// returning a short read.
    fn read(&self, offset: u64, buf: &mut [u8], timeout: Duration) -> StreamResult<usize>;

    /// Write `data` at `offset`, returning the number of bytes accepted.
    fn write(&self, _offset: u64, _data: &[u8]) -> StreamResult<usize> {
        Err(StreamError::NotSupported)
    }

    /// Truncate or extend the stream.
    fn set_length(&self, _length: u64) -> StreamResult<()> {
        Err(StreamError::NotSupported)
    }

    fn flush(&self) -> StreamResult<()> {
        Ok(())
    }

    /// Release the stream. Idempotent.
    fn close(&self) -> StreamResult<()>;

    /// Current logical length in bytes.
    fn length(&self) -> u64;
}

/// Read from `file` at `offset` until `buf` is full or EOF.
pub(crate) fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match read_at(file, &mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write all of `data` to `file` at `offset`.
pub(crate) fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> io::Result<()> {
    while !data.is_empty() {
        match write_at(file, data, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                data = &data[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(unix)]
fn write_at(file: &File, data: &[u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, data, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(windows)]
fn write_at(file: &File, data: &[u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, data, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_helpers() {
        let file = tempfile::tempfile().unwrap();
        write_all_at(&file, b"world", 6).unwrap();
        write_all_at(&file, b"hello ", 0).unwrap();

        let mut buf = [0u8; 11];
        assert_eq!(read_full_at(&file, &mut buf, 0).unwrap(), 11);
        assert_eq!(&buf, b"hello world");

        let mut tail = [0u8; 8];
        assert_eq!(read_full_at(&file, &mut tail, 6).unwrap(), 5);
        assert_eq!(&tail[..5], b"world");
    }
}
