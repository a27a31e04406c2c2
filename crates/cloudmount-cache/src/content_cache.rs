//! Streaming cache of remote file content.
//!
//! Each remote file id maps to one staging file under the cache directory.
//! The first open starts a background download that appends to it; every
//! open, including the first, gets a [`PartialDownloadReader`] that can
//! serve bytes as soon as they are staged.
//!
//! The start-or-join decision is made while holding the `DashMap` entry for
//! the id, so at most one download per id is ever running. Remote failures
//! are retried after the retry delay and only show up to readers as data
//! arriving later; a download is abandoned only when the staging file
//! cannot be written. Once a staging file is complete, opens get a plain
//! [`FileReader`]. Eviction of staging files is left to an external policy.

use crate::error::StreamResult;
use crate::node::Node;
use crate::provider::{ByteConsumer, DownloadClient};
use crate::stream::{
    ContentStream, DownloadProgress, DownloadStatus, FileReader, PartialDownloadReader,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};

/// Default delay before re-requesting after a short download (500ms).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Counters for download activity.
#[derive(Debug, Default)]
pub struct ContentCacheStats {
    pub downloads_started: AtomicU64,
    pub downloads_completed: AtomicU64,
    pub downloads_failed: AtomicU64,
    /// Remote attempts that errored and were scheduled again.
    pub download_retries: AtomicU64,
    /// Opens served from an existing complete staging file.
    pub cache_hits: AtomicU64,
}

/// Streaming content cache keyed by remote file id.
pub struct ContentCache {
    cache_dir: PathBuf,
    client: Arc<dyn DownloadClient>,
    runtime: Handle,
    retry_delay: Duration,
    downloads: DashMap<String, Arc<DownloadProgress>>,
    stats: Arc<ContentCacheStats>,
}

impl ContentCache {
    /// Create a cache staging files under `cache_dir`.
    ///
    /// Downloads are spawned on `runtime`.
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        client: Arc<dyn DownloadClient>,
        runtime: Handle,
    ) -> io::Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            client,
            runtime,
            retry_delay: DEFAULT_RETRY_DELAY,
            downloads: DashMap::new(),
            stats: Arc::new(ContentCacheStats::default()),
        })
    }

    /// Sets the delay between download attempts after a short read.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn stats(&self) -> &ContentCacheStats {
        &self.stats
    }

    /// Number of downloads currently running.
    pub fn active_downloads(&self) -> usize {
        self.downloads
            .iter()
            .filter(|p| p.status() == DownloadStatus::Running)
            .count()
    }

    /// Progress of the download for `id`, if one was ever started.
    pub fn progress(&self, id: &str) -> Option<Arc<DownloadProgress>> {
        self.downloads.get(id).map(|p| Arc::clone(&p))
    }

    /// Staging file location for a remote id.
    ///
    /// Characters outside `[A-Za-z0-9._-]` are percent-escaped so that
    /// distinct ids never share a path.
    pub fn staging_path(&self, id: &str) -> PathBuf {
        let mut name = String::with_capacity(id.len());
        for byte in id.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
                name.push(char::from(byte));
            } else {
                let _ = write!(name, "%{byte:02X}");
            }
        }
        // Keep "." and ".." from resolving to directories
        if name.chars().all(|c| c == '.') {
            name = name.replace('.', "%2E");
        }
        self.cache_dir.join(name)
    }

    /// Open a remote file for reading through its staging file.
    ///
    /// Starts a download if none is running and the staging file is short,
    /// or joins the running one.
    pub fn open_for_read(&self, node: &Node) -> StreamResult<Box<dyn ContentStream>> {
        let path = self.staging_path(&node.id);

        let progress = match self.downloads.entry(node.id.clone()) {
            Entry::Occupied(mut entry) => {
                let progress = Arc::clone(entry.get());
                match progress.status() {
                    // A second writer on the same staging file would corrupt it,
                    // so a running download is joined even if the length moved.
                    DownloadStatus::Running => {
                        trace!(id = %node.id, "File is already downloading");
                        progress
                    }
                    DownloadStatus::Failed if progress.target() == node.length => {
                        let writer = open_staging(&path, node.length)?;
                        let staged = writer.metadata()?.len();
                        progress.restart(staged);
                        self.spawn_download(node, writer, Arc::clone(&progress));
                        progress
                    }
                    DownloadStatus::Complete
                        if progress.target() == node.length
                            && staged_len(&path) == node.length =>
                    {
                        self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                        progress
                    }
                    // Remote length changed or staging file went away
                    _ => {
                        let fresh = self.start_or_reuse(node, &path)?;
                        entry.insert(Arc::clone(&fresh));
                        fresh
                    }
                }
            }
            Entry::Vacant(entry) => {
                let progress = self.start_or_reuse(node, &path)?;
                entry.insert(Arc::clone(&progress));
                progress
            }
        };

        if progress.status() == DownloadStatus::Complete {
            trace!(id = %node.id, "Opened complete staging file");
            return Ok(Box::new(FileReader::open(&path)?));
        }

        let file = File::open(&path)?;
        trace!(id = %node.id, "Opened cached");
        Ok(Box::new(PartialDownloadReader::new(
            node.id.clone(),
            file,
            progress,
        )))
    }

    fn start_or_reuse(&self, node: &Node, path: &Path) -> io::Result<Arc<DownloadProgress>> {
        let writer = open_staging(path, node.length)?;
        let staged = writer.metadata()?.len();
        if staged == node.length {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::new(DownloadProgress::complete(node.length)));
        }

        let progress = Arc::new(DownloadProgress::running(staged, node.length));
        self.spawn_download(node, writer, Arc::clone(&progress));
        Ok(progress)
    }

    fn spawn_download(&self, node: &Node, writer: File, progress: Arc<DownloadProgress>) {
        self.stats.downloads_started.fetch_add(1, Ordering::Relaxed);
        let client = Arc::clone(&self.client);
        let stats = Arc::clone(&self.stats);
        let id = node.id.clone();
        let retry_delay = self.retry_delay;
        self.runtime.spawn(async move {
            let _abandon = AbandonGuard {
                progress: Arc::clone(&progress),
                stats: Arc::clone(&stats),
            };
            download(client, id, writer, progress, retry_delay, stats).await;
        });
    }
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("cache_dir", &self.cache_dir)
            .field("downloads", &self.downloads.len())
            .finish_non_exhaustive()
    }
}

/// Open the staging file for appending, discarding it if it is longer
/// than the remote file.
fn open_staging(path: &Path, target: u64) -> io::Result<File> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() > target {
        warn!(path = %path.display(), "Staging file longer than remote file, discarding");
        file.set_len(0)?;
    }
    Ok(file)
}

fn staged_len(path: &Path) -> u64 {
    fs::metadata(path).map_or(0, |m| m.len())
}

/// Fails a download whose task ends without reaching `finish()`, such as
/// after a panic in the client or a runtime shutdown, so the next open can
/// start over instead of joining a download that no longer runs.
struct AbandonGuard {
    progress: Arc<DownloadProgress>,
    stats: Arc<ContentCacheStats>,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.progress.status() == DownloadStatus::Running {
            warn!(staged = self.progress.staged(), "Download task ended early");
            self.stats.downloads_failed.fetch_add(1, Ordering::Relaxed);
            self.progress.fail();
        }
    }
}

/// Appends downloaded bytes to the staging file and reports progress.
struct StagingSink {
    file: File,
    progress: Arc<DownloadProgress>,
    id: String,
    started: Instant,
    first_chunk: bool,
    /// Set when the staging file itself could not be written.
    write_failed: bool,
}

impl ByteConsumer for StagingSink {
    fn consume(&mut self, chunk: &[u8]) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.file.write_all(chunk) {
            self.write_failed = true;
            return Err(e);
        }
        if self.first_chunk {
            self.first_chunk = false;
            trace!(id = %self.id, elapsed_ms = self.started.elapsed().as_millis(), "Got first part");
        }
        self.progress.advance(chunk.len() as u64);
        Ok(())
    }
}

async fn download(
    client: Arc<dyn DownloadClient>,
    id: String,
    file: File,
    progress: Arc<DownloadProgress>,
    retry_delay: Duration,
    stats: Arc<ContentCacheStats>,
) {
    debug!(id = %id, staged = progress.staged(), target = progress.target(), "Started download");
    let target = progress.target();
    let mut sink = StagingSink {
        file,
        progress: Arc::clone(&progress),
        id: id.clone(),
        started: Instant::now(),
        first_chunk: true,
        write_failed: false,
    };

    loop {
        let staged = progress.staged();
        if staged >= target {
            break;
        }
        if let Err(e) = client.download(&id, staged, &mut sink).await {
            if sink.write_failed {
                error!(id = %id, error = %e, "Cannot write staging file, abandoning download");
                stats.downloads_failed.fetch_add(1, Ordering::Relaxed);
                progress.fail();
                return;
            }
            warn!(id = %id, staged = progress.staged(), error = %e, "Download attempt failed, retrying");
            stats.download_retries.fetch_add(1, Ordering::Relaxed);
        }
        if progress.staged() < target {
            tokio::time::sleep(retry_delay).await;
        }
    }

    if let Err(e) = sink.file.sync_data() {
        warn!(id = %id, error = %e, "Failed to sync staging file");
    }
    stats.downloads_completed.fetch_add(1, Ordering::Relaxed);
    progress.finish();
    debug!(id = %id, "Finished download");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, ProviderResult, StreamError};
    use async_trait::async_trait;

    /// Serves a fixed byte vector, at most `max_chunk` bytes per call.
    struct FixedClient {
        data: Vec<u8>,
        max_chunk: usize,
        calls: AtomicU64,
    }

    #[async_trait]
    impl DownloadClient for FixedClient {
        async fn download(
            &self,
            _id: &str,
            offset: u64,
            consumer: &mut (dyn ByteConsumer + Send),
        ) -> ProviderResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let start = usize::try_from(offset).unwrap();
            let end = start.saturating_add(self.max_chunk).min(self.data.len());
            for chunk in self.data[start..end].chunks(7) {
                consumer.consume(chunk)?;
            }
            Ok(())
        }
    }

    /// Errors on its first `failures` calls, then serves `data`.
    struct FlakyClient {
        data: Vec<u8>,
        failures: u64,
        calls: AtomicU64,
    }

    impl FlakyClient {
        fn new(data: &[u8], failures: u64) -> Self {
            Self {
                data: data.to_vec(),
                failures,
                calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl DownloadClient for FlakyClient {
        async fn download(
            &self,
            _id: &str,
            offset: u64,
            consumer: &mut (dyn ByteConsumer + Send),
        ) -> ProviderResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ProviderError::Remote("503 throttled".into()));
            }
            let start = usize::try_from(offset).unwrap();
            consumer.consume(&self.data[start..])?;
            Ok(())
        }
    }

    /// Panics on its first call, then serves `data`.
    struct PanickyClient {
        data: Vec<u8>,
        calls: AtomicU64,
    }

    #[async_trait]
    impl DownloadClient for PanickyClient {
        async fn download(
            &self,
            _id: &str,
            offset: u64,
            consumer: &mut (dyn ByteConsumer + Send),
        ) -> ProviderResult<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("client bug");
            }
            let start = usize::try_from(offset).unwrap();
            consumer.consume(&self.data[start..])?;
            Ok(())
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    fn read_all(stream: &dyn ContentStream) -> Vec<u8> {
        let mut out = vec![0u8; usize::try_from(stream.length()).unwrap()];
        let n = stream.read(0, &mut out, Duration::from_secs(10)).unwrap();
        out.truncate(n);
        out
    }

    #[test]
    fn test_staging_paths_are_distinct() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FlakyClient::new(b"", 0));
        let cache = ContentCache::new(dir.path(), client, rt.handle().clone()).unwrap();

        let a = cache.staging_path("a/b");
        let b = cache.staging_path("a%2Fb");
        assert_ne!(a, b);
        assert_eq!(a.parent().unwrap(), dir.path());
        assert_ne!(cache.staging_path(".."), dir.path().join(".."));
    }

    #[test]
    fn test_download_in_chunks_with_short_reads() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let client = Arc::new(FixedClient {
            data: data.clone(),
            max_chunk: 300,
            calls: AtomicU64::new(0),
        });
        let cache = ContentCache::new(dir.path(), client.clone(), rt.handle().clone())
            .unwrap()
            .retry_delay(Duration::from_millis(1));

        let node = Node::builder("file-1", "/f.bin").length(1000).build();
        let stream = cache.open_for_read(&node).unwrap();
        assert_eq!(read_all(stream.as_ref()), data);
        assert!(client.calls.load(Ordering::SeqCst) >= 4);
    }

    #[test]
    fn test_complete_staging_file_is_reused() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FixedClient {
            data: b"hello".to_vec(),
            max_chunk: usize::MAX,
            calls: AtomicU64::new(0),
        });
        let cache = ContentCache::new(dir.path(), client.clone(), rt.handle().clone()).unwrap();
        fs::write(cache.staging_path("h"), b"hello").unwrap();

        let node = Node::builder("h", "/h.txt").length(5).build();
        let stream = cache.open_for_read(&node).unwrap();
        assert_eq!(read_all(stream.as_ref()), b"hello");
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().downloads_started.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_partial_staging_file_is_resumed() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FixedClient {
            data: b"0123456789".to_vec(),
            max_chunk: usize::MAX,
            calls: AtomicU64::new(0),
        });
        let cache = ContentCache::new(dir.path(), client.clone(), rt.handle().clone()).unwrap();
        fs::write(cache.staging_path("r"), b"0123").unwrap();

        let node = Node::builder("r", "/r.txt").length(10).build();
        let stream = cache.open_for_read(&node).unwrap();
        assert_eq!(read_all(stream.as_ref()), b"0123456789");
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remote_failure_is_retried() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FlakyClient::new(b"0123456789", 2));
        let cache = ContentCache::new(dir.path(), client.clone(), rt.handle().clone())
            .unwrap()
            .retry_delay(Duration::from_millis(5));

        let node = Node::builder("flaky", "/flaky").length(10).build();
        let stream = cache.open_for_read(&node).unwrap();
        let mut buf = [0u8; 10];
        let n = stream.read(0, &mut buf, Duration::from_secs(5)).unwrap();
        assert_eq!(&buf[..n], b"0123456789");

        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.stats().download_retries.load(Ordering::Relaxed), 2);
        assert_eq!(cache.stats().downloads_failed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_persistent_remote_failure_only_delays_reads() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FlakyClient::new(b"0123456789", u64::MAX));
        let cache = ContentCache::new(dir.path(), client, rt.handle().clone())
            .unwrap()
            .retry_delay(Duration::from_millis(5));

        let node = Node::builder("down", "/down").length(10).build();
        let stream = cache.open_for_read(&node).unwrap();
        let mut buf = [0u8; 4];
        let result = stream.read(0, &mut buf, Duration::from_millis(100));
        assert!(matches!(result, Err(StreamError::Timeout(_))));
        assert_eq!(cache.active_downloads(), 1);
        assert_eq!(cache.stats().downloads_failed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_panicked_download_can_be_restarted() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(PanickyClient {
            data: b"abcdef".to_vec(),
            calls: AtomicU64::new(0),
        });
        let cache = ContentCache::new(dir.path(), client.clone(), rt.handle().clone()).unwrap();
        let node = Node::builder("p", "/p").length(6).build();

        let first = cache.open_for_read(&node).unwrap();
        let mut buf = [0u8; 6];
        let result = first.read(0, &mut buf, Duration::from_secs(5));
        assert!(matches!(result, Err(StreamError::DownloadAborted(_))));
        assert_eq!(cache.active_downloads(), 0);

        let second = cache.open_for_read(&node).unwrap();
        let n = second.read(0, &mut buf, Duration::from_secs(5)).unwrap();
        assert_eq!(&buf[..n], b"abcdef");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().downloads_started.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_complete_staging_file_gets_plain_reader() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FlakyClient::new(b"", 0));
        let cache = ContentCache::new(dir.path(), client.clone(), rt.handle().clone()).unwrap();
        fs::write(cache.staging_path("done"), b"cached").unwrap();

        let node = Node::builder("done", "/done").length(6).build();
        let stream = cache.open_for_read(&node).unwrap();
        assert_eq!(stream.length(), 6);
        assert_eq!(read_all(stream.as_ref()), b"cached");
        assert!(cache.progress("done").is_some());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }
}
