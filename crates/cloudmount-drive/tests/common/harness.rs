//! Test harness for drive integration tests.
//!
//! Provides a `TestDrive` wired to an in-memory remote store, a fixed
//! process-owner table and a private staging directory, along with
//! open/read/write helpers that walk the full callback sequence.

use cloudmount_cache::testing::MemoryStore;
use cloudmount_cache::{FileAccess, FileMode, FileOptions, FileShare};
use cloudmount_drive::{
    DriveFileInfo, DriveReply, IdentityResolver, MountConfig, SYSTEM_IDENTITY, VirtualDrive,
};
use cloudmount_cache::DownloadStatus;
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Process of the user who mounted the drive.
pub const CREATOR_PID: u32 = 100;

/// Process running as the system account.
pub const SYSTEM_PID: u32 = 4;

/// Process of some other user.
pub const STRANGER_PID: u32 = 200;

/// Buffer size used by `read_all`, smaller than typical files to force several calls.
const READ_CHUNK: usize = 4096;

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Process owner table: creator, system and one stranger.
#[derive(Debug, Default)]
pub struct OwnerTable;

impl IdentityResolver for OwnerTable {
    fn process_owner(&self, process_id: u32) -> Option<String> {
        match process_id {
            CREATOR_PID => Some("HOST\\owner".to_string()),
            SYSTEM_PID => Some(SYSTEM_IDENTITY.to_string()),
            STRANGER_PID => Some("HOST\\stranger".to_string()),
            _ => None,
        }
    }
}

/// Drive over an in-memory store with automatic cleanup.
pub struct TestDrive {
    pub drive: VirtualDrive,
    pub store: Arc<MemoryStore>,
    runtime: Runtime,
    temp: TempDir,
}

impl TestDrive {
    /// Writable drive with local (short) timeouts.
    pub fn new() -> Self {
        Self::with_config(|c| c)
    }

    pub fn read_only() -> Self {
        Self::with_config(|c| c.read_only(true))
    }

    /// Drive with `configure` applied on top of [`MountConfig::local`].
    pub fn with_config(configure: impl FnOnce(MountConfig) -> MountConfig) -> Self {
        init_tracing();
        let temp = TempDir::new().expect("Failed to create temp dir");
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to build runtime");

        let store = Arc::new(MemoryStore::new(temp.path().join("uploads")));
        let config = configure(MountConfig::local().cache_dir(temp.path().join("cache")));
        let drive = VirtualDrive::new(
            config,
            store.clone(),
            store.clone(),
            Arc::new(OwnerTable),
            CREATOR_PID,
            runtime.handle().clone(),
        )
        .expect("Failed to create drive");

        Self {
            drive,
            store,
            runtime,
            temp,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn temp_path(&self) -> &std::path::Path {
        self.temp.path()
    }

    /// Block until the background download of `id` has finished.
    pub fn wait_for_download(&self, id: &str) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let status = self.drive.content_cache().progress(id).map(|p| p.status());
            if status == Some(DownloadStatus::Complete) {
                return;
            }
            assert!(Instant::now() < deadline, "download of {id} did not finish: {status:?}");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Context for a call from the creator.
    pub fn info(&self) -> DriveFileInfo {
        DriveFileInfo::new(CREATOR_PID)
    }

    pub fn open(&self, path: &str, access: FileAccess, mode: FileMode) -> DriveReply<DriveFileInfo> {
        let mut info = self.info();
        self.drive.create_file(
            path,
            access,
            FileShare::READ,
            mode,
            FileOptions::default(),
            &mut info,
        )?;
        Ok(info)
    }

    pub fn open_read(&self, path: &str) -> DriveReply<DriveFileInfo> {
        self.open(path, FileAccess::GENERIC_READ, FileMode::Open)
    }

    pub fn open_dir(&self, path: &str, mode: FileMode) -> DriveReply<DriveFileInfo> {
        let mut info = self.info().directory();
        self.drive.create_file(
            path,
            FileAccess::READ_ATTRIBUTES | FileAccess::SYNCHRONIZE,
            FileShare::READ,
            mode,
            FileOptions::default(),
            &mut info,
        )?;
        Ok(info)
    }

    /// Cleanup then close, as the driver does when the last handle goes away.
    pub fn close(&self, path: &str, info: &mut DriveFileInfo) -> DriveReply<()> {
        self.drive.cleanup(path, info)?;
        self.drive.close_file(path, info)
    }

    /// Reads an already opened handle until end of file.
    pub fn read_handle(&self, path: &str, info: &DriveFileInfo) -> DriveReply<Vec<u8>> {
        let mut content = Vec::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = self
                .drive
                .read_file(path, &mut buf, content.len() as u64, info)?;
            if n == 0 {
                return Ok(content);
            }
            content.extend_from_slice(&buf[..n]);
        }
    }

    /// Open, read to end, close.
    pub fn read_all(&self, path: &str) -> DriveReply<Vec<u8>> {
        let mut info = self.open_read(path)?;
        let content = self.read_handle(path, &info);
        self.close(path, &mut info)?;
        content
    }

    /// Create (or overwrite) `path` with `content` through the callbacks.
    pub fn write_all(&self, path: &str, mode: FileMode, content: &[u8]) -> DriveReply<()> {
        let mut info = self.open(path, FileAccess::GENERIC_WRITE, mode)?;
        let written = self.drive.write_file(path, content, 0, &info)?;
        assert_eq!(written, content.len(), "short write to {path}");
        self.close(path, &mut info)
    }
}
