//! Filesystem callback adapter.
//!
//! [`VirtualDrive`] receives driver callbacks on arbitrary worker threads and
//! serves them from the [`TreeCache`], the [`ContentCache`] and the remote
//! [`StorageProvider`].
//!
//! # Callback contract
//!
//! | Callback | Identity | Read-only | Notes |
//! |----------|----------|-----------|-------|
//! | create_file | checked | mutating modes and write access denied | attaches a handle |
//! | read_file / flush_file_buffers | | | served by the handle's stream |
//! | write_file / set_end_of_file / set_allocation_size | | denied | |
//! | set_file_attributes / set_file_time / set_file_security | | denied | otherwise unsupported |
//! | delete_file / delete_directory / move_file | checked | denied | provider, then cache |
//! | find_files / get_file_information / find_streams | checked | | cache first |
//! | cleanup / close_file | | | delete-on-close, handle release |
//!
//! Every callback runs inside [`std::panic::catch_unwind`]: a panic or error
//! is logged and reported as a [`DriveStatus`], never unwound into the driver.
//! Identity and read-only checks run before any cache or provider access.

use crate::async_bridge::{self, BridgeStats};
use crate::config::MountConfig;
use crate::error::{DriveError, DriveResult};
use crate::handles::{DriveHandleTable, HandleKind, HandleState, OpenHandle};
use crate::identity::{AccessPolicy, IdentityResolver};
use crate::info::{
    DiskFreeSpace, DriveFileInfo, FileInformation, VolumeFeatures, VolumeInformation,
};
use crate::status::{DriveReply, DriveStatus};
use cloudmount_cache::{
    ByteArrayReader, ContentCache, DownloadClient, FileAccess, FileMode, FileOptions, FileShare,
    IoAccess, Node, StorageProvider, StreamError, TreeCache, path,
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};

/// Notification invoked when the driver mounts or unmounts the drive.
pub type MountHook = Box<dyn Fn() + Send + Sync>;

/// A remote store exposed through filesystem driver callbacks.
pub struct VirtualDrive {
    config: MountConfig,
    provider: Arc<dyn StorageProvider>,
    tree: TreeCache,
    content: ContentCache,
    handles: DriveHandleTable,
    access: AccessPolicy,
    runtime: Handle,
    stats: Arc<BridgeStats>,
    on_mounted: Option<MountHook>,
    on_unmounted: Option<MountHook>,
}

impl VirtualDrive {
    /// Create a drive for one mount session.
    ///
    /// The identity of `creator_pid` is captured now; later callers must
    /// match it or be the system account. Downloads and async provider calls
    /// run on `runtime`, which must outlive the drive.
    pub fn new(
        config: MountConfig,
        provider: Arc<dyn StorageProvider>,
        client: Arc<dyn DownloadClient>,
        identity: Arc<dyn IdentityResolver>,
        creator_pid: u32,
        runtime: Handle,
    ) -> DriveResult<Self> {
        let content = ContentCache::new(config.cache_dir.clone(), client, runtime.clone())?
            .retry_delay(config.download_retry_delay);
        let access = AccessPolicy::capture(identity, creator_pid);
        info!(
            cache_dir = %config.cache_dir.display(),
            read_only = config.read_only,
            creator = access.creator().unwrap_or("<unknown>"),
            "Virtual drive created"
        );

        Ok(Self {
            tree: TreeCache::new(config.tree_cache_config()),
            content,
            handles: DriveHandleTable::new(),
            access,
            runtime,
            stats: BridgeStats::new(),
            provider,
            config,
            on_mounted: None,
            on_unmounted: None,
        })
    }

    #[must_use]
    pub fn on_mounted(mut self, hook: MountHook) -> Self {
        self.on_mounted = Some(hook);
        self
    }

    #[must_use]
    pub fn on_unmounted(mut self, hook: MountHook) -> Self {
        self.on_unmounted = Some(hook);
        self
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn tree_cache(&self) -> &TreeCache {
        &self.tree
    }

    pub fn content_cache(&self) -> &ContentCache {
        &self.content
    }

    pub fn bridge_stats(&self) -> &BridgeStats {
        &self.stats
    }

    /// Number of handles attached and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    // ========================================================================
    // Open / close
    // ========================================================================

    /// Opens or creates a file, directory or alternate stream and attaches a
    /// handle to `info.context`.
    pub fn create_file(
        &self,
        file_name: &str,
        access: FileAccess,
        share: FileShare,
        mode: FileMode,
        options: FileOptions,
        info: &mut DriveFileInfo,
    ) -> DriveReply<()> {
        let full = path::normalize(file_name);
        trace!(path = %full, ?access, ?mode, directory = info.is_directory, "create_file");

        self.guard("create_file", &full, || {
            self.check_caller(info.process_id)?;
            let (file_path, stream) = path::split_stream(&full);

            let handle = if info.is_directory {
                self.open_directory(file_path, mode)?
            } else {
                self.open_file(file_path, stream, access, share, mode, options)?
            };
            info.is_directory |= handle.is_directory();
            self.attach(handle, info);
            Ok(())
        })
    }

    /// Driver cleanup: releases the stream and performs delete-on-close.
    pub fn cleanup(&self, file_name: &str, info: &DriveFileInfo) -> DriveReply<()> {
        let full = path::normalize(file_name);
        trace!(path = %full, delete_on_close = info.delete_on_close, "cleanup");

        self.guard("cleanup", &full, || {
            if let Some(handle) = info.context.and_then(|id| self.handles.get_cloned(&id)) {
                handle.transition(HandleState::Closing);
                if let Err(e) = handle.release() {
                    warn!(path = %full, error = %e, "Failed to close stream");
                }
                if handle.is_writable() {
                    self.refresh(handle.path())?;
                }
            }

            let (file_path, stream) = path::split_stream(&full);
            if info.delete_on_close && stream.is_none() {
                self.delete_on_close(file_path, info.is_directory)?;
            }
            Ok(())
        })
    }

    /// Driver close: detaches and releases the handle.
    pub fn close_file(&self, file_name: &str, info: &mut DriveFileInfo) -> DriveReply<()> {
        let full = path::normalize(file_name);
        trace!(path = %full, "close_file");

        self.guard("close_file", &full, || {
            let Some(id) = info.context.take() else {
                return Ok(());
            };
            if let Some(handle) = self.handles.remove(&id) {
                handle.transition(HandleState::Closed);
                handle.release()?;
            }
            Ok(())
        })
    }

    // ========================================================================
    // Content
    // ========================================================================

    pub fn read_file(
        &self,
        file_name: &str,
        buf: &mut [u8],
        offset: u64,
        info: &DriveFileInfo,
    ) -> DriveReply<usize> {
        let full = path::normalize(file_name);
        self.guard("read_file", &full, || {
            let handle = self.handle(info)?;
            let stream = handle
                .stream()
                .ok_or_else(|| DriveError::AccessDenied(format!("{full} has no content")))?;
            match stream.read(offset, buf, self.config.read_timeout) {
                Err(StreamError::NotSupported) => Err(DriveError::AccessDenied(format!(
                    "{full} does not support reads"
                ))),
                other => Ok(other?),
            }
        })
    }

    pub fn write_file(
        &self,
        file_name: &str,
        data: &[u8],
        offset: u64,
        info: &DriveFileInfo,
    ) -> DriveReply<usize> {
        let full = path::normalize(file_name);
        self.guard("write_file", &full, || {
            self.deny_if_read_only()?;
            let handle = self.handle(info)?;
            let stream = handle
                .stream()
                .ok_or_else(|| DriveError::AccessDenied(format!("{full} has no content")))?;
            match stream.write(offset, data) {
                Err(StreamError::NotSupported) => Err(DriveError::AccessDenied(format!(
                    "{full} does not support writes"
                ))),
                other => Ok(other?),
            }
        })
    }

    pub fn flush_file_buffers(&self, file_name: &str, info: &DriveFileInfo) -> DriveReply<()> {
        let full = path::normalize(file_name);
        self.guard("flush_file_buffers", &full, || {
            let handle = info.context.and_then(|id| self.handles.get_cloned(&id));
            if let Some(stream) = handle.as_ref().and_then(|h| h.stream()) {
                stream.flush()?;
            }
            Ok(())
        })
    }

    pub fn set_end_of_file(
        &self,
        file_name: &str,
        length: u64,
        info: &DriveFileInfo,
    ) -> DriveReply<()> {
        let full = path::normalize(file_name);
        self.guard("set_end_of_file", &full, || {
            self.deny_if_read_only()?;
            let handle = self.handle(info)?;
            let stream = handle.stream().ok_or(DriveError::NotSupported)?;
            stream.set_length(length)?;
            trace!(path = %full, length, "Set end of file");
            Ok(())
        })
    }

    /// Accepted without effect; staging files grow on demand.
    pub fn set_allocation_size(
        &self,
        file_name: &str,
        length: u64,
        _info: &DriveFileInfo,
    ) -> DriveReply<()> {
        let full = path::normalize(file_name);
        trace!(path = %full, length, "set_allocation_size");
        self.guard("set_allocation_size", &full, || self.deny_if_read_only())
    }

    /// Attributes are derived from the remote store and cannot be set.
    pub fn set_file_attributes(&self, file_name: &str, _info: &DriveFileInfo) -> DriveReply<()> {
        self.unsupported_mutation("set_file_attributes", file_name, DriveStatus::GenericError)
    }

    /// Timestamps are owned by the remote store and cannot be set.
    pub fn set_file_time(&self, file_name: &str, _info: &DriveFileInfo) -> DriveReply<()> {
        self.unsupported_mutation("set_file_time", file_name, DriveStatus::GenericError)
    }

    pub fn set_file_security(&self, file_name: &str, _info: &DriveFileInfo) -> DriveReply<()> {
        self.unsupported_mutation("set_file_security", file_name, DriveStatus::NotImplemented)
    }

    pub fn lock_file(
        &self,
        file_name: &str,
        offset: u64,
        length: u64,
        _info: &DriveFileInfo,
    ) -> DriveReply<()> {
        trace!(path = file_name, offset, length, "lock_file");
        Ok(())
    }

    pub fn unlock_file(
        &self,
        file_name: &str,
        offset: u64,
        length: u64,
        _info: &DriveFileInfo,
    ) -> DriveReply<()> {
        trace!(path = file_name, offset, length, "unlock_file");
        Ok(())
    }

    // ========================================================================
    // Namespace
    // ========================================================================

    pub fn delete_file(&self, file_name: &str, info: &DriveFileInfo) -> DriveReply<()> {
        let full = path::normalize(file_name);
        trace!(path = %full, "delete_file");
        self.guard("delete_file", &full, || {
            self.check_caller(info.process_id)?;
            self.deny_if_read_only()?;
            if !self.exists(&full)? {
                return Err(DriveError::PathNotFound(full.clone()));
            }
            self.provider.delete_file(&full)?;
            self.tree.delete_file(&full);
            debug!(path = %full, "Deleted file");
            Ok(())
        })
    }

    pub fn delete_directory(&self, file_name: &str, info: &DriveFileInfo) -> DriveReply<()> {
        let full = path::normalize(file_name);
        trace!(path = %full, "delete_directory");
        self.guard("delete_directory", &full, || {
            self.check_caller(info.process_id)?;
            self.deny_if_read_only()?;
            if !self.exists(&full)? {
                return Err(DriveError::PathNotFound(full.clone()));
            }
            self.provider.delete_dir(&full)?;
            self.tree.delete_dir(&full);
            debug!(path = %full, "Deleted directory");
            Ok(())
        })
    }

    pub fn move_file(
        &self,
        old_name: &str,
        new_name: &str,
        replace: bool,
        info: &DriveFileInfo,
    ) -> DriveReply<()> {
        let old_path = path::normalize(old_name);
        let new_path = path::normalize(new_name);
        trace!(old = %old_path, new = %new_path, replace, "move_file");
        self.guard("move_file", &old_path, || {
            self.check_caller(info.process_id)?;
            self.deny_if_read_only()?;
            let node = self.provider.move_file(&old_path, &new_path, replace)?;
            if node.is_directory {
                self.tree.move_dir(&old_path, node);
            } else {
                self.tree.move_file(&old_path, node);
            }
            debug!(old = %old_path, new = %new_path, "Moved");
            Ok(())
        })
    }

    /// Lists a directory, from the listing cache when it is fresh.
    pub fn find_files(
        &self,
        file_name: &str,
        info: &DriveFileInfo,
    ) -> DriveReply<Vec<FileInformation>> {
        let full = path::normalize(file_name);
        trace!(path = %full, "find_files");
        self.guard("find_files", &full, || {
            self.check_caller(info.process_id)?;
            let mut entries: Vec<FileInformation> = self
                .list(&full)?
                .iter()
                .map(|node| FileInformation::from_node(node, self.config.read_only))
                .collect();
            entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
            Ok(entries)
        })
    }

    pub fn get_file_information(
        &self,
        file_name: &str,
        info: &DriveFileInfo,
    ) -> DriveReply<FileInformation> {
        let full = path::normalize(file_name);
        self.guard("get_file_information", &full, || {
            self.check_caller(info.process_id)?;
            let node = self
                .lookup(&full)?
                .ok_or_else(|| DriveError::PathNotFound(full.clone()))?;
            Ok(FileInformation::from_node(&node, self.config.read_only))
        })
    }

    /// Lists the default data stream (files only) and the info stream.
    pub fn find_streams(
        &self,
        file_name: &str,
        info: &DriveFileInfo,
    ) -> DriveReply<Vec<FileInformation>> {
        let full = path::normalize(file_name);
        trace!(path = %full, "find_streams");
        self.guard("find_streams", &full, || {
            self.check_caller(info.process_id)?;
            let node = self
                .lookup(&full)?
                .ok_or_else(|| DriveError::FileNotFound(full.clone()))?;

            let mut streams = Vec::with_capacity(2);
            if !node.is_directory {
                let mut data = FileInformation::from_node(&node, self.config.read_only);
                data.file_name = "::$DATA".to_string();
                streams.push(data);
            }
            streams.push(FileInformation::stream(
                format!(":{}:$DATA", self.config.info_stream_name),
                node.info_blob().len() as u64,
            ));
            Ok(streams)
        })
    }

    // ========================================================================
    // Volume
    // ========================================================================

    pub fn get_disk_free_space(&self, _info: &DriveFileInfo) -> DriveReply<DiskFreeSpace> {
        self.guard("get_disk_free_space", path::ROOT, || {
            let total = self.provider.total_size();
            let free = total.saturating_sub(self.provider.used_space());
            Ok(DiskFreeSpace {
                free_bytes_available: free,
                total_bytes: total,
                total_free_bytes: free,
            })
        })
    }

    pub fn get_volume_information(&self, _info: &DriveFileInfo) -> DriveReply<VolumeInformation> {
        self.guard("get_volume_information", path::ROOT, || {
            let mut features = VolumeFeatures::NAMED_STREAMS
                | VolumeFeatures::SUPPORTS_REMOTE_STORAGE
                | VolumeFeatures::CASE_PRESERVED_NAMES
                | VolumeFeatures::CASE_SENSITIVE_SEARCH
                | VolumeFeatures::UNICODE_ON_DISK
                | VolumeFeatures::SEQUENTIAL_WRITE_ONCE;
            if self.config.read_only {
                features = features | VolumeFeatures::READ_ONLY_VOLUME;
            }
            Ok(VolumeInformation {
                label: self.provider.volume_name(),
                features,
                filesystem_name: self.provider.filesystem_name(),
            })
        })
    }

    pub fn mounted(&self, mount_point: &str) -> DriveReply<()> {
        info!(mount_point, "Drive mounted");
        self.guard("mounted", mount_point, || {
            if let Some(hook) = &self.on_mounted {
                hook();
            }
            Ok(())
        })
    }

    /// Releases every handle still attached, then notifies the unmount hook.
    pub fn unmounted(&self) -> DriveReply<()> {
        self.guard("unmounted", path::ROOT, || {
            let leftover = self.handles.drain();
            if !leftover.is_empty() {
                debug!(count = leftover.len(), "Releasing handles left open at unmount");
            }
            for handle in leftover {
                handle.transition(HandleState::Closed);
                if let Err(e) = handle.release() {
                    warn!(path = handle.path(), error = %e, "Failed to close stream at unmount");
                }
            }
            if let Some(hook) = &self.on_unmounted {
                hook();
            }
            info!("Drive unmounted");
            Ok(())
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn open_directory(&self, dir_path: &str, mode: FileMode) -> DriveResult<OpenHandle> {
        if mode == FileMode::CreateNew {
            self.deny_if_read_only()?;
            if self.exists(dir_path)? {
                return Err(DriveError::AlreadyExists(dir_path.to_string()));
            }
            let node = self.provider.create_dir(dir_path)?;
            self.tree.add(node);
            debug!(path = dir_path, "Created directory");
        } else if mode == FileMode::Open && !self.exists(dir_path)? {
            return Err(DriveError::PathNotFound(dir_path.to_string()));
        }
        Ok(OpenHandle::new(dir_path, HandleKind::Directory))
    }

    fn open_file(
        &self,
        file_path: &str,
        stream: Option<&str>,
        access: FileAccess,
        share: FileShare,
        mode: FileMode,
        options: FileOptions,
    ) -> DriveResult<OpenHandle> {
        if self.config.read_only
            && (access.intersects(FileAccess::DATA_WRITE)
                || matches!(
                    mode,
                    FileMode::CreateNew | FileMode::Create | FileMode::Truncate | FileMode::Append
                ))
        {
            return Err(DriveError::ReadOnly);
        }

        let item = self.lookup(file_path)?;

        if let Some(stream) = stream {
            return self.open_info_stream(file_path, stream, item.as_ref(), mode);
        }

        match (mode, &item) {
            (FileMode::Open | FileMode::Truncate, None) => {
                return Err(DriveError::FileNotFound(file_path.to_string()));
            }
            (FileMode::Open | FileMode::OpenOrCreate, Some(node)) if node.is_directory => {
                return Ok(OpenHandle::new(file_path, HandleKind::Directory));
            }
            (FileMode::CreateNew, Some(_)) => {
                return Err(DriveError::AlreadyExists(file_path.to_string()));
            }
            (FileMode::OpenOrCreate, None) if self.config.read_only => {
                return Err(DriveError::ReadOnly);
            }
            _ => {}
        }

        if access.is_metadata_only() {
            return Ok(OpenHandle::new(file_path, HandleKind::Marker));
        }

        let io = access.io_access();
        if io == IoAccess::Read
            && matches!(mode, FileMode::Open | FileMode::OpenOrCreate)
            && let Some(node) = &item
        {
            let reader = self.content.open_for_read(node)?;
            return Ok(OpenHandle::new(file_path, HandleKind::Stream(reader)));
        }

        let opened = self
            .provider
            .open_file(file_path, mode, io, share, options)?
            .ok_or_else(|| DriveError::AccessDenied(format!("provider refused {file_path}")))?;

        if item.is_none()
            && let Some(node) = self.provider.get_item(file_path)?
        {
            self.tree.add(node);
        }

        let handle = OpenHandle::new(file_path, HandleKind::Stream(opened));
        Ok(if io.can_write() { handle.writable() } else { handle })
    }

    fn open_info_stream(
        &self,
        file_path: &str,
        stream: &str,
        item: Option<&Node>,
        mode: FileMode,
    ) -> DriveResult<OpenHandle> {
        let node = item.ok_or_else(|| DriveError::FileNotFound(file_path.to_string()))?;
        trace!(path = file_path, stream, "Opening alternate stream");
        if mode != FileMode::Open {
            return Err(DriveError::AccessDenied(format!(
                "{file_path}:{stream} can only be opened"
            )));
        }
        if stream != self.config.info_stream_name {
            return Err(DriveError::AccessDenied(format!(
                "unknown stream {file_path}:{stream}"
            )));
        }
        let reader = ByteArrayReader::new(node.info_blob());
        Ok(OpenHandle::new(file_path, HandleKind::Stream(Box::new(reader))))
    }

    fn attach(&self, handle: OpenHandle, info: &mut DriveFileInfo) {
        let handle = Arc::new(handle);
        handle.transition(HandleState::Open);
        info.context = Some(self.handles.insert_auto(handle));
    }

    fn handle(&self, info: &DriveFileInfo) -> DriveResult<Arc<OpenHandle>> {
        let id = info.context.ok_or(DriveError::InvalidHandle(0))?;
        self.handles
            .get_cloned(&id)
            .ok_or(DriveError::InvalidHandle(id))
    }

    fn delete_on_close(&self, file_path: &str, is_directory: bool) -> DriveResult<()> {
        self.deny_if_read_only()?;
        if !self.exists(file_path)? {
            return Ok(());
        }
        if is_directory {
            self.provider.delete_dir(file_path)?;
            self.tree.delete_dir(file_path);
        } else {
            self.provider.delete_file(file_path)?;
            self.tree.delete_file(file_path);
        }
        debug!(path = file_path, "Deleted on close");
        Ok(())
    }

    /// Re-reads a node after its content changed through a handle.
    fn refresh(&self, file_path: &str) -> DriveResult<()> {
        match self.provider.get_item(file_path)? {
            Some(node) if self.tree.get_node(file_path).is_some() => self.tree.update(node),
            Some(node) => self.tree.add(node),
            None => self.tree.delete_file(file_path),
        }
        Ok(())
    }

    fn lookup(&self, item_path: &str) -> DriveResult<Option<Node>> {
        if let Some(node) = self.tree.get_node(item_path) {
            return Ok(Some(node));
        }
        let node = self.provider.get_item(item_path)?;
        if let Some(node) = &node {
            self.tree.add(node.clone());
        }
        Ok(node)
    }

    fn exists(&self, item_path: &str) -> DriveResult<bool> {
        if self.tree.get_node(item_path).is_some() {
            return Ok(true);
        }
        Ok(self.provider.exists(item_path)?)
    }

    fn list(&self, dir_path: &str) -> DriveResult<Vec<Node>> {
        if let Some(children) = self.tree.get_directory_listing(dir_path) {
            let cached: Option<Vec<Node>> =
                children.iter().map(|child| self.tree.get_node(child)).collect();
            if let Some(nodes) = cached {
                trace!(path = dir_path, count = nodes.len(), "Listing served from cache");
                return Ok(nodes);
            }
        }

        let provider = Arc::clone(&self.provider);
        let dir = dir_path.to_string();
        let items = async_bridge::block_on_provider(
            &self.runtime,
            self.config.provider_timeout,
            &self.stats,
            async move { provider.get_directory_items(&dir).await },
        )??;
        debug!(path = dir_path, count = items.len(), "Fetched listing");
        self.tree.add_directory_listing(dir_path, items.clone());
        Ok(items)
    }

    fn check_caller(&self, process_id: u32) -> DriveResult<()> {
        if self.access.allows(process_id) {
            Ok(())
        } else {
            Err(DriveError::AccessDenied(format!("process {process_id}")))
        }
    }

    fn deny_if_read_only(&self) -> DriveResult<()> {
        if self.config.read_only {
            Err(DriveError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn unsupported_mutation(
        &self,
        op: &'static str,
        file_name: &str,
        status: DriveStatus,
    ) -> DriveReply<()> {
        if self.config.read_only {
            warn!(op, path = file_name, "Denied on read-only drive");
            return Err(DriveStatus::AccessDenied);
        }
        trace!(op, path = file_name, "Unsupported");
        Err(status)
    }

    /// Runs a callback body, converting errors and panics into a status.
    fn guard<T>(
        &self,
        op: &'static str,
        item_path: &str,
        body: impl FnOnce() -> DriveResult<T>,
    ) -> DriveReply<T> {
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if e.is_denial() {
                    warn!(op, path = item_path, error = %e, "Denied");
                } else if e.is_lookup_miss() {
                    debug!(op, path = item_path, error = %e, "Lookup miss");
                } else if matches!(e.status(), DriveStatus::Timeout) {
                    warn!(op, path = item_path, error = %e, "Timed out");
                } else {
                    error!(op, path = item_path, error = %e, "Callback failed");
                }
                Err(e.status())
            }
            Err(payload) => {
                error!(op, path = item_path, panic = panic_message(&*payload), "Callback panicked");
                Err(DriveStatus::GenericError)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

impl std::fmt::Debug for VirtualDrive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualDrive")
            .field("config", &self.config)
            .field("access", &self.access)
            .field("open_handles", &self.handles.len())
            .finish_non_exhaustive()
    }
}

impl Drop for VirtualDrive {
    fn drop(&mut self) {
        for handle in self.handles.drain() {
            let _ = handle.release();
        }
    }
}
