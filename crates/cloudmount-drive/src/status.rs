//! Status vocabulary returned to the filesystem driver.

use std::fmt;

/// Outcome of a driver callback.
///
/// Every callback resolves to exactly one of these. [`DriveStatus::Success`]
/// is never carried in the `Err` arm of a [`DriveReply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveStatus {
    Success,
    AccessDenied,
    PathNotFound,
    FileNotFound,
    AlreadyExists,
    NotImplemented,
    Timeout,
    GenericError,
}

/// Result of a driver callback: the out value on success, the status otherwise.
pub type DriveReply<T> = Result<T, DriveStatus>;

impl DriveStatus {
    /// Collapses a reply into its status.
    pub fn of<T>(reply: &DriveReply<T>) -> Self {
        match reply {
            Ok(_) => DriveStatus::Success,
            Err(status) => *status,
        }
    }

    pub fn is_success(self) -> bool {
        self == DriveStatus::Success
    }

    /// Converts this status to a libc error code (0 for success).
    pub fn to_errno(self) -> i32 {
        match self {
            DriveStatus::Success => 0,
            DriveStatus::AccessDenied => libc::EACCES,
            DriveStatus::PathNotFound | DriveStatus::FileNotFound => libc::ENOENT,
            DriveStatus::AlreadyExists => libc::EEXIST,
            DriveStatus::NotImplemented => libc::ENOSYS,
            DriveStatus::Timeout => libc::ETIMEDOUT,
            DriveStatus::GenericError => libc::EIO,
        }
    }
}

impl fmt::Display for DriveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriveStatus::Success => "success",
            DriveStatus::AccessDenied => "access denied",
            DriveStatus::PathNotFound => "path not found",
            DriveStatus::FileNotFound => "file not found",
            DriveStatus::AlreadyExists => "already exists",
            DriveStatus::NotImplemented => "not implemented",
            DriveStatus::Timeout => "timeout",
            DriveStatus::GenericError => "error",
        };
        f.write_str(name)
    }
}
