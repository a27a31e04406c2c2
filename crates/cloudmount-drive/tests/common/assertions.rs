//! Custom assertions for drive integration tests.

use crate::common::TestDrive;
use cloudmount_drive::{DriveReply, DriveStatus};

/// Assert that a reply carries `expected` (`Success` for any `Ok`).
#[track_caller]
pub fn assert_status<T: std::fmt::Debug>(reply: &DriveReply<T>, expected: DriveStatus) {
    assert_eq!(
        DriveStatus::of(reply),
        expected,
        "Expected {expected}, got {reply:?}"
    );
}

/// Assert that nothing reached the remote store since the last reset.
#[track_caller]
pub fn assert_no_remote_calls(t: &TestDrive) {
    assert_eq!(
        t.store.total_calls(),
        0,
        "Expected no provider calls, got {}",
        t.store.total_calls()
    );
}

/// Assert that a directory lists exactly `expected`, in name order.
#[track_caller]
pub fn assert_dir_entries(t: &TestDrive, path: &str, expected: &[&str]) {
    let entries = t
        .drive
        .find_files(path, &t.info())
        .unwrap_or_else(|s| panic!("Failed to list {path}: {s}"));
    let names: Vec<&str> = entries.iter().map(|e| e.file_name.as_str()).collect();
    assert_eq!(names, expected, "Directory entries mismatch for {path}");
}

/// Assert that `path` reads back as `expected`.
#[track_caller]
pub fn assert_file_content(t: &TestDrive, path: &str, expected: &[u8]) {
    let actual = t
        .read_all(path)
        .unwrap_or_else(|s| panic!("Failed to read {path}: {s}"));
    assert_eq!(
        actual.len(),
        expected.len(),
        "Length mismatch for {path}"
    );
    assert!(actual == expected, "Content mismatch for {path}");
}
