//! Access control tests: caller identity and read-only mounts.
//!
//! Denied callbacks must not reach the remote store or change cache state.

mod common;

use cloudmount_cache::{FileAccess, FileMode, FileOptions, FileShare};
use cloudmount_drive::{DriveFileInfo, DriveStatus};
use common::{CREATOR_PID, STRANGER_PID, SYSTEM_PID, TestDrive, assert_no_remote_calls, assert_status};

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_stranger_is_denied_without_remote_calls() {
    let t = TestDrive::new();
    t.store.add_dir("/docs");
    t.store.add_file("/docs/a.txt", b"secret");
    t.store.reset_calls();

    let stranger = DriveFileInfo::new(STRANGER_PID);
    let mut open_info = stranger.clone();
    let reply = t.drive.create_file(
        "/docs/a.txt",
        FileAccess::GENERIC_READ,
        FileShare::READ,
        FileMode::Open,
        FileOptions::default(),
        &mut open_info,
    );
    assert_status(&reply, DriveStatus::AccessDenied);
    assert_eq!(open_info.context, None);

    assert_status(&t.drive.find_files("/docs", &stranger), DriveStatus::AccessDenied);
    assert_status(
        &t.drive.get_file_information("/docs/a.txt", &stranger),
        DriveStatus::AccessDenied,
    );
    assert_status(&t.drive.find_streams("/docs/a.txt", &stranger), DriveStatus::AccessDenied);
    assert_status(&t.drive.delete_file("/docs/a.txt", &stranger), DriveStatus::AccessDenied);
    assert_status(&t.drive.delete_directory("/docs", &stranger), DriveStatus::AccessDenied);
    assert_status(
        &t.drive.move_file("/docs/a.txt", "/b.txt", false, &stranger),
        DriveStatus::AccessDenied,
    );

    assert_no_remote_calls(&t);
    assert_eq!(t.drive.tree_cache().node_count(), 0);
    assert_eq!(t.drive.open_handles(), 0);
    assert!(t.store.contains("/docs/a.txt"));
}

#[test]
fn test_unknown_process_is_denied() {
    let t = TestDrive::new();
    t.store.add_file("/a.txt", b"x");
    assert_status(
        &t.drive.get_file_information("/a.txt", &DriveFileInfo::new(9999)),
        DriveStatus::AccessDenied,
    );
}

#[test]
fn test_creator_and_system_are_allowed() {
    let t = TestDrive::new();
    t.store.add_file("/a.txt", b"x");

    for pid in [CREATOR_PID, SYSTEM_PID] {
        let info = t
            .drive
            .get_file_information("/a.txt", &DriveFileInfo::new(pid))
            .unwrap_or_else(|s| panic!("pid {pid} denied: {s}"));
        assert_eq!(info.length, 1);
    }
}

// ============================================================================
// Read-only mounts
// ============================================================================

#[test]
fn test_read_only_denies_every_mutation_without_side_effects() {
    let t = TestDrive::read_only();
    t.store.add_dir("/dir");
    t.store.add_file("/dir/a.txt", b"content");
    t.store.reset_calls();
    let info = t.info();

    for mode in [FileMode::CreateNew, FileMode::Create, FileMode::Truncate, FileMode::Append] {
        assert_status(
            &t.open("/dir/new.txt", FileAccess::GENERIC_READ, mode),
            DriveStatus::AccessDenied,
        );
    }
    assert_status(
        &t.open("/dir/a.txt", FileAccess::GENERIC_WRITE, FileMode::Open),
        DriveStatus::AccessDenied,
    );
    assert_status(
        &t.open("/dir/a.txt", FileAccess::DELETE, FileMode::Open),
        DriveStatus::AccessDenied,
    );
    assert_status(&t.open_dir("/newdir", FileMode::CreateNew), DriveStatus::AccessDenied);

    assert_status(&t.drive.write_file("/dir/a.txt", b"x", 0, &info), DriveStatus::AccessDenied);
    assert_status(&t.drive.set_end_of_file("/dir/a.txt", 0, &info), DriveStatus::AccessDenied);
    assert_status(
        &t.drive.set_allocation_size("/dir/a.txt", 0, &info),
        DriveStatus::AccessDenied,
    );
    assert_status(&t.drive.set_file_attributes("/dir/a.txt", &info), DriveStatus::AccessDenied);
    assert_status(&t.drive.set_file_time("/dir/a.txt", &info), DriveStatus::AccessDenied);
    assert_status(&t.drive.set_file_security("/dir/a.txt", &info), DriveStatus::AccessDenied);
    assert_status(&t.drive.delete_file("/dir/a.txt", &info), DriveStatus::AccessDenied);
    assert_status(&t.drive.delete_directory("/dir", &info), DriveStatus::AccessDenied);
    assert_status(
        &t.drive.move_file("/dir/a.txt", "/b.txt", true, &info),
        DriveStatus::AccessDenied,
    );

    assert_no_remote_calls(&t);
    assert_eq!(t.drive.tree_cache().node_count(), 0);
    assert_eq!(t.drive.tree_cache().listing_count(), 0);
    assert_eq!(t.store.content("/dir/a.txt").unwrap(), b"content");
}

#[test]
fn test_read_only_still_serves_reads() {
    let t = TestDrive::read_only();
    t.store.add_dir("/dir");
    t.store.add_file("/dir/a.txt", b"content");

    common::assert_file_content(&t, "/dir/a.txt", b"content");
    common::assert_dir_entries(&t, "/dir", &["a.txt"]);

    let info = t.drive.get_file_information("/dir/a.txt", &t.info()).unwrap();
    assert!(info.attributes.contains(cloudmount_drive::FileAttributes::READ_ONLY));
}

#[test]
fn test_read_only_skips_delete_on_close() {
    let t = TestDrive::read_only();
    t.store.add_file("/a.txt", b"keep");
    let mut info = t
        .open("/a.txt", FileAccess::READ_ATTRIBUTES, FileMode::Open)
        .unwrap();
    info.delete_on_close = true;

    assert_status(&t.drive.cleanup("/a.txt", &info), DriveStatus::AccessDenied);
    t.drive.close_file("/a.txt", &mut info).unwrap();
    assert!(t.store.contains("/a.txt"));
}
