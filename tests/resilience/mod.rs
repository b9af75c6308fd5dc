//! Resilience tests for timecopy
//!
//! Broken destination chains, unreadable entries, dry runs, interrupts and
//! ownership failures. None of these may abort a run.

use crate::integration::{ino, rewrite, DatabaseHarness};
use ::timecopy::database::{DATABASE_DIR, LATEST_MARKER};
use ::timecopy::metadata::OwnershipSetter;
use ::timecopy::*;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

/// Path -> (inode, content or link target) for every entry below `root`
fn tree_state(root: &Path) -> BTreeMap<PathBuf, (u64, Vec<u8>)> {
    let mut state = BTreeMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.unwrap();
        let path = entry.path();
        let content = if entry.file_type().is_file() {
            fs::read(path).unwrap()
        } else if entry.file_type().is_symlink() {
            fs::read_link(path).unwrap().into_os_string().into_encoded_bytes()
        } else {
            Vec::new()
        };
        state.insert(path.to_path_buf(), (ino(path), content));
    }
    state
}

fn two_snapshot_database() -> DatabaseHarness {
    let harness = DatabaseHarness::new();
    harness.first_snapshot("host", "2021-01-01", &[("keep", "keep"), ("dir/change", "v1")]);
    let second = harness.linked_snapshot("host", "2021-01-01", "2021-01-02");
    rewrite(&second.join("dir/change"), "v2");
    harness
}

#[test]
fn test_dry_run_leaves_destination_untouched() {
    let harness = two_snapshot_database();
    let before = tree_state(&harness.destination);

    let report = harness.run_with(
        TimecopyBuilder::new()
            .skip_ownership(true)
            .dry_run(true),
    );

    assert_eq!(tree_state(&harness.destination), before);
    let totals = report.totals();
    // keep and dir/change, then the rewritten dir/change
    assert_eq!(totals.files_copied, 3);
    assert_eq!(totals.hard_links, 1);
    assert_eq!(totals.consistency_errors, 0);
}

#[test]
fn test_dry_run_over_existing_copy_changes_nothing() {
    let harness = two_snapshot_database();
    harness.run();
    let third = harness.linked_snapshot("host", "2021-01-02", "2021-01-03");
    rewrite(&third.join("keep"), "changed");
    let before = tree_state(&harness.destination);

    harness.run_with(
        TimecopyBuilder::new()
            .skip_ownership(true)
            .dry_run(true),
    );

    assert_eq!(tree_state(&harness.destination), before);
    assert_eq!(
        fs::read_link(harness.copied("host", LATEST_MARKER)).unwrap(),
        Path::new("2021-01-02")
    );
}

#[test]
fn test_missing_link_source_reported_as_consistency_error() {
    let harness = two_snapshot_database();
    harness.run();

    // Break the destination chain, then add a snapshot that links to it
    fs::remove_file(harness.copied("host", "2021-01-02/keep")).unwrap();
    harness.linked_snapshot("host", "2021-01-02", "2021-01-03");

    let report = harness.run();

    let third = &report.chains[0].snapshots[2];
    assert_eq!(third.mode, SnapshotMode::Incremental);
    assert_eq!(third.report.consistency_errors, 1);
    assert_eq!(third.report.failed, 0);
    assert!(!harness.copied("host", "2021-01-03/keep").exists());
    // The rest of the snapshot is still linked
    assert_eq!(
        ino(&harness.copied("host", "2021-01-02/dir/change")),
        ino(&harness.copied("host", "2021-01-03/dir/change"))
    );
}

#[test]
fn test_unreadable_file_is_skipped() {
    let harness = DatabaseHarness::new();
    let root = harness.first_snapshot("host", "2021-01-01", &[("secret", "s"), ("open", "o")]);
    let secret = root.join("secret");
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read(&secret).is_ok() {
        eprintln!("running with privileges that ignore permissions, skipping test");
        return;
    }

    let report = harness.run();
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o600)).unwrap();

    assert_eq!(report.totals().failed, 1);
    assert_eq!(
        fs::read_to_string(harness.copied("host", "2021-01-01/open")).unwrap(),
        "o"
    );
    assert_eq!(
        fs::read_link(harness.copied("host", LATEST_MARKER)).unwrap(),
        Path::new("2021-01-01")
    );
}

#[test]
fn test_unreadable_bookkeeping_file_counted() {
    let harness = DatabaseHarness::new();
    harness.first_snapshot("host", "2021-01-01", &[("f", "f")]);
    let bookkeeping = harness.source.join(DATABASE_DIR).join(".0016cb8d1b2c");
    fs::write(&bookkeeping, "mac").unwrap();
    fs::set_permissions(&bookkeeping, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read(&bookkeeping).is_ok() {
        eprintln!("running with privileges that ignore permissions, skipping test");
        return;
    }

    let report = harness.run();
    fs::set_permissions(&bookkeeping, fs::Permissions::from_mode(0o600)).unwrap();

    assert_eq!(report.bookkeeping_files, 0);
    assert_eq!(report.root.failed, 1);
    assert!(report.totals().has_failures());
    assert_eq!(report.chains[0].totals().failed, 0);
}

#[test]
fn test_interrupted_run_leaves_latest_and_resumes() {
    let harness = two_snapshot_database();
    let flag = InterruptFlag::new();
    flag.raise();

    let report = harness.run_with(
        TimecopyBuilder::new()
            .skip_ownership(true)
            .interrupt(flag),
    );
    assert!(report.interrupted);
    assert_eq!(report.bookkeeping_files, 0);
    assert!(!harness.copied("host", LATEST_MARKER).exists());

    let report = harness.run();
    assert!(!report.interrupted);
    assert_eq!(
        fs::read_link(harness.copied("host", LATEST_MARKER)).unwrap(),
        Path::new("2021-01-02")
    );
}

/// Denies every ownership change, counting the attempts
struct DenyingOwnership(Arc<AtomicUsize>);

impl OwnershipSetter for DenyingOwnership {
    fn set_owner(&self, _path: &Path, _uid: u32, _gid: u32) -> io::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::from(io::ErrorKind::PermissionDenied))
    }
}

#[test]
fn test_denied_ownership_is_best_effort() {
    let harness = DatabaseHarness::new();
    harness.first_snapshot("host", "2021-01-01", &[("file", "content")]);
    let attempts = Arc::new(AtomicUsize::new(0));

    let report = harness.run_with(
        TimecopyBuilder::new()
            .ownership_retry_delay(Duration::ZERO)
            .ownership_setter(Box::new(DenyingOwnership(Arc::clone(&attempts)))),
    );

    assert_eq!(
        fs::read_to_string(harness.copied("host", "2021-01-01/file")).unwrap(),
        "content"
    );
    assert!(!report.totals().has_failures());
    assert_eq!(report.totals().metadata_warnings, 0);
    // database root, host dir, snapshot root and the file: one retry each
    assert_eq!(attempts.load(Ordering::SeqCst), 8);
}

#[test]
fn test_source_without_database() {
    let harness = DatabaseHarness::new();
    fs::remove_dir(harness.source.join(DATABASE_DIR)).unwrap();

    let err = TimecopyBuilder::new()
        .build()
        .copy_database(&harness.source, &harness.destination)
        .unwrap_err();
    assert!(matches!(err, TimecopyError::NotADatabase(_)));
    assert!(!harness.destination.join(DATABASE_DIR).exists());
}
