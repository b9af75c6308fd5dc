//! Integration tests for timecopy
//!
//! Builds small backup databases the way a hard-link based backup tool
//! does (each snapshot starts as a hard-link farm of its predecessor, then
//! changed entries are replaced) and checks the copied database.

use ::timecopy::database::{DATABASE_DIR, LATEST_MARKER};
use ::timecopy::*;
use filetime::FileTime;
use std::fs;
use std::os::unix::fs::{symlink, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test harness producing a source database and an empty target volume
pub struct DatabaseHarness {
    pub temp_dir: TempDir,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl DatabaseHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let destination = temp_dir.path().join("destination");
        fs::create_dir_all(source.join(DATABASE_DIR)).unwrap();
        fs::create_dir_all(&destination).unwrap();
        Self {
            temp_dir,
            source,
            destination,
        }
    }

    /// Source path of a snapshot
    pub fn snapshot(&self, host: &str, name: &str) -> PathBuf {
        self.source.join(DATABASE_DIR).join(host).join(name)
    }

    /// Destination path of a snapshot or host entry
    pub fn copied(&self, host: &str, relative: &str) -> PathBuf {
        self.destination.join(DATABASE_DIR).join(host).join(relative)
    }

    /// Create the first snapshot of `host` from `(path, content)` pairs
    pub fn first_snapshot(&self, host: &str, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let root = self.snapshot(host, name);
        fs::create_dir_all(&root).unwrap();
        for (path, content) in files {
            let file = root.join(path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, content).unwrap();
        }
        root
    }

    /// Create a snapshot that shares every file with `previous`
    ///
    /// Directories are recreated, files and symlinks hard linked, as the
    /// backup producer does for an unchanged tree.
    pub fn linked_snapshot(&self, host: &str, previous: &str, name: &str) -> PathBuf {
        let from = self.snapshot(host, previous);
        let to = self.snapshot(host, name);
        link_farm(&from, &to).unwrap();
        to
    }

    pub fn run(&self) -> DatabaseReport {
        self.run_with(TimecopyBuilder::new().skip_ownership(true))
    }

    pub fn run_with(&self, builder: TimecopyBuilder) -> DatabaseReport {
        builder
            .build()
            .copy_database(&self.source, &self.destination)
            .unwrap()
    }
}

impl Default for DatabaseHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn link_farm(from: &Path, to: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(to)?;
    for item in fs::read_dir(from)? {
        let item = item?;
        let target = to.join(item.file_name());
        if item.file_type()?.is_dir() {
            link_farm(&item.path(), &target)?;
        } else {
            fs::hard_link(item.path(), target)?;
        }
    }
    Ok(())
}

/// Replace `path` with a fresh file, breaking its hard link
pub fn rewrite(path: &Path, content: &str) {
    fs::remove_file(path).unwrap();
    fs::write(path, content).unwrap();
}

pub fn ino(path: &Path) -> u64 {
    fs::symlink_metadata(path).unwrap().ino()
}

#[test]
fn test_three_snapshot_chain() {
    let harness = DatabaseHarness::new();
    harness.first_snapshot(
        "gojira",
        "2021-01-01",
        &[("docs/a.txt", "alpha"), ("docs/b.txt", "beta"), ("c.txt", "gamma")],
    );
    let second = harness.linked_snapshot("gojira", "2021-01-01", "2021-01-02");
    rewrite(&second.join("docs/b.txt"), "beta v2");
    let third = harness.linked_snapshot("gojira", "2021-01-02", "2021-01-03");
    rewrite(&third.join("c.txt"), "gamma v2");

    let report = harness.run();

    let at = |relative: &str| harness.copied("gojira", relative);
    // a.txt never changed: one inode across the whole chain
    assert_eq!(ino(&at("2021-01-01/docs/a.txt")), ino(&at("2021-01-03/docs/a.txt")));
    // b.txt changed in the second snapshot and is shared from then on
    assert_ne!(ino(&at("2021-01-01/docs/b.txt")), ino(&at("2021-01-02/docs/b.txt")));
    assert_eq!(ino(&at("2021-01-02/docs/b.txt")), ino(&at("2021-01-03/docs/b.txt")));
    assert_eq!(fs::read_to_string(at("2021-01-03/docs/b.txt")).unwrap(), "beta v2");
    assert_eq!(fs::read_to_string(at("2021-01-03/c.txt")).unwrap(), "gamma v2");
    assert_eq!(fs::read_link(at(LATEST_MARKER)).unwrap(), Path::new("2021-01-03"));

    let chain = &report.chains[0];
    let modes: Vec<SnapshotMode> = chain.snapshots.iter().map(|s| s.mode).collect();
    assert_eq!(
        modes,
        vec![SnapshotMode::Full, SnapshotMode::Incremental, SnapshotMode::Incremental]
    );
    assert_eq!(chain.snapshots[2].report.files_copied, 1);
    assert_eq!(chain.snapshots[2].report.bytes_copied, "gamma v2".len() as u64);
}

#[test]
fn test_multiple_hosts_are_independent() {
    let harness = DatabaseHarness::new();
    harness.first_snapshot("alpha", "2021-01-01", &[("shared.txt", "alpha")]);
    harness.first_snapshot("beta", "2021-03-01", &[("shared.txt", "beta")]);
    harness.linked_snapshot("beta", "2021-03-01", "2021-03-02");

    let report = harness.run();

    assert_eq!(report.chains.len(), 2);
    assert_eq!(report.chains[0].name, "alpha");
    assert_eq!(report.chains[0].latest.as_deref(), Some("2021-01-01"));
    assert_eq!(report.chains[1].latest.as_deref(), Some("2021-03-02"));
    assert_eq!(
        fs::read_to_string(harness.copied("beta", "2021-03-02/shared.txt")).unwrap(),
        "beta"
    );
}

#[test]
fn test_metadata_replicated() {
    let harness = DatabaseHarness::new();
    let root = harness.first_snapshot("host", "2021-01-01", &[("script.sh", "#!/bin/sh")]);
    let script = root.join("script.sh");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).unwrap();
    let stamp = FileTime::from_unix_time(1_600_000_000, 0);
    filetime::set_file_times(&script, stamp, stamp).unwrap();
    fs::create_dir(root.join("dir")).unwrap();
    fs::write(root.join("dir/inner"), "x").unwrap();
    filetime::set_file_times(root.join("dir"), stamp, stamp).unwrap();

    harness.run();

    let copied = harness.copied("host", "2021-01-01/script.sh");
    let metadata = fs::metadata(&copied).unwrap();
    assert_eq!(metadata.permissions().mode() & 0o7777, 0o750);
    assert_eq!(FileTime::from_last_modification_time(&metadata), stamp);
    let dir = fs::metadata(harness.copied("host", "2021-01-01/dir")).unwrap();
    assert_eq!(FileTime::from_last_modification_time(&dir), stamp);
}

#[test]
fn test_symlinks_recreated_verbatim() {
    let harness = DatabaseHarness::new();
    let root = harness.first_snapshot("host", "2021-01-01", &[("target.txt", "t")]);
    symlink("target.txt", root.join("relative")).unwrap();
    symlink("/does/not/exist", root.join("dangling")).unwrap();

    let report = harness.run();

    assert_eq!(
        fs::read_link(harness.copied("host", "2021-01-01/relative")).unwrap(),
        Path::new("target.txt")
    );
    assert_eq!(
        fs::read_link(harness.copied("host", "2021-01-01/dangling")).unwrap(),
        Path::new("/does/not/exist")
    );
    assert_eq!(report.totals().symlinks_created, 2);
}

#[test]
fn test_bookkeeping_files_copied_once() {
    let harness = DatabaseHarness::new();
    harness.first_snapshot("host", "2021-01-01", &[("f", "f")]);
    let database = harness.source.join(DATABASE_DIR);
    fs::write(database.join(".00:1b:63:a1:c2:d3"), "mac").unwrap();
    fs::write(database.join(".DS_Store"), "junk").unwrap();

    let report = harness.run();
    assert_eq!(report.bookkeeping_files, 1);
    let copied = harness.destination.join(DATABASE_DIR);
    assert_eq!(fs::read_to_string(copied.join(".00:1b:63:a1:c2:d3")).unwrap(), "mac");
    assert!(!copied.join(".DS_Store").exists());

    let report = harness.run();
    assert_eq!(report.bookkeeping_files, 0);
}

#[test]
fn test_resume_after_partial_chain() {
    let harness = DatabaseHarness::new();
    harness.first_snapshot("host", "2021-01-01", &[("a", "a"), ("b", "b")]);
    harness.run();

    let second = harness.linked_snapshot("host", "2021-01-01", "2021-01-02");
    rewrite(&second.join("b"), "b2");
    let report = harness.run();

    let chain = &report.chains[0];
    assert_eq!(chain.snapshots[0].mode, SnapshotMode::Skipped);
    assert_eq!(chain.snapshots[1].mode, SnapshotMode::Incremental);
    assert_eq!(
        ino(&harness.copied("host", "2021-01-01/a")),
        ino(&harness.copied("host", "2021-01-02/a"))
    );
    assert_eq!(
        fs::read_link(harness.copied("host", LATEST_MARKER)).unwrap(),
        Path::new("2021-01-02")
    );
}
