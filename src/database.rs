//! Backup database layout
//!
//! A backup volume keeps its database in a `Backups.backupdb` directory.
//! Each subdirectory is one backed-up host, and each host directory holds
//! one snapshot per backup, named so that sorting by name sorts by date:
//!
//! ```text
//! /Volumes/Backup/
//! └── Backups.backupdb/
//!     ├── .0016cb8d1b2c          bookkeeping file (hardware address)
//!     └── gojira/
//!         ├── 2021-01-01-120000/
//!         ├── 2021-01-02-120000/
//!         ├── 2021-01-03-120000.inProgress/
//!         └── Latest -> 2021-01-02-120000
//! ```

use crate::error::{Result, TimecopyError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the database directory at the root of a backup volume
pub const DATABASE_DIR: &str = "Backups.backupdb";

/// Name of the marker pointing at the newest snapshot of a host
pub const LATEST_MARKER: &str = "Latest";

/// Suffix of snapshots the backup producer has not finished
pub const IN_PROGRESS_SUFFIX: &str = ".inProgress";

/// A backup database on a mounted volume
#[derive(Debug, Clone)]
pub struct BackupDatabase {
    volume: PathBuf,
    root: PathBuf,
}

impl BackupDatabase {
    /// Open the database on `volume`
    ///
    /// Fails with [`TimecopyError::NotADatabase`] if `volume` has no
    /// `Backups.backupdb` directory.
    pub fn open(volume: &Path) -> Result<Self> {
        let root = volume.join(DATABASE_DIR);
        if !root.is_dir() {
            return Err(TimecopyError::NotADatabase(volume.to_path_buf()));
        }
        Ok(Self {
            volume: volume.to_path_buf(),
            root,
        })
    }

    /// Database location on `volume`, whether or not it exists yet
    pub fn root_on(volume: &Path) -> PathBuf {
        volume.join(DATABASE_DIR)
    }

    /// Volume the database lives on
    pub fn volume(&self) -> &Path {
        &self.volume
    }

    /// The `Backups.backupdb` directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one host
    pub fn host_dir(&self, host: &str) -> PathBuf {
        self.root.join(host)
    }

    /// Backed-up hosts, sorted by name
    pub fn hosts(&self) -> Result<Vec<String>> {
        let mut hosts = Vec::new();
        for item in fs::read_dir(&self.root)? {
            let item = item?;
            if !item.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = item.file_name().to_str() {
                hosts.push(name.to_string());
            } else {
                debug!("Ignoring host directory with non UTF-8 name {:?}", item.path());
            }
        }
        hosts.sort();
        Ok(hosts)
    }

    /// Completed snapshots of `host`, oldest first
    pub fn snapshots(&self, host: &str) -> Result<Vec<String>> {
        let mut snapshots = Vec::new();
        for item in fs::read_dir(self.host_dir(host))? {
            let item = item?;
            let Some(name) = item.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_snapshot_name(&name) || !item.file_type()?.is_dir() {
                continue;
            }
            snapshots.push(name);
        }
        snapshots.sort();
        Ok(snapshots)
    }

    /// Bookkeeping files at the database root
    pub fn bookkeeping_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for item in fs::read_dir(&self.root)? {
            let item = item?;
            let is_match = item
                .file_name()
                .to_str()
                .is_some_and(is_bookkeeping_name);
            if is_match && item.file_type()?.is_file() {
                files.push(item.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Whether `name` is a finished snapshot rather than a marker or partial
pub fn is_snapshot_name(name: &str) -> bool {
    name != LATEST_MARKER && !name.ends_with(IN_PROGRESS_SUFFIX) && !name.starts_with('.')
}

/// Whether `name` is a hardware-address bookkeeping file
///
/// Matches a dot followed by twelve hex digits, either contiguous or split
/// into six pairs by `:` or `-` (`.0016cb8d1b2c`, `.00:16:cb:8d:1b:2c`).
pub fn is_bookkeeping_name(name: &str) -> bool {
    let Some(address) = name.strip_prefix('.') else {
        return false;
    };
    let is_hex_pair = |pair: &str| pair.len() == 2 && pair.chars().all(|c| c.is_ascii_hexdigit());

    if address.len() == 12 {
        return address.chars().all(|c| c.is_ascii_hexdigit());
    }
    [':', '-'].iter().any(|separator| {
        let pairs: Vec<&str> = address.split(*separator).collect();
        pairs.len() == 6 && pairs.iter().all(|pair| is_hex_pair(pair))
    })
}
