//! Entry classification
//!
//! Determines what a path is without ever following a symbolic link, and
//! captures the handful of attributes the copy strategies need for one visit
//! (identity, ownership, mode and timestamps). Entries are not cached; each
//! visit stats the path afresh.

use crate::error::{Result, TimecopyError};
use crate::types::{EntryIdentity, EntryKind};
use filetime::FileTime;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// A filesystem object observed at one point of a traversal
#[derive(Debug, Clone)]
pub struct Entry {
    /// Absolute path of the entry
    pub path: PathBuf,
    /// Entry type, symlinks are reported as such
    pub kind: EntryKind,
    /// Device and inode pair
    pub identity: EntryIdentity,
    /// Owner id
    pub uid: u32,
    /// Group id
    pub gid: u32,
    /// Full mode including the permission bits
    pub mode: u32,
    /// Last access time
    pub accessed: FileTime,
    /// Last modification time
    pub modified: FileTime,
    /// Size in bytes
    pub size: u64,
}

impl Entry {
    /// Stat `path` without following symlinks
    pub fn stat(path: &Path) -> Result<Entry> {
        let metadata = fs::symlink_metadata(path).map_err(|source| TimecopyError::Classify {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_metadata(path, &metadata))
    }

    /// Stat `path`, mapping a missing entry to `None`
    ///
    /// A parent that is not a directory also means the entry is missing.
    /// Other failures (permission denied on a parent, I/O errors) are still
    /// reported.
    pub fn stat_if_exists(path: &Path) -> Result<Option<Entry>> {
        match fs::symlink_metadata(path) {
            Ok(metadata) => Ok(Some(Self::from_metadata(path, &metadata))),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(None)
            }
            Err(source) => Err(TimecopyError::Classify {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn from_metadata(path: &Path, metadata: &fs::Metadata) -> Entry {
        Entry {
            path: path.to_path_buf(),
            kind: kind_of(&metadata.file_type()),
            identity: EntryIdentity {
                dev: metadata.dev(),
                ino: metadata.ino(),
            },
            uid: metadata.uid(),
            gid: metadata.gid(),
            mode: metadata.mode(),
            accessed: FileTime::from_last_access_time(metadata),
            modified: FileTime::from_last_modification_time(metadata),
            size: metadata.len(),
        }
    }

    /// Permission bits only (including setuid, setgid and sticky)
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Whether `other` is physically the same object as this entry
    pub fn same_identity(&self, other: &Entry) -> bool {
        self.identity == other.identity
    }
}

fn kind_of(file_type: &fs::FileType) -> EntryKind {
    if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Unsupported
    }
}

/// Classify `path` without following symlinks
pub fn classify(path: &Path) -> Result<EntryKind> {
    Entry::stat(path).map(|entry| entry.kind)
}
