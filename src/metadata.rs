//! Metadata replication
//!
//! Copies ownership, permission bits, timestamps and extended attributes from
//! a source entry onto an already created destination entry. Metadata is
//! applied without following symlinks, so a recreated link receives the
//! link's own metadata rather than its target's.
//!
//! Ownership is best effort. Changing owner and group routinely fails when
//! running without full privileges or on destination filesystems that map
//! every owner to a single "unknown" user:
//!
//! - permission denied on a symlink is ignored (logged at `debug`),
//! - permission denied on anything else is retried exactly once after
//!   [`CopyOptions::ownership_retry_delay`], and ignored if it fails again,
//! - every other error is returned.
//!
//! Ownership is applied before the permission bits because `chown` clears
//! the setuid and setgid bits. A failed step does not stop the ones after
//! it.

use crate::entry::Entry;
use crate::error::{Result, TimecopyError};
use crate::types::{CopyOptions, EntryKind};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Changes the owner and group of a path without following symlinks
pub trait OwnershipSetter: Send + Sync {
    /// Set `uid` and `gid` on `path`
    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()>;
}

/// [`OwnershipSetter`] backed by `lchown(2)`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOwnership;

impl OwnershipSetter for SystemOwnership {
    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        std::os::unix::fs::lchown(path, Some(uid), Some(gid))
    }
}

/// Copies metadata from source entries to destination entries
pub struct MetadataReplicator {
    skip_ownership: bool,
    retry_delay: Duration,
    ownership: Box<dyn OwnershipSetter>,
}

impl std::fmt::Debug for MetadataReplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataReplicator")
            .field("skip_ownership", &self.skip_ownership)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl MetadataReplicator {
    /// Create a replicator that changes ownership with `lchown(2)`
    pub fn new(options: &CopyOptions) -> Self {
        Self::with_ownership_setter(options, Box::new(SystemOwnership))
    }

    /// Create a replicator with a custom ownership backend
    pub fn with_ownership_setter(options: &CopyOptions, ownership: Box<dyn OwnershipSetter>) -> Self {
        Self {
            skip_ownership: options.skip_ownership,
            retry_delay: options.ownership_retry_delay,
            ownership,
        }
    }

    /// Replicate all metadata of `source` onto `destination`
    ///
    /// Every step runs even when an earlier one failed; the failures are
    /// collected in the returned [`Replicated`].
    pub fn replicate(&self, source: &Entry, destination: &Path) -> Replicated {
        let mut outcome = Replicated::default();
        if !self.skip_ownership {
            outcome.record(self.replicate_ownership(source, destination));
        }
        outcome.record(self.replicate_mode(source, destination));
        outcome.record(self.replicate_times(source, destination));
        match self.replicate_xattrs(&source.path, destination) {
            Ok(written) => outcome.xattrs = written,
            Err(e) => outcome.failures.push(e),
        }
        outcome
    }

    /// Replicate the permission bits
    pub fn replicate_mode(&self, source: &Entry, destination: &Path) -> Result<()> {
        // Linux has no lchmod; a symlink's own mode is always 0777 anyway
        if source.kind == EntryKind::Symlink {
            return Ok(());
        }
        set_mode(destination, source.permissions())
    }

    /// Replicate access and modification times only
    ///
    /// Used to restore a directory's times once its children are in place.
    pub fn replicate_times(&self, source: &Entry, destination: &Path) -> Result<()> {
        filetime::set_symlink_file_times(destination, source.accessed, source.modified)
            .map_err(|e| metadata_error("set timestamps", destination, e))
    }

    /// Make a freshly created directory writable and searchable by its owner
    ///
    /// A directory copied with a mode such as 0555 could not receive its
    /// children otherwise. Returns whether the mode was widened, in which
    /// case [`finish_directory`](Self::finish_directory) restores it.
    pub fn open_directory(&self, source: &Entry, destination: &Path) -> Result<bool> {
        let mode = source.permissions();
        if mode & OWNER_RWX == OWNER_RWX {
            return Ok(false);
        }
        set_mode(destination, mode | OWNER_RWX)?;
        Ok(true)
    }

    /// Apply a populated directory's final mode, then its times
    pub fn finish_directory(&self, source: &Entry, destination: &Path) -> Replicated {
        let mut outcome = Replicated::default();
        outcome.record(self.replicate_mode(source, destination));
        outcome.record(self.replicate_times(source, destination));
        outcome
    }

    /// Replicate owner and group, tolerating permission failures
    pub fn replicate_ownership(&self, source: &Entry, destination: &Path) -> Result<()> {
        let first = match self.ownership.set_owner(destination, source.uid, source.gid) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if first.kind() != io::ErrorKind::PermissionDenied {
            return Err(metadata_error("change ownership", destination, first));
        }
        if source.kind == EntryKind::Symlink {
            debug!("Ignoring ownership failure on symlink {:?}: {}", destination, first);
            return Ok(());
        }

        trace!("Retrying ownership of {:?} after {:?}", destination, self.retry_delay);
        thread::sleep(self.retry_delay);
        match self.ownership.set_owner(destination, source.uid, source.gid) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                debug!(
                    "Ownership of {:?} left unchanged ({}:{}): {}",
                    destination, source.uid, source.gid, e
                );
                Ok(())
            }
            Err(e) => Err(metadata_error("change ownership", destination, e)),
        }
    }

    /// Copy every extended attribute of `source` onto `destination`
    ///
    /// Attributes are listed and read without following symlinks. An entry
    /// whose attributes cannot be listed is treated as having none; a single
    /// unreadable attribute is skipped. Returns the number of attributes
    /// written.
    pub fn replicate_xattrs(&self, source: &Path, destination: &Path) -> Result<usize> {
        let names: Vec<_> = match xattr::list(source) {
            Ok(names) => names.collect(),
            Err(e) => {
                warn!("Cannot list extended attributes of {:?}: {}", source, e);
                return Ok(0);
            }
        };

        let mut copied = 0;
        for name in names {
            let value = match xattr::get(source, &name) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Cannot read extended attribute {:?} of {:?}: {}", name, source, e);
                    continue;
                }
            };
            xattr::set(destination, &name, &value).map_err(|source| TimecopyError::Xattr {
                path: destination.to_path_buf(),
                source,
            })?;
            copied += 1;
        }
        Ok(copied)
    }
}

const OWNER_RWX: u32 = 0o700;

/// Result of applying several metadata steps to one entry
#[derive(Debug, Default)]
pub struct Replicated {
    /// Extended attributes written
    pub xattrs: usize,
    /// Steps that failed, in the order they ran
    pub failures: Vec<TimecopyError>,
}

impl Replicated {
    fn record(&mut self, step: Result<()>) {
        if let Err(e) = step {
            self.failures.push(e);
        }
    }

    /// Whether every step succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| metadata_error("set permissions", path, e))
}

fn metadata_error(operation: &'static str, path: &Path, source: io::Error) -> TimecopyError {
    TimecopyError::Metadata {
        operation,
        path: path.to_path_buf(),
        source,
    }
}
