//! Per-entry filesystem operations shared by the copy strategies
//!
//! [`EntryCopier`] performs the four primitive operations a strategy needs:
//! create a directory, copy a file, recreate a symlink, make a hard link. It
//! owns the operation log and the counters, and honours `dry_run` by logging
//! the operation without performing it.
//!
//! Metadata failures never fail the entry they belong to: the content is in
//! place, so they are logged and counted as metadata warnings.
//!
//! A new directory stays writable by its owner while it is populated. Its
//! final mode and times are applied by [`EntryCopier::finish_directory`].

use crate::entry::Entry;
use crate::error::{Result, TimecopyError};
use crate::interrupt::InterruptFlag;
use crate::metadata::MetadataReplicator;
use crate::types::{CopyOptions, CopyReport};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Performs copy operations and keeps their counters
#[derive(Debug)]
pub struct EntryCopier<'a> {
    options: &'a CopyOptions,
    replicator: &'a MetadataReplicator,
    interrupt: Option<&'a InterruptFlag>,
    report: CopyReport,
}

impl<'a> EntryCopier<'a> {
    /// Create a copier with empty counters
    pub fn new(options: &'a CopyOptions, replicator: &'a MetadataReplicator) -> Self {
        Self {
            options,
            replicator,
            interrupt: None,
            report: CopyReport::default(),
        }
    }

    /// Check `interrupt` before every entry the copier's strategy visits
    pub fn with_interrupt(mut self, interrupt: Option<&'a InterruptFlag>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Options in effect
    pub fn options(&self) -> &CopyOptions {
        self.options
    }

    /// Interrupt flag, if any
    pub fn interrupt(&self) -> Option<&InterruptFlag> {
        self.interrupt
    }

    /// Counters accumulated so far
    pub fn report(&self) -> &CopyReport {
        &self.report
    }

    /// Mutable counters, for the walker's failure accounting
    pub fn report_mut(&mut self) -> &mut CopyReport {
        &mut self.report
    }

    /// Consume the copier, returning its counters
    pub fn into_report(self) -> CopyReport {
        self.report
    }

    fn announce(&self, operation: fmt::Arguments<'_>) {
        if self.options.announces_operations() {
            info!("{}", operation);
        } else {
            debug!("{}", operation);
        }
    }

    /// Create `destination` as a copy of the directory `source`
    ///
    /// The parent of `destination` must already exist.
    pub fn make_directory(&mut self, source: &Entry, destination: &Path) -> Result<()> {
        self.announce(format_args!("mkdir <{}>", destination.display()));
        if !self.options.dry_run {
            fs::create_dir(destination).map_err(|source| TimecopyError::CreateDirectory {
                path: destination.to_path_buf(),
                source,
            })?;
            self.apply_metadata(source, destination);
            if let Err(e) = self.replicator.open_directory(source, destination) {
                self.warn_metadata(&e);
            }
        }
        self.report.directories_created += 1;
        Ok(())
    }

    /// Apply a directory's final mode and times once its children are in place
    pub fn finish_directory(&mut self, source: &Entry, destination: &Path) {
        if self.options.dry_run {
            return;
        }
        let outcome = self.replicator.finish_directory(source, destination);
        for e in &outcome.failures {
            self.warn_metadata(e);
        }
    }

    /// Copy the content and metadata of the regular file `source`
    pub fn copy_file(&mut self, source: &Entry, destination: &Path) -> Result<()> {
        self.announce(format_args!(
            "cp <{}> <{}>",
            source.path.display(),
            destination.display()
        ));
        let bytes = if self.options.dry_run {
            source.size
        } else {
            let bytes = fs::copy(&source.path, destination).map_err(|e| TimecopyError::CopyContent {
                from: source.path.clone(),
                to: destination.to_path_buf(),
                source: e,
            })?;
            self.apply_metadata(source, destination);
            bytes
        };
        self.report.files_copied += 1;
        self.report.bytes_copied += bytes;
        Ok(())
    }

    /// Recreate the symlink `source` at `destination` without resolving it
    pub fn copy_symlink(&mut self, source: &Entry, destination: &Path) -> Result<()> {
        let target = fs::read_link(&source.path).map_err(|e| TimecopyError::CreateSymlink {
            path: destination.to_path_buf(),
            source: e,
        })?;
        self.announce(format_args!(
            "ln -s <{}> <{}>",
            target.display(),
            destination.display()
        ));
        if !self.options.dry_run {
            std::os::unix::fs::symlink(&target, destination).map_err(|e| {
                TimecopyError::CreateSymlink {
                    path: destination.to_path_buf(),
                    source: e,
                }
            })?;
            self.apply_metadata(source, destination);
        }
        self.report.symlinks_created += 1;
        Ok(())
    }

    /// Hard link `destination` to the already materialised `existing`
    ///
    /// A missing `existing` means the previous destination snapshot is
    /// incomplete and is reported as [`TimecopyError::MissingLinkSource`].
    /// In a dry run the previous snapshot may only have been simulated, so a
    /// missing `existing` is tolerated there.
    pub fn hard_link(&mut self, existing: &Path, destination: &Path) -> Result<()> {
        self.announce(format_args!(
            "ln <{}> <{}>",
            existing.display(),
            destination.display()
        ));
        match fs::symlink_metadata(existing) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !self.options.dry_run {
                    return Err(TimecopyError::MissingLinkSource {
                        expected: existing.to_path_buf(),
                        link: destination.to_path_buf(),
                    });
                }
            }
            Err(e) => {
                return Err(TimecopyError::HardLink {
                    from: existing.to_path_buf(),
                    to: destination.to_path_buf(),
                    source: e,
                })
            }
        }
        if !self.options.dry_run {
            fs::hard_link(existing, destination).map_err(|e| TimecopyError::HardLink {
                from: existing.to_path_buf(),
                to: destination.to_path_buf(),
                source: e,
            })?;
        }
        self.report.hard_links += 1;
        Ok(())
    }

    /// Copy only the extended attributes of `source` onto `destination`
    pub fn copy_attributes(&mut self, source: &Entry, destination: &Path) -> Result<()> {
        self.announce(format_args!("xattr <{}>", destination.display()));
        if self.options.dry_run {
            return Ok(());
        }
        let copied = self.replicator.replicate_xattrs(&source.path, destination)?;
        if copied > 0 {
            self.report.attributes_copied += 1;
        }
        Ok(())
    }

    fn apply_metadata(&mut self, source: &Entry, destination: &Path) {
        let outcome = self.replicator.replicate(source, destination);
        if outcome.xattrs > 0 {
            self.report.attributes_copied += 1;
        }
        for e in &outcome.failures {
            self.warn_metadata(e);
        }
    }

    fn warn_metadata(&mut self, error: &TimecopyError) {
        warn!("{}", error);
        self.report.metadata_warnings += 1;
    }
}
