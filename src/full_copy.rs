//! Unconditional tree copy
//!
//! Used for the first snapshot of a chain, which has no predecessor to be
//! compared against. Every directory is created, every file copied and every
//! symlink recreated.

use crate::copier::EntryCopier;
use crate::entry::Entry;
use crate::error::Result;
use crate::interrupt::InterruptFlag;
use crate::path_map::PathMapping;
use crate::types::CopyReport;
use crate::walker::{walk, TreeVisitor};
use std::path::{Path, PathBuf};

/// Copies a whole tree into an existing destination root
#[derive(Debug)]
pub struct FullCopy<'a> {
    source_root: PathBuf,
    destination: PathMapping,
    copier: EntryCopier<'a>,
}

impl<'a> FullCopy<'a> {
    /// Copy the contents of `source_root` into `destination_root`
    ///
    /// `destination_root` must already exist.
    pub fn new(source_root: &Path, destination_root: &Path, copier: EntryCopier<'a>) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            destination: PathMapping::new(source_root, destination_root),
            copier,
        }
    }

    /// Walk the source tree
    pub fn run(&mut self) -> Result<()> {
        let root = self.source_root.clone();
        walk(&root, self)
    }

    /// Counters accumulated so far
    pub fn report(&self) -> &CopyReport {
        self.copier.report()
    }

    /// Consume the strategy, returning its counters
    pub fn into_report(self) -> CopyReport {
        self.copier.into_report()
    }
}

impl TreeVisitor for FullCopy<'_> {
    fn directory(&mut self, entry: &Entry) -> Result<()> {
        let destination = self.destination.map(&entry.path)?;
        // A directory that cannot be created takes its whole subtree with it
        self.copier.make_directory(entry, &destination)?;
        walk(&entry.path, self)?;
        self.copier.finish_directory(entry, &destination);
        Ok(())
    }

    fn file(&mut self, entry: &Entry) -> Result<()> {
        let destination = self.destination.map(&entry.path)?;
        self.copier.copy_file(entry, &destination)
    }

    fn symlink(&mut self, entry: &Entry) -> Result<()> {
        let destination = self.destination.map(&entry.path)?;
        self.copier.copy_symlink(entry, &destination)
    }

    fn report_mut(&mut self) -> &mut CopyReport {
        self.copier.report_mut()
    }

    fn interrupt(&self) -> Option<&InterruptFlag> {
        self.copier.interrupt()
    }
}
