//! Extended-attribute retrofit pass
//!
//! Walks a source snapshot and copies only extended attributes onto the
//! corresponding entries of an already complete destination snapshot. No
//! content, structure or ownership is touched. When a reference snapshot is
//! given, entries unchanged since the reference are skipped: their
//! destination is a hard link to an entry that was already handled.

use crate::copier::EntryCopier;
use crate::entry::Entry;
use crate::error::Result;
use crate::incremental::decide;
use crate::interrupt::InterruptFlag;
use crate::path_map::PathMapping;
use crate::types::CopyReport;
use crate::walker::{walk, TreeVisitor};
use std::path::{Path, PathBuf};

/// Copies extended attributes from a source tree to a destination tree
#[derive(Debug)]
pub struct AttributeCopy<'a> {
    source_root: PathBuf,
    destination: PathMapping,
    reference: Option<PathMapping>,
    copier: EntryCopier<'a>,
}

impl<'a> AttributeCopy<'a> {
    /// Create the pass; `reference` is the previous source snapshot, if any
    pub fn new(
        source_root: &Path,
        destination_root: &Path,
        reference: Option<&Path>,
        copier: EntryCopier<'a>,
    ) -> Self {
        let destination = PathMapping::new(source_root, destination_root);
        Self {
            source_root: source_root.to_path_buf(),
            reference: reference.map(|root| destination.retarget(root)),
            destination,
            copier,
        }
    }

    /// Copy the root's own attributes, then walk the tree
    pub fn run(&mut self) -> Result<()> {
        let root = Entry::stat(&self.source_root)?;
        let destination = self.destination.to().to_path_buf();
        self.copier.copy_attributes(&root, &destination)?;
        walk(&root.path, self)
    }

    /// Counters accumulated so far
    pub fn report(&self) -> &CopyReport {
        self.copier.report()
    }

    /// Consume the pass, returning its counters
    pub fn into_report(self) -> CopyReport {
        self.copier.into_report()
    }

    fn unchanged(&self, entry: &Entry) -> Result<bool> {
        match &self.reference {
            Some(reference) => Ok(decide(entry, reference)?.is_unchanged()),
            None => Ok(false),
        }
    }

    fn visit(&mut self, entry: &Entry) -> Result<bool> {
        if self.unchanged(entry)? {
            return Ok(false);
        }
        let destination = self.destination.map(&entry.path)?;
        self.copier.copy_attributes(entry, &destination)?;
        Ok(true)
    }
}

impl TreeVisitor for AttributeCopy<'_> {
    fn directory(&mut self, entry: &Entry) -> Result<()> {
        if self.visit(entry)? {
            walk(&entry.path, self)?;
        }
        Ok(())
    }

    fn file(&mut self, entry: &Entry) -> Result<()> {
        self.visit(entry).map(|_| ())
    }

    fn symlink(&mut self, entry: &Entry) -> Result<()> {
        self.visit(entry).map(|_| ())
    }

    fn report_mut(&mut self) -> &mut CopyReport {
        self.copier.report_mut()
    }

    fn interrupt(&self) -> Option<&InterruptFlag> {
        self.copier.interrupt()
    }
}
