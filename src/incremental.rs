//! Hard-link aware incremental copy
//!
//! Every snapshot after the first is compared, entry by entry, against the
//! previous snapshot of the source chain (the reference tree). The backup
//! producer already records "unchanged since the last snapshot" by hard
//! linking, so an entry whose device/inode pair equals its reference
//! counterpart is unchanged.
//!
//! - **Unchanged** entries (directories included) become hard links to the
//!   same relative path in the previous *destination* snapshot. Unchanged
//!   directories are not descended into.
//! - **Changed** entries, including ones with no reference counterpart or
//!   whose type differs from it, are copied exactly like a full copy.

use crate::copier::EntryCopier;
use crate::entry::Entry;
use crate::error::Result;
use crate::interrupt::InterruptFlag;
use crate::path_map::PathMapping;
use crate::types::CopyReport;
use crate::walker::{walk, TreeVisitor};
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Roots an incremental copy works with
#[derive(Debug, Clone)]
pub struct IncrementalRoots {
    /// Snapshot being copied, on the source side
    pub source: PathBuf,
    /// Previous snapshot on the source side, compared against
    pub reference: PathBuf,
    /// Previous snapshot on the destination side, linked into
    pub previous_destination: PathBuf,
    /// Snapshot being created on the destination side
    pub destination: PathBuf,
}

/// Whether an entry differs from its reference counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Same physical object as the reference entry
    Unchanged,
    /// No reference entry at that path
    Added,
    /// Reference entry exists with a different type
    TypeChanged,
    /// Reference entry exists and is a different object
    Modified,
}

impl Decision {
    /// Whether the entry can be hard linked
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Decision::Unchanged)
    }
}

/// Compare `entry` with its counterpart in the reference tree
///
/// A reference entry that cannot be read is treated as absent.
pub fn decide(entry: &Entry, reference: &PathMapping) -> Result<Decision> {
    let reference_path = reference.map(&entry.path)?;
    let decision = match Entry::stat_if_exists(&reference_path) {
        Ok(None) => Decision::Added,
        Ok(Some(previous)) if previous.kind != entry.kind => Decision::TypeChanged,
        Ok(Some(previous)) if previous.same_identity(entry) => Decision::Unchanged,
        Ok(Some(_)) => Decision::Modified,
        Err(e) => {
            warn!("Treating {:?} as changed: {}", entry.path, e);
            Decision::Modified
        }
    };
    trace!("{:?}: {:?}", entry.path, decision);
    Ok(decision)
}

/// Copies a snapshot, linking entries unchanged since the previous one
#[derive(Debug)]
pub struct IncrementalCopy<'a> {
    source_root: PathBuf,
    destination: PathMapping,
    reference: PathMapping,
    previous_destination: PathMapping,
    copier: EntryCopier<'a>,
}

impl<'a> IncrementalCopy<'a> {
    /// Create the strategy; `roots.destination` must already exist
    pub fn new(roots: &IncrementalRoots, copier: EntryCopier<'a>) -> Self {
        let destination = PathMapping::new(&roots.source, &roots.destination);
        Self {
            source_root: roots.source.clone(),
            reference: destination.retarget(&roots.reference),
            previous_destination: destination.retarget(&roots.previous_destination),
            destination,
            copier,
        }
    }

    /// Walk the source snapshot
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

    /// Hard link `entry` to its copy in the previous destination snapshot
    fn link_unchanged(&mut self, entry: &Entry, destination: &Path) -> Result<()> {
        let existing = self.previous_destination.map(&entry.path)?;
        self.copier.hard_link(&existing, destination)
    }
}

impl TreeVisitor for IncrementalCopy<'_> {
    fn directory(&mut self, entry: &Entry) -> Result<()> {
        let destination = self.destination.map(&entry.path)?;
        if decide(entry, &self.reference)?.is_unchanged() {
            return self.link_unchanged(entry, &destination);
        }
        self.copier.make_directory(entry, &destination)?;
        walk(&entry.path, self)?;
        self.copier.finish_directory(entry, &destination);
        Ok(())
    }

    fn file(&mut self, entry: &Entry) -> Result<()> {
        let destination = self.destination.map(&entry.path)?;
        if decide(entry, &self.reference)?.is_unchanged() {
            self.link_unchanged(entry, &destination)
        } else {
            self.copier.copy_file(entry, &destination)
        }
    }

    fn symlink(&mut self, entry: &Entry) -> Result<()> {
        let destination = self.destination.map(&entry.path)?;
        if decide(entry, &self.reference)?.is_unchanged() {
            self.link_unchanged(entry, &destination)
        } else {
            self.copier.copy_symlink(entry, &destination)
        }
    }

    fn report_mut(&mut self) -> &mut CopyReport {
        self.copier.report_mut()
    }

    fn interrupt(&self) -> Option<&InterruptFlag> {
        self.copier.interrupt()
    }
}
