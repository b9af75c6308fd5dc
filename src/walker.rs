//! Depth-first directory traversal
//!
//! [`walk`] lists the immediate children of one directory, classifies each of
//! them and dispatches to a [`TreeVisitor`]. It never descends on its own:
//! a visitor that wants the children of a directory creates whatever it needs
//! first and then calls [`walk`] again, which keeps "container before
//! contents" explicit in the visitor.
//!
//! Failures are contained to the entry they happened on. A child that cannot
//! be stat-ed, or whose callback fails, is reported and skipped and the
//! remaining siblings are still visited. Only [`TimecopyError::Interrupted`]
//! unwinds the traversal.
//!
//! ## Example
//!
//! ```rust,no_run
//! use timecopy::entry::Entry;
//! use timecopy::types::CopyReport;
//! use timecopy::walker::{walk, TreeVisitor};
//! use timecopy::Result;
//! use std::path::Path;
//!
//! struct Counter {
//!     files: usize,
//!     report: CopyReport,
//! }
//!
//! impl TreeVisitor for Counter {
//!     fn directory(&mut self, entry: &Entry) -> Result<()> {
//!         walk(&entry.path, self)
//!     }
//!     fn file(&mut self, _entry: &Entry) -> Result<()> {
//!         self.files += 1;
//!         Ok(())
//!     }
//!     fn symlink(&mut self, _entry: &Entry) -> Result<()> {
//!         Ok(())
//!     }
//!     fn report_mut(&mut self) -> &mut CopyReport {
//!         &mut self.report
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let mut counter = Counter { files: 0, report: CopyReport::default() };
//! walk(Path::new("/tmp"), &mut counter)?;
//! println!("{} files", counter.files);
//! # Ok(())
//! # }
//! ```

use crate::entry::Entry;
use crate::error::{Result, TimecopyError};
use crate::interrupt::InterruptFlag;
use crate::types::{CopyReport, EntryKind};
use std::path::{Path, PathBuf};
use tracing::{error, warn};
use walkdir::WalkDir;

/// Callbacks invoked by [`walk`] for each child of a directory
pub trait TreeVisitor {
    /// A directory was encountered; recursing is up to the visitor
    fn directory(&mut self, entry: &Entry) -> Result<()>;

    /// A regular file was encountered
    fn file(&mut self, entry: &Entry) -> Result<()>;

    /// A symbolic link was encountered
    fn symlink(&mut self, entry: &Entry) -> Result<()>;

    /// Anything else (fifo, socket, device) was encountered
    fn other(&mut self, entry: &Entry) -> Result<()> {
        warn!("Skipping unsupported file {:?}", entry.path);
        self.report_mut().unsupported_skipped += 1;
        Ok(())
    }

    /// Counters failures are recorded into
    fn report_mut(&mut self) -> &mut CopyReport;

    /// Flag checked before each entry
    fn interrupt(&self) -> Option<&InterruptFlag> {
        None
    }
}

/// Visit every immediate child of `dir`
pub fn walk<V: TreeVisitor + ?Sized>(dir: &Path, visitor: &mut V) -> Result<()> {
    // Listing up front releases the directory handle before descending
    let children = list_children(dir, visitor.report_mut());

    for path in children {
        if let Some(flag) = visitor.interrupt() {
            flag.check()?;
        }

        let outcome = match Entry::stat(&path) {
            Ok(entry) => match entry.kind {
                EntryKind::Directory => visitor.directory(&entry),
                EntryKind::File => visitor.file(&entry),
                EntryKind::Symlink => visitor.symlink(&entry),
                EntryKind::Unsupported => visitor.other(&entry),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {}
            Err(TimecopyError::Interrupted) => return Err(TimecopyError::Interrupted),
            Err(e) => record_failure(visitor.report_mut(), &path, &e),
        }
    }
    Ok(())
}

fn list_children(dir: &Path, report: &mut CopyReport) -> Vec<PathBuf> {
    let mut children = Vec::new();
    let listing = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false);
    for item in listing {
        match item {
            Ok(child) => children.push(child.into_path()),
            Err(e) => {
                let path = e.path().unwrap_or(dir).to_path_buf();
                record_failure(report, &path, &TimecopyError::Walk(e));
            }
        }
    }
    children
}

/// Log a per-entry failure and count it
///
/// Consistency failures are logged under the `timecopy::consistency` target
/// and counted separately from ordinary skips.
pub(crate) fn record_failure(report: &mut CopyReport, path: &Path, error: &TimecopyError) {
    if error.is_consistency_fatal() {
        error!(target: "timecopy::consistency", "{}", error);
        report.consistency_errors += 1;
    } else {
        error!("Skipping {:?}: {}", path, error);
        report.failed += 1;
    }
}
