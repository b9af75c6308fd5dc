//! Core data types used throughout the timecopy library
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Entries**: [`EntryKind`], [`EntryIdentity`] - what a path is and which
//!   physical object it refers to
//! - **Configuration**: [`CopyOptions`] - switches shared by every strategy
//! - **Results**: [`CopyReport`], [`SnapshotReport`], [`ChainReport`],
//!   [`DatabaseReport`] - counters rolled up from entry to database level
//!
//! ## Examples
//!
//! ```rust
//! use timecopy::types::{CopyOptions, CopyReport};
//!
//! let options = CopyOptions {
//!     dry_run: true,
//!     ..Default::default()
//! };
//! assert!(options.announces_operations());
//!
//! let mut total = CopyReport::default();
//! total.merge(&CopyReport { files_copied: 2, ..Default::default() });
//! assert_eq!(total.files_copied, 2);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Type of a filesystem entry, determined without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// A directory
    Directory,
    /// A regular file
    File,
    /// A symbolic link (never dereferenced)
    Symlink,
    /// Sockets, fifos, device nodes and anything else
    Unsupported,
}

impl EntryKind {
    /// Short human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Directory => "directory",
            EntryKind::File => "file",
            EntryKind::Symlink => "symlink",
            EntryKind::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device and inode pair identifying the physical object behind a path
///
/// Two paths with equal identities are hard links to the same data. This is
/// how the backup producer records "unchanged since the last snapshot".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryIdentity {
    /// Device number
    pub dev: u64,
    /// Inode number
    pub ino: u64,
}

/// Options recognised by every copy strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyOptions {
    /// Log every operation before performing it
    pub verbose: bool,
    /// Perform no filesystem mutation, only traverse and log
    pub dry_run: bool,
    /// Do not replicate owner and group
    pub skip_ownership: bool,
    /// Only copy extended attributes onto an already complete destination
    pub attributes_only: bool,
    /// Delay before the single ownership retry after a permission failure
    pub ownership_retry_delay: Duration,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            dry_run: false,
            skip_ownership: false,
            attributes_only: false,
            ownership_retry_delay: Duration::from_millis(500),
        }
    }
}

impl CopyOptions {
    /// Whether operation lines are logged at `info` rather than `debug`
    ///
    /// A dry run always announces its operations, otherwise it would have no
    /// observable output at all.
    pub fn announces_operations(&self) -> bool {
        self.verbose || self.dry_run
    }
}

/// Counters accumulated while copying one tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyReport {
    /// Directories created at the destination
    pub directories_created: usize,
    /// Regular files copied
    pub files_copied: usize,
    /// Bytes of file content written
    pub bytes_copied: u64,
    /// Symbolic links recreated
    pub symlinks_created: usize,
    /// Hard links made into the previous destination snapshot
    pub hard_links: usize,
    /// Entries whose extended attributes were copied
    pub attributes_copied: usize,
    /// Entries of unsupported type that were skipped
    pub unsupported_skipped: usize,
    /// Entries (or subtrees) that failed and were skipped
    pub failed: usize,
    /// Entries that could not be linked because the destination chain is broken
    pub consistency_errors: usize,
    /// Metadata steps that failed without failing the entry
    pub metadata_warnings: usize,
}

impl CopyReport {
    /// Add another report's counters to this one
    pub fn merge(&mut self, other: &CopyReport) {
        self.directories_created += other.directories_created;
        self.files_copied += other.files_copied;
        self.bytes_copied += other.bytes_copied;
        self.symlinks_created += other.symlinks_created;
        self.hard_links += other.hard_links;
        self.attributes_copied += other.attributes_copied;
        self.unsupported_skipped += other.unsupported_skipped;
        self.failed += other.failed;
        self.consistency_errors += other.consistency_errors;
        self.metadata_warnings += other.metadata_warnings;
    }

    /// Entries that were not replicated for any reason
    pub fn skipped(&self) -> usize {
        self.unsupported_skipped + self.failed + self.consistency_errors
    }

    /// Whether any entry failed
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.consistency_errors > 0
    }
}

/// How a snapshot was handled by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotMode {
    /// First snapshot of a chain, copied unconditionally
    Full,
    /// Compared against the previous snapshot, unchanged entries linked
    Incremental,
    /// Destination already existed, left untouched
    Skipped,
    /// Only extended attributes were copied
    AttributesOnly,
}

/// Progress notifications emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A snapshot is about to be processed
    SnapshotStarted {
        /// Chain (host) name
        chain: String,
        /// Snapshot name
        snapshot: String,
        /// How it will be processed
        mode: SnapshotMode,
    },
    /// A snapshot has been processed
    SnapshotFinished {
        /// Chain (host) name
        chain: String,
        /// Snapshot name
        snapshot: String,
    },
}

/// Outcome of one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotReport {
    /// Snapshot name
    pub name: String,
    /// How the snapshot was handled
    pub mode: SnapshotMode,
    /// Counters for this snapshot
    pub report: CopyReport,
    /// Time spent on this snapshot
    pub duration: Duration,
}

/// Outcome of one snapshot chain (one backed-up host)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainReport {
    /// Chain name, usually the host name
    pub name: String,
    /// Per-snapshot outcomes, in chain order
    pub snapshots: Vec<SnapshotReport>,
    /// Snapshot the `Latest` marker points at after the run
    pub latest: Option<String>,
    /// Whether the chain stopped because of an interrupt
    pub interrupted: bool,
}

impl ChainReport {
    /// Sum of all snapshot counters
    pub fn totals(&self) -> CopyReport {
        let mut total = CopyReport::default();
        for snapshot in &self.snapshots {
            total.merge(&snapshot.report);
        }
        total
    }
}

/// Outcome of a whole database replication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseReport {
    /// Source volume
    pub source: PathBuf,
    /// Destination volume
    pub destination: PathBuf,
    /// One report per chain
    pub chains: Vec<ChainReport>,
    /// Counters for the database root and host directories, bookkeeping
    /// files included
    #[serde(default)]
    pub root: CopyReport,
    /// Bookkeeping files copied at the database root
    pub bookkeeping_files: usize,
    /// Whether the run stopped because of an interrupt
    pub interrupted: bool,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

impl DatabaseReport {
    /// Sum of the root counters and all chain counters
    pub fn totals(&self) -> CopyReport {
        let mut total = self.root.clone();
        for chain in &self.chains {
            total.merge(&chain.totals());
        }
        total
    }
}
