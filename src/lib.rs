//! # Timecopy - Replicate hard-link based backup databases
//!
//! Copies a backup database from one volume to another while preserving the
//! way it shares data between snapshots.
//!
//! ## Overview
//!
//! A backup database stores one directory tree per snapshot. Entries that did
//! not change between two snapshots are hard links to the same object (files,
//! symlinks, and on some systems whole directories). A naive recursive copy
//! turns every snapshot into a full copy; timecopy instead:
//!
//! - Copies the first snapshot of each chain in full
//! - Compares every later snapshot with its predecessor by device/inode
//!   identity, hard links unchanged entries into the previous *destination*
//!   snapshot and copies everything else
//! - Replicates ownership, permissions, timestamps and extended attributes
//! - Skips snapshots already present at the destination, so runs can be
//!   resumed
//! - Points each host's `Latest` marker at the newest copied snapshot
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use timecopy::TimecopyBuilder;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let timecopy = TimecopyBuilder::new().dry_run(true).build();
//! let report = timecopy.copy_database(
//!     Path::new("/Volumes/OldBackup"),
//!     Path::new("/Volumes/NewBackup"),
//! )?;
//!
//! for chain in &report.chains {
//!     println!("{}: {} snapshots", chain.name, chain.snapshots.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Copying a Single Chain
//!
//! ```rust,no_run
//! use timecopy::{SnapshotChain, TimecopyBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let chain = SnapshotChain::new(
//!     "gojira",
//!     "/Volumes/Old/Backups.backupdb/gojira",
//!     "/Volumes/New/Backups.backupdb/gojira",
//!     vec!["2021-01-01-120000".to_string(), "2021-01-02-120000".to_string()],
//! );
//! let report = TimecopyBuilder::new().skip_ownership(true).build().copy_chain(&chain)?;
//! println!("Latest: {:?}", report.latest);
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Handling
//!
//! A failure on one entry never aborts the run. It is logged, counted in the
//! [`CopyReport`] and the entry (or directory subtree) is skipped. A missing
//! link source in the previous destination snapshot means the destination
//! chain is already inconsistent; it is counted separately as a consistency
//! error and logged under the `timecopy::consistency` target.
//!
//! ## Module Organization
//!
//! - [`timecopy`]: database and chain orchestration
//! - [`full_copy`], [`incremental`], [`attributes`]: copy strategies
//! - [`walker`]: traversal and the [`walker::TreeVisitor`] trait
//! - [`copier`]: per-entry operations, dry run and operation log
//! - [`metadata`]: ownership, permissions, timestamps, extended attributes
//! - [`database`], [`latest`]: on-disk database layout and the `Latest` marker
//! - [`entry`], [`path_map`]: entry classification and root-to-root mapping
//! - [`interrupt`]: SIGINT/SIGTERM handling
//! - [`types`], [`error`]: shared types and error handling

#[cfg(not(unix))]
compile_error!("timecopy relies on Unix inode, ownership and symlink semantics");

// Public API modules
pub mod attributes;
pub mod copier;
pub mod database;
pub mod entry;
pub mod error;
pub mod full_copy;
pub mod incremental;
pub mod interrupt;
pub mod latest;
pub mod metadata;
pub mod path_map;
pub mod timecopy;
pub mod types;
pub mod utils;
pub mod walker;

// Re-export main types for convenience
pub use error::{Result, TimecopyError};
pub use interrupt::InterruptFlag;
pub use timecopy::{SnapshotChain, Timecopy, TimecopyBuilder};
pub use types::*;
