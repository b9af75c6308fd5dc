//! Error types for the timecopy library
//!
//! Every failure that can happen while replicating a backup database is
//! described here. Per-entry failures always carry the path (and where
//! relevant the operation) so they can be reported at the point where they
//! occur without aborting the rest of the traversal.
//!
//! Errors fall into four groups:
//!
//! - **Startup**: the source or target is unusable ([`TimecopyError::NotADatabase`],
//!   [`TimecopyError::InvalidRoot`]). Raised before anything is written.
//! - **Per-entry recoverable**: content, directory, symlink or link failures
//!   for a single entry. Logged, the entry (or subtree) is skipped.
//! - **Consistency-fatal**: [`TimecopyError::MissingLinkSource`], raised when the
//!   previous destination snapshot lacks an entry that must be hard linked.
//!   The run continues but the error is counted and reported separately.
//! - **Interruption**: [`TimecopyError::Interrupted`], which unwinds the
//!   traversal without touching the entries that are still pending.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the timecopy library
pub type Result<T> = std::result::Result<T, TimecopyError>;

/// Main error type for all timecopy operations
#[derive(Debug, Error)]
pub enum TimecopyError {
    /// I/O errors without more specific context
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory listing error from the walkdir crate
    #[error("Walk directory error: {0}")]
    Walk(#[from] walkdir::Error),

    /// An entry could not be stat-ed
    #[error("Cannot read {path:?}: {source}")]
    Classify {
        /// Entry that could not be read
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },

    /// A destination directory could not be created
    #[error("Cannot create directory {path:?}: {source}")]
    CreateDirectory {
        /// Directory that was being created
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },

    /// File content could not be copied
    #[error("Cannot copy {from:?} to {to:?}: {source}")]
    CopyContent {
        /// Source file
        from: PathBuf,
        /// Destination file
        to: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },

    /// A symbolic link could not be read or recreated
    #[error("Cannot create symlink {path:?}: {source}")]
    CreateSymlink {
        /// Symlink being created
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },

    /// A hard link could not be created
    #[error("Cannot link {to:?} to {from:?}: {source}")]
    HardLink {
        /// Existing entry in the previous destination snapshot
        from: PathBuf,
        /// New link in the current destination snapshot
        to: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },

    /// The previous destination snapshot lacks an entry that must be linked
    #[error("Destination chain is inconsistent: {expected:?} is missing, cannot link {link:?}")]
    MissingLinkSource {
        /// Entry that should exist in the previous destination snapshot
        expected: PathBuf,
        /// Link that could not be created
        link: PathBuf,
    },

    /// A metadata operation (mode, times, ownership) failed
    #[error("Cannot {operation} on {path:?}: {source}")]
    Metadata {
        /// Short name of the operation
        operation: &'static str,
        /// Destination entry
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },

    /// Extended attributes could not be written
    #[error("Cannot copy extended attributes to {path:?}: {source}")]
    Xattr {
        /// Destination entry
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },

    /// A path handed to a mapping does not start with the mapping's prefix
    #[error("Path {path:?} is not located under {prefix:?}")]
    PathOutsidePrefix {
        /// Offending path
        path: PathBuf,
        /// Prefix the mapping expected
        prefix: PathBuf,
    },

    /// The source volume carries no backup database
    #[error("{0:?} does not contain a backup database")]
    NotADatabase(PathBuf),

    /// A source or target root is unusable
    #[error("Invalid root {path:?}: {reason}")]
    InvalidRoot {
        /// Root that was rejected
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// The `Latest` marker could not be removed, even by the fallback
    #[error("Cannot remove marker {path:?}: {reason}")]
    MarkerRemoval {
        /// Marker path
        path: PathBuf,
        /// Why removal failed
        reason: String,
    },

    /// The run was interrupted by a signal
    #[error("Interrupted")]
    Interrupted,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TimecopyError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        TimecopyError::Internal(msg.into())
    }

    /// Create an invalid root error
    pub fn invalid_root(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TimecopyError::InvalidRoot {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error means the destination chain is already broken
    pub fn is_consistency_fatal(&self) -> bool {
        matches!(self, TimecopyError::MissingLinkSource { .. })
    }

    /// Check if this error must stop the run before anything is written
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            TimecopyError::NotADatabase(_) | TimecopyError::InvalidRoot { .. }
        )
    }

    /// Check if this error is the result of an external interrupt
    pub fn is_interrupt(&self) -> bool {
        matches!(self, TimecopyError::Interrupted)
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            TimecopyError::NotADatabase(path) => {
                format!(
                    "{:?} does not contain a 'Backups.backupdb' directory. \
                     Pass the root of the backup volume, not a host or snapshot directory.",
                    path
                )
            }
            TimecopyError::MissingLinkSource { expected, .. } => {
                format!(
                    "{:?} is missing from the previous destination snapshot. \
                     The destination chain is incomplete; remove the affected snapshots \
                     at the destination and run again.",
                    expected
                )
            }
            TimecopyError::Metadata { path, .. } | TimecopyError::Xattr { path, .. } => {
                format!(
                    "Metadata could not be applied to {:?}. Check that the process \
                     runs with sufficient privileges.",
                    path
                )
            }
            TimecopyError::Interrupted => {
                "Copy interrupted. Partially copied snapshots were left in place.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
