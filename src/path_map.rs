//! Prefix substitution between parallel trees
//!
//! A [`PathMapping`] rewrites a path under one root into the path at the same
//! relative position under another root. The mapping works on path
//! components, so a root such as `/a/b` never matches `/a/bc/...` and a
//! prefix-like substring deeper in the path is never touched.

use crate::error::{Result, TimecopyError};
use std::path::{Path, PathBuf};

/// Maps paths under `from` to the same relative path under `to`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    from: PathBuf,
    to: PathBuf,
}

impl PathMapping {
    /// Create a mapping from one root to another
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Root that mapped paths must start with
    pub fn from(&self) -> &Path {
        &self.from
    }

    /// Root that mapped paths are rebased onto
    pub fn to(&self) -> &Path {
        &self.to
    }

    /// Rebase `path` onto the target root
    ///
    /// Fails with [`TimecopyError::PathOutsidePrefix`] if `path` is not
    /// located under the source root.
    pub fn map(&self, path: &Path) -> Result<PathBuf> {
        let relative = path
            .strip_prefix(&self.from)
            .map_err(|_| TimecopyError::PathOutsidePrefix {
                path: path.to_path_buf(),
                prefix: self.from.clone(),
            })?;
        if relative.as_os_str().is_empty() {
            Ok(self.to.clone())
        } else {
            Ok(self.to.join(relative))
        }
    }

    /// Mapping with the same source root and a different target root
    pub fn retarget(&self, to: impl Into<PathBuf>) -> Self {
        Self::new(self.from.clone(), to)
    }
}
