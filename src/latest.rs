//! The `Latest` marker
//!
//! Each host directory carries a `Latest` symlink naming its newest
//! snapshot. Replacing an existing marker can fail even for a privileged
//! process (some backup volumes protect it), in which case removal is handed
//! to a [`MarkerRemover`].

use crate::database::LATEST_MARKER;
use crate::error::{Result, TimecopyError};
use crate::types::CopyOptions;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Removes a marker the engine itself is not allowed to remove
pub trait MarkerRemover: Send + Sync {
    /// Remove `marker`
    fn remove(&self, marker: &Path) -> Result<()>;
}

/// Removes the marker as the user who invoked `sudo`
///
/// Reads `SUDO_USER` and runs `sudo -u <user> rm -f <marker>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvokingUserRemover;

impl MarkerRemover for InvokingUserRemover {
    fn remove(&self, marker: &Path) -> Result<()> {
        let user = std::env::var("SUDO_USER").map_err(|_| TimecopyError::MarkerRemoval {
            path: marker.to_path_buf(),
            reason: "permission denied and SUDO_USER is not set".to_string(),
        })?;
        debug!("Removing {:?} as {}", marker, user);
        let status = Command::new("sudo")
            .arg("-u")
            .arg(&user)
            .arg("rm")
            .arg("-f")
            .arg(marker)
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(TimecopyError::MarkerRemoval {
                path: marker.to_path_buf(),
                reason: format!("rm as {} exited with {}", user, status),
            })
        }
    }
}

/// Location of the marker in `host_dir`
pub fn marker_path(host_dir: &Path) -> PathBuf {
    host_dir.join(LATEST_MARKER)
}

/// Point the marker in `host_dir` at `snapshot`
pub fn update_latest(
    host_dir: &Path,
    snapshot: &str,
    options: &CopyOptions,
    remover: &dyn MarkerRemover,
) -> Result<()> {
    let marker = marker_path(host_dir);
    if options.announces_operations() {
        info!("ln -s <{}> <{}>", snapshot, marker.display());
    } else {
        debug!("ln -s <{}> <{}>", snapshot, marker.display());
    }
    if options.dry_run {
        return Ok(());
    }

    match fs::symlink_metadata(&marker) {
        Ok(_) => match fs::remove_file(&marker) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                warn!("Cannot remove {:?} ({}), delegating", marker, e);
                remover.remove(&marker)?;
            }
            Err(e) => {
                return Err(TimecopyError::MarkerRemoval {
                    path: marker,
                    reason: e.to_string(),
                })
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(TimecopyError::MarkerRemoval {
                path: marker,
                reason: e.to_string(),
            })
        }
    }

    std::os::unix::fs::symlink(snapshot, &marker).map_err(|source| TimecopyError::CreateSymlink {
        path: marker,
        source,
    })
}
