//! Cooperative interrupt handling
//!
//! SIGINT and SIGTERM only raise a flag. The walker checks the flag before
//! starting each entry, so an operation already in flight completes and the
//! traversal then unwinds with [`TimecopyError::Interrupted`].

use crate::error::{Result, TimecopyError};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag raised when the run should stop
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    /// Create a flag that is not yet raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag raised by SIGINT and SIGTERM
    pub fn install() -> Result<Self> {
        let flag = Self::new();
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&flag.raised))?;
        }
        Ok(flag)
    }

    /// Raise the flag
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been raised
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Fail with [`TimecopyError::Interrupted`] if the flag is raised
    pub fn check(&self) -> Result<()> {
        if self.is_raised() {
            Err(TimecopyError::Interrupted)
        } else {
            Ok(())
        }
    }
}
