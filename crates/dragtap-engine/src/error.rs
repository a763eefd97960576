//! Error types and result alias for the engine crate.
use std::result::Result as StdResult;

use thiserror::Error;

/// Convenient result type for the engine crate.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for the dragtap engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Errors originating from the pointer-tap layer, including missing
    /// Input Monitoring permission and tap-creation refusal.
    #[error("Pointer tap error: {0}")]
    Tap(#[from] mac_pointer::Error),
}

impl Error {
    /// True when the failure is a missing OS permission; the caller should
    /// re-invoke `start()` once the permission has been granted.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Tap(mac_pointer::Error::PermissionDenied(_)))
    }
}
