//! Hand-rolled error type for the control core, kept `no_std`-clean (no `thiserror`).
//!
//! `CoreError` carries the synchronous caller-facing codes from §6 plus the handful of
//! internal-invariant variants exercised only by debug assertions and tests.

use core::fmt;

/// Errors returned synchronously to API callers, plus internal invariant violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// A null/zero or otherwise malformed parameter was supplied.
    Param,
    /// The INIC command channel is held by an outstanding command.
    ApiLocked,
    /// The operation requires a precondition (started, network up, …) that isn't met.
    NotAvailable,
    /// The requested transition is redundant with the current state.
    AlreadySet,
    /// The engine has not completed `start_process`/`start` yet.
    NotInitialized,
    /// An EPM result referred to a shadow/resource this route no longer owns.
    InvalidShadow,
    /// A fixed-capacity buffer/pool has no room left for the request.
    BufferOverflow,
    /// A HAL or transport collaborator reported an I/O failure.
    Io(&'static str),
    /// A defect in core bookkeeping that should never be reachable with valid input.
    Internal(&'static str),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param => write!(f, "invalid parameter"),
            Self::ApiLocked => write!(f, "INIC command channel is locked"),
            Self::NotAvailable => write!(f, "operation not available in current state"),
            Self::AlreadySet => write!(f, "requested state already set"),
            Self::NotInitialized => write!(f, "engine not initialized"),
            Self::InvalidShadow => write!(f, "stale resource shadow"),
            Self::BufferOverflow => write!(f, "buffer/pool capacity exceeded"),
            Self::Io(s) => write!(f, "I/O error: {}", s),
            Self::Internal(s) => write!(f, "internal error: {}", s),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CoreError {}

impl From<&'static str> for CoreError {
    fn from(s: &'static str) -> Self {
        CoreError::Internal(s)
    }
}
