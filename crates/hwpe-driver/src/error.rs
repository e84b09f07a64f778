//! Error types for HWPE driver operations

use thiserror::Error;

/// Result type alias for HWPE operations
pub type Result<T> = std::result::Result<T, HwpeError>;

/// Errors that can occur while driving the accelerator
///
/// Register accessors themselves never fail; errors come from mapping the
/// hardware, touching memory outside a known window, bounded waits and
/// configuration checks.
#[derive(Debug, Error)]
pub enum HwpeError {
    /// A bounded wait expired
    #[error("Timed out after {duration_ms}ms waiting for {what}")]
    Timeout {
        /// What was being waited for
        what: &'static str,
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// A wait was cancelled through its token
    #[error("Cancelled while waiting for {what}")]
    Cancelled {
        /// What was being waited for
        what: &'static str,
    },

    /// Memory access outside every mapped or simulated window
    #[error("Access outside mapped memory: {addr:#010x} (+{len} bytes)")]
    OutOfBounds {
        /// Bus address of the access
        addr: u64,
        /// Access length in bytes
        len: usize,
    },

    /// Mapping a physical window failed
    #[error("Failed to map memory: {reason}")]
    MapFailed {
        /// Reason for failure
        reason: String,
    },

    /// Job or bench configuration rejected
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason for rejection
        reason: String,
    },

    /// Accelerator is in a state that cannot serve the request
    #[error("Accelerator in invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// I/O error while opening device files or stimuli
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl HwpeError {
    /// Create a timeout error
    pub fn timeout(what: &'static str, duration: std::time::Duration) -> Self {
        Self::Timeout {
            what,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create an out-of-bounds error
    pub const fn out_of_bounds(addr: u64, len: usize) -> Self {
        Self::OutOfBounds { addr, len }
    }

    /// Create a map failure error
    pub fn map_failed(reason: impl Into<String>) -> Self {
        Self::MapFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }
}
