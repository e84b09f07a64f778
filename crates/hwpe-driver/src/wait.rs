//! Bounded busy-polling
//!
//! The reference bench spins on ACQUIRE forever. Here every spin takes a
//! [`PollConfig`] and a [`CancelToken`], so a stuck accelerator surfaces as
//! [`HwpeError::Timeout`] or [`HwpeError::Cancelled`] instead of a hang.
//! `PollConfig::default()` keeps the unbounded reference behaviour.

use crate::error::{HwpeError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long and how often to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollConfig {
    /// Give up after this long; `None` polls forever
    pub timeout: Option<Duration>,

    /// Sleep between attempts; zero spins
    pub interval: Duration,
}

impl PollConfig {
    /// Poll with a deadline
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            interval: Duration::ZERO,
        }
    }

    /// Sleep `interval` between attempts
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Cooperative cancellation flag shared between a waiter and its controller
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every wait observing this token
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// True once `cancel` has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Call `attempt` until it yields `Some`, the deadline passes or `cancel` fires
///
/// # Errors
///
/// Returns [`HwpeError::Timeout`] or [`HwpeError::Cancelled`].
pub fn poll_until<T>(
    config: &PollConfig,
    cancel: &CancelToken,
    what: &'static str,
    mut attempt: impl FnMut() -> Option<T>,
) -> Result<T> {
    let start = Instant::now();
    let mut attempts: u64 = 0;

    loop {
        if let Some(value) = attempt() {
            tracing::trace!("{what}: ready after {attempts} retries");
            return Ok(value);
        }
        attempts += 1;

        if cancel.is_cancelled() {
            tracing::debug!("{what}: cancelled after {attempts} attempts");
            return Err(HwpeError::Cancelled { what });
        }
        if let Some(timeout) = config.timeout {
            if start.elapsed() >= timeout {
                tracing::warn!("{what}: timed out after {attempts} attempts");
                return Err(HwpeError::timeout(what, timeout));
            }
        }

        if config.interval.is_zero() {
            std::hint::spin_loop();
        } else {
            std::thread::sleep(config.interval);
        }
    }
}
