//! Deadlines and cooperative cancellation for long-running queries.
//!
//! Query loops call [`Deadline::check`] at each iteration boundary.

use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag; clones observe the same flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Optional wall-clock limit plus an optional cancellation token
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    at: Option<Instant>,
    token: Option<CancellationToken>,
}

impl Deadline {
    /// A deadline that never fires
    pub fn none() -> Self {
        Self::default()
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Some(Instant::now() + timeout),
            token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Cancellation wins over an expired deadline when both apply
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.token.as_ref().map(|t| t.is_cancelled()).unwrap_or(false) {
            return Err(Error::Cancelled);
        }
        match self.at {
            Some(at) if Instant::now() >= at => Err(Error::Timeout),
            _ => Ok(()),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }
}
