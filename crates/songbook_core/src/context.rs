//! Per-operation cancellation and deadline signal.
//!
//! # Responsibility
//! - Carry a caller-owned cancel flag and an optional deadline into every
//!   repository operation.
//!
//! # Invariants
//! - Clones share one cancel flag; cancelling any clone cancels all of them.
//! - Once done (cancelled or past deadline) a context never becomes live again.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why an operation stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Cancelled,
    DeadlineExceeded,
}

impl Display for Interrupted {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::DeadlineExceeded => write!(f, "operation deadline exceeded"),
        }
    }
}

impl Error for Interrupted {}

/// Cancellation-aware context passed to every catalog operation.
#[derive(Debug, Clone)]
pub struct OpContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}

impl OpContext {
    /// Context with no deadline that is only done when cancelled explicitly.
    pub fn background() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Context that expires `timeout` from now. A timeout too large to
    /// represent means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::background().child_with_deadline(deadline),
            None => Self::background(),
        }
    }

    /// Derives a context sharing this cancel flag with the earlier of the two
    /// deadlines.
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    /// Signals cancellation to every clone of this context.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the interruption reason, if any.
    pub fn interrupted(&self) -> Option<Interrupted> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Some(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupted::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.interrupted().is_some()
    }

    /// Fails with the interruption reason once the context is done.
    pub fn check(&self) -> Result<(), Interrupted> {
        match self.interrupted() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}
