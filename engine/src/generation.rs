use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;
use tokio::sync::futures::Notified;

/// Value of the request generation captured when an async request was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Monotonic counter bumped on every active-feature change. Responses tagged
/// with an older generation belong to a superseded selection.
#[derive(Debug, Default)]
pub struct RequestGeneration {
    current: AtomicU64,
    advanced: Notify,
}

impl RequestGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Generation {
        Generation(self.current.load(Ordering::Acquire))
    }

    /// Bump the counter and return the new generation.
    pub fn advance(&self) -> Generation {
        let next = Generation(self.current.fetch_add(1, Ordering::AcqRel) + 1);
        self.advanced.notify_waiters();
        next
    }

    /// Resolves on the next `advance`. Registered as soon as it is created, so
    /// create it before checking `is_current`.
    pub fn advanced(&self) -> Notified<'_> {
        self.advanced.notified()
    }

    pub fn is_current(&self, issued: Generation) -> bool {
        self.current() == issued
    }
}
