//! Time source for the lifecycle state machines.

use chrono::{DateTime, Utc};

/// Supplies "now" to every time-dependent decision (expiry, cooldown, lock).
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
