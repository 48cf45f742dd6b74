//! Clock abstraction
//!
//! The scheduler and the state machine stamp wall-clock instants; routing
//! them through a trait keeps those paths deterministic under test.

use chrono::{DateTime, Utc};

/// Source of the current instant.
pub trait Clock {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
