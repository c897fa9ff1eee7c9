// Workflow Clock - Time source for the driver

use chrono::{DateTime, Utc};

/// Source of "now" for scheduling decisions.
///
/// The driver reads the clock once per poll so every transition in that poll
/// agrees on the same instant. Tests swap in a manually advanced clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock in UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
