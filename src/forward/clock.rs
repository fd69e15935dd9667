//! Injected time source for aggregate timestamps

use chrono::{DateTime, Utc};

/// Process-wide time collaborator.
///
/// Aggregates never call `Utc::now()` directly so tests can observe a fixed
/// instant across a whole scenario.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real-time clock backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcClock;

impl Clock for UtcClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_clock_reports_utc() {
        let clock = UtcClock;
        let now = clock.now();
        assert_eq!(now.timezone(), Utc);
    }
}
