//! Time sources.
//!
//! Monotonic time drives bucket refill and queue aging; UTC wall time only
//! decides which calendar day the quota ledger is counting. Monotonic
//! instants are [`tokio::time::Instant`]s so that a paused tokio runtime
//! (`start_paused = true`) controls refill in tests as well.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

/// A source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic now, used for refill and deadlines.
    fn now(&self) -> Instant;

    /// Wall-clock now, used for the UTC daily boundary.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Both readings advance together through [`ManualClock::advance`].
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

struct ManualState {
    elapsed: Duration,
    wall: DateTime<Utc>,
}

impl ManualClock {
    pub fn new(wall: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                wall,
            }),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.elapsed += by;
        // Out-of-range durations leave the wall clock where it was.
        state.wall = chrono::Duration::from_std(by)
            .ok()
            .and_then(|d| state.wall.checked_add_signed(d))
            .unwrap_or(state.wall);
    }

    /// Jump the wall clock without moving monotonic time.
    pub fn set_utc(&self, wall: DateTime<Utc>) {
        self.state.lock().wall = wall;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.state.lock().elapsed
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.state.lock().wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_moves_both_readings() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 30).unwrap();
        let clock = ManualClock::new(start);
        let t0 = clock.now();

        clock.advance(Duration::from_secs(45));

        assert_eq!(clock.now() - t0, Duration::from_secs(45));
        assert_eq!(
            clock.utc_now(),
            Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 15).unwrap()
        );
    }

    #[test]
    fn set_utc_leaves_monotonic_alone() {
        let clock = ManualClock::default();
        let t0 = clock.now();
        clock.set_utc(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(clock.now(), t0);
    }
}
