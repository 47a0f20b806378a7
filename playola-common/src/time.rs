//! Clock seam
//!
//! Every "is it time yet" comparison in the station goes through a
//! [`DateHandler`] so that tests (and clock-skew correction) can remap real
//! time onto a simulated timeline.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Source of "now" for the station timeline
pub trait DateHandler: Send + Sync {
    /// Current instant on the station timeline
    fn now(&self) -> DateTime<Utc>;

    /// Map a server-supplied instant (e.g. a spin airtime) onto the
    /// station timeline. Identity unless a handler simulates a shifted
    /// timeline.
    fn adjusted_date(&self, date: DateTime<Utc>) -> DateTime<Utc> {
        date
    }
}

/// Wall clock derived from the monotonic clock
///
/// Reads the system clock once at construction and advances with
/// `tokio::time::Instant` afterwards, so it never jumps when the system
/// clock is adjusted and it follows tokio's paused clock in tests.
#[derive(Debug)]
pub struct SystemDateHandler {
    anchor_wall: DateTime<Utc>,
    anchor_instant: Instant,
    skew: ChronoDuration,
}

impl SystemDateHandler {
    /// Create a handler anchored at the current system time
    pub fn new() -> Self {
        Self::with_skew(ChronoDuration::zero())
    }

    /// Create a handler whose `now()` is offset by `skew`
    ///
    /// `skew` is the server clock minus the local clock.
    pub fn with_skew(skew: ChronoDuration) -> Self {
        Self {
            anchor_wall: Utc::now(),
            anchor_instant: Instant::now(),
            skew,
        }
    }
}

impl Default for SystemDateHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl DateHandler for SystemDateHandler {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = ChronoDuration::from_std(self.anchor_instant.elapsed())
            .unwrap_or_else(|_| ChronoDuration::zero());
        self.anchor_wall + elapsed + self.skew
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct ManualDateHandler {
    now: Mutex<DateTime<Utc>>,
    shift: ChronoDuration,
}

impl ManualDateHandler {
    /// Create a clock frozen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            shift: ChronoDuration::zero(),
        }
    }

    /// Create a clock that also shifts every server date by `shift`
    pub fn with_shift(now: DateTime<Utc>, shift: ChronoDuration) -> Self {
        Self {
            now: Mutex::new(now),
            shift,
        }
    }

    /// Jump to an absolute instant
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Move the clock forward
    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl DateHandler for ManualDateHandler {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn adjusted_date(&self, date: DateTime<Utc>) -> DateTime<Utc> {
        date + self.shift
    }
}

/// Convert milliseconds to a chrono duration
pub fn millis(ms: u64) -> ChronoDuration {
    ChronoDuration::milliseconds(ms.min(i64::MAX as u64) as i64)
}
