//! Time capability.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use parking_lot::Mutex;

/// Supplies the current business time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A controllable clock for tests.
///
/// Queued values are handed out first; once the queue is drained the clock
/// keeps returning its current value until it is `set` or `advance`d.
#[derive(Debug)]
pub struct CustomClock {
    inner: Mutex<CustomClockState>,
}

#[derive(Debug)]
struct CustomClockState {
    current: DateTime<Utc>,
    upcoming: VecDeque<DateTime<Utc>>,
}

impl CustomClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(CustomClockState {
                current: start,
                upcoming: VecDeque::new(),
            }),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut state = self.inner.lock();
        state.current = now;
        state.upcoming.clear();
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.inner.lock();
        state.current += by;
    }

    /// Queues values returned by the next calls to [`Clock::now`], in order.
    pub fn queue(&self, values: impl IntoIterator<Item = DateTime<Utc>>) {
        let mut state = self.inner.lock();
        state.upcoming.extend(values);
    }
}

impl Default for CustomClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for CustomClock {
    fn now(&self) -> DateTime<Utc> {
        let mut state = self.inner.lock();
        match state.upcoming.pop_front() {
            Some(next) => {
                state.current = next;
                next
            }
            None => state.current,
        }
    }
}
