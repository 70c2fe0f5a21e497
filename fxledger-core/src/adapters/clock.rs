//! Store-wide monotonic commit clock

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Hands out strictly increasing timestamps at microsecond resolution
///
/// Two calls landing in the same microsecond are separated by bumping the
/// later one by 1µs, so no two ledger events ever share a timestamp.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never hand out a timestamp at or before `floor`
    ///
    /// Called when a store is opened so that timestamps stay ahead of
    /// everything already persisted, even if the wall clock went backwards.
    pub fn seed(&self, floor: DateTime<Utc>) {
        self.last_micros
            .fetch_max(floor.timestamp_micros(), Ordering::SeqCst);
    }

    pub fn tick(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let mut last = self.last_micros.load(Ordering::SeqCst);
        loop {
            let next = wall.max(last + 1);
            match self.last_micros.compare_exchange_weak(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
                Err(current) => last = current,
            }
        }
    }
}
