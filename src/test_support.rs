//! Shared test doubles.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;

/// A clock that only moves when told to.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    /// 2024-01-01T00:00:00Z.
    pub fn epoch() -> Self {
        match Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0) {
            chrono::LocalResult::Single(at) => Self::new(at),
            _ => panic!("fixed test epoch must be valid"),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => panic!("failed to convert {delta:?} to TimeDelta: {error}"),
        };
        *self.lock() += delta;
    }

    pub fn now_secs(&self) -> i64 {
        self.lock().timestamp()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock()
    }
}
