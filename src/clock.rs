//! Injectable time source.
//!
//! TTL expiry in this crate is evaluated lazily by comparing stored
//! timestamps against the current time, so every component that touches a
//! deadline takes a [`Clock`]. Production code uses [`SystemClock`]; tests
//! drive [`ManualClock`] forward to cross 48-hour windows instantly.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
///
/// Persisted timestamps must survive process restarts, so wall-clock epoch
/// time is used rather than `Instant`.
pub type EpochMillis = u64;

/// Convert a `SystemTime` to epoch milliseconds (0 for pre-epoch times).
pub fn epoch_millis(t: SystemTime) -> EpochMillis {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A source of "now", injectable for deterministic tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;

    fn now_millis(&self) -> EpochMillis {
        epoch_millis(self.now())
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
    /// Start at the Unix epoch plus one day, far enough from zero that
    /// subtracting TTLs in assertions never underflows.
    pub fn new() -> Self {
        Self::starting_at(UNIX_EPOCH + Duration::from_secs(86_400))
    }

    pub fn starting_at(t: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(t)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, t: SystemTime) {
        *self.now.lock().unwrap() = t;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap()
    }
}
