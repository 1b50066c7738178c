//! Global bypass breaker.
//!
//! When enough distinct candidates are failing at once, individual
//! disablement stops being useful and every request is forced to a direct
//! connection for one recovery window. The trip fires exactly once, on the
//! registry-size transition to the threshold, and the window is measured
//! from that first trip.

use crate::clock::EpochMillis;

/// Outcome of consulting the breaker before a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerVerdict {
    /// Not tripped; proceed with pruning.
    Clear,
    /// Tripped and inside the recovery window; force direct-only.
    Tripped,
    /// The window just elapsed. The breaker has cleared itself; the caller
    /// must reset the registry and the direct-failure counter with it.
    RecoveredNow,
}

#[derive(Debug)]
pub struct GlobalBreaker {
    ttl_ms: u64,
    trip_threshold: usize,
    extend_on_failure: bool,
    tripped_at: Option<EpochMillis>,
}

impl GlobalBreaker {
    pub fn new(ttl_ms: u64, trip_threshold: usize, extend_on_failure: bool) -> Self {
        Self {
            ttl_ms,
            trip_threshold,
            extend_on_failure,
            tripped_at: None,
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped_at.is_some()
    }

    pub fn tripped_at(&self) -> Option<EpochMillis> {
        self.tripped_at
    }

    /// Consult the breaker, clearing it when the recovery window has passed.
    pub fn too_many_failures(&mut self, now: EpochMillis) -> BreakerVerdict {
        match self.tripped_at {
            None => BreakerVerdict::Clear,
            Some(at) if now.saturating_sub(at) >= self.ttl_ms => {
                self.tripped_at = None;
                tracing::info!("global breaker recovery window elapsed, proxies restored");
                BreakerVerdict::RecoveredNow
            }
            Some(_) => BreakerVerdict::Tripped,
        }
    }

    /// Called after every failure recorded in the registry. Trips when the
    /// live registry size first reaches the threshold; returns whether the
    /// trip happened just now. Re-triggering while tripped does not move
    /// the window unless `extend_on_failure` is set.
    pub fn note_failure(&mut self, registry_len: usize, now: EpochMillis) -> bool {
        match self.tripped_at {
            Some(_) if self.extend_on_failure => {
                self.tripped_at = Some(now);
                false
            }
            Some(_) => false,
            None if registry_len >= self.trip_threshold => {
                self.tripped_at = Some(now);
                tracing::warn!(
                    failing = registry_len,
                    threshold = self.trip_threshold,
                    "too many failing candidates, bypassing all proxies"
                );
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.tripped_at = None;
    }

    pub fn restore(&mut self, tripped_at: Option<EpochMillis>) {
        self.tripped_at = tripped_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: u64 = 48 * 60 * 60 * 1000;

    #[test]
    fn test_trips_exactly_at_threshold() {
        let mut b = GlobalBreaker::new(TTL, 5, false);
        assert!(!b.note_failure(3, 100));
        assert!(!b.note_failure(4, 100));
        assert!(b.note_failure(5, 100));
        assert!(b.is_tripped());
        // further failures do not re-trip
        assert!(!b.note_failure(6, 200));
        assert_eq!(b.tripped_at(), Some(100));
    }

    #[test]
    fn test_fixed_window_from_first_trip() {
        let mut b = GlobalBreaker::new(TTL, 5, false);
        b.note_failure(5, 1_000);
        // later failures while tripped leave the window anchored at 1_000
        b.note_failure(9, 1_000 + TTL / 2);
        assert_eq!(b.too_many_failures(1_000 + TTL - 1), BreakerVerdict::Tripped);
        assert_eq!(b.too_many_failures(1_000 + TTL), BreakerVerdict::RecoveredNow);
        assert_eq!(b.too_many_failures(1_000 + TTL), BreakerVerdict::Clear);
    }

    #[test]
    fn test_extend_on_failure_moves_window() {
        let mut b = GlobalBreaker::new(TTL, 5, true);
        b.note_failure(5, 1_000);
        b.note_failure(6, 2_000);
        assert_eq!(b.tripped_at(), Some(2_000));
        assert_eq!(b.too_many_failures(1_000 + TTL), BreakerVerdict::Tripped);
        assert_eq!(b.too_many_failures(2_000 + TTL), BreakerVerdict::RecoveredNow);
    }

    #[test]
    fn test_clear_untrips() {
        let mut b = GlobalBreaker::new(TTL, 1, false);
        b.note_failure(1, 0);
        assert!(b.is_tripped());
        b.clear();
        assert_eq!(b.too_many_failures(1), BreakerVerdict::Clear);
    }

    #[test]
    fn test_restore_round_trip() {
        let mut b = GlobalBreaker::new(TTL, 5, false);
        b.restore(Some(42));
        assert!(b.is_tripped());
        assert_eq!(b.tripped_at(), Some(42));
        assert_eq!(b.too_many_failures(43), BreakerVerdict::Tripped);
    }
}
