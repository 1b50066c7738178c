//! Failure records keyed by candidate identity, with lazy TTL expiry.
//!
//! A record older than the disable window is treated as absent even before
//! it is physically removed; lookups evict such records opportunistically,
//! so no background sweeper is needed and behavior is deterministic under
//! an injected clock.

use crate::candidate::HealthKey;
use crate::clock::EpochMillis;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Failure history of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub last_failure_at: EpochMillis,
    pub failure_count: u32,
}

impl ErrorRecord {
    /// Expired means logically absent. Saturating subtraction keeps records
    /// active if the wall clock moves backwards.
    pub fn is_expired(&self, now: EpochMillis, ttl_ms: u64) -> bool {
        now.saturating_sub(self.last_failure_at) >= ttl_ms
    }
}

/// Result of probing a key's health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyHealth {
    /// No live record; the candidate is usable.
    Ok,
    /// A live failure record disables the candidate.
    Disabled,
    /// A record existed but had aged out; it was evicted just now.
    Expired,
}

/// Mapping from candidate identity to failure record. No ordering
/// significance.
#[derive(Debug)]
pub struct HealthRegistry {
    ttl_ms: u64,
    entries: HashMap<HealthKey, ErrorRecord>,
}

impl HealthRegistry {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            entries: HashMap::new(),
        }
    }

    /// Record a failure for `key`: refresh the timestamp, bump the count.
    /// Returns the updated count (1 means the candidate was just disabled).
    pub fn mark_failed(&mut self, key: &HealthKey, now: EpochMillis) -> u32 {
        let record = self
            .entries
            .entry(key.clone())
            .and_modify(|r| {
                r.last_failure_at = now;
                r.failure_count = r.failure_count.saturating_add(1);
            })
            .or_insert(ErrorRecord {
                last_failure_at: now,
                failure_count: 1,
            });
        tracing::debug!(key = %key, failures = record.failure_count, "candidate marked failed");
        record.failure_count
    }

    /// Drop the record for `key`, re-enabling the candidate. Returns whether
    /// a record was present.
    pub fn mark_succeeded(&mut self, key: &HealthKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            tracing::debug!(key = %key, "candidate re-enabled after success");
        }
        removed
    }

    /// Probe a key, evicting its record if expired.
    pub fn probe(&mut self, key: &HealthKey, now: EpochMillis) -> KeyHealth {
        match self.entries.get(key) {
            None => KeyHealth::Ok,
            Some(record) if record.is_expired(now, self.ttl_ms) => {
                self.entries.remove(key);
                tracing::debug!(key = %key, "expired failure record evicted");
                KeyHealth::Expired
            }
            Some(_) => KeyHealth::Disabled,
        }
    }

    pub fn is_disabled(&mut self, key: &HealthKey, now: EpochMillis) -> bool {
        matches!(self.probe(key, now), KeyHealth::Disabled)
    }

    /// Count of live (non-expired) records, evicting stale ones on the way.
    pub fn active_len(&mut self, now: EpochMillis) -> usize {
        let ttl = self.ttl_ms;
        self.entries.retain(|_, r| !r.is_expired(now, ttl));
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Raw entries for persistence. Order is unspecified.
    pub fn snapshot_entries(&self) -> Vec<(HealthKey, ErrorRecord)> {
        self.entries
            .iter()
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect()
    }

    pub fn restore_entries(&mut self, entries: Vec<(HealthKey, ErrorRecord)>) {
        self.entries = entries.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::ProxyScheme;

    const HOUR_MS: u64 = 60 * 60 * 1000;
    const TTL_48H: u64 = 48 * HOUR_MS;

    fn key(host: &str) -> HealthKey {
        HealthKey {
            scheme: ProxyScheme::Http,
            host: host.into(),
            port: 8080,
        }
    }

    #[test]
    fn test_mark_failed_disables_until_success() {
        let mut reg = HealthRegistry::new(TTL_48H);
        let k = key("a");
        assert!(!reg.is_disabled(&k, 1_000));

        assert_eq!(reg.mark_failed(&k, 1_000), 1);
        assert!(reg.is_disabled(&k, 1_000));

        assert!(reg.mark_succeeded(&k));
        assert!(!reg.is_disabled(&k, 1_000));
    }

    #[test]
    fn test_mark_succeeded_absent_key_is_noop() {
        let mut reg = HealthRegistry::new(TTL_48H);
        assert!(!reg.mark_succeeded(&key("ghost")));
    }

    #[test]
    fn test_repeated_failures_bump_count_and_refresh_timestamp() {
        let mut reg = HealthRegistry::new(TTL_48H);
        let k = key("a");
        assert_eq!(reg.mark_failed(&k, 1_000), 1);
        assert_eq!(reg.mark_failed(&k, 5_000), 2);

        // the refreshed timestamp governs expiry
        assert!(reg.is_disabled(&k, 5_000 + TTL_48H - 1));
        assert!(!reg.is_disabled(&k, 5_000 + TTL_48H));
    }

    #[test]
    fn test_ttl_boundary_47h_disabled_49h_evicted() {
        let mut reg = HealthRegistry::new(TTL_48H);
        let k = key("a");
        let t0 = 10_000;
        reg.mark_failed(&k, t0);

        assert!(reg.is_disabled(&k, t0 + 47 * HOUR_MS));
        assert_eq!(reg.probe(&k, t0 + 49 * HOUR_MS), KeyHealth::Expired);
        // the record is gone, a further probe sees nothing
        assert_eq!(reg.probe(&k, t0 + 49 * HOUR_MS), KeyHealth::Ok);
    }

    #[test]
    fn test_expiry_is_inclusive_at_exactly_ttl() {
        let mut reg = HealthRegistry::new(TTL_48H);
        let k = key("a");
        reg.mark_failed(&k, 0);
        assert!(reg.is_disabled(&k, TTL_48H - 1));
        assert!(!reg.is_disabled(&k, TTL_48H));
    }

    #[test]
    fn test_active_len_evicts_expired() {
        let mut reg = HealthRegistry::new(TTL_48H);
        reg.mark_failed(&key("a"), 0);
        reg.mark_failed(&key("b"), TTL_48H / 2);
        assert_eq!(reg.active_len(0), 2);
        // "a" ages out, "b" survives
        assert_eq!(reg.active_len(TTL_48H), 1);
        assert!(!reg.is_empty());
        assert_eq!(reg.active_len(TTL_48H * 2), 0);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_clock_moving_backwards_keeps_record_active() {
        let mut reg = HealthRegistry::new(TTL_48H);
        let k = key("a");
        reg.mark_failed(&k, 1_000_000);
        assert!(reg.is_disabled(&k, 500));
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut reg = HealthRegistry::new(TTL_48H);
        reg.mark_failed(&key("a"), 100);
        reg.mark_failed(&key("a"), 200);
        reg.mark_failed(&key("b"), 300);

        let entries = reg.snapshot_entries();
        let mut fresh = HealthRegistry::new(TTL_48H);
        fresh.restore_entries(entries);

        assert!(fresh.is_disabled(&key("a"), 400));
        assert!(fresh.is_disabled(&key("b"), 400));
        assert_eq!(fresh.active_len(400), 2);
    }
}
