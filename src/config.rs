use std::time::Duration;

/// Policy applied when the direct fallback path itself keeps failing while
/// proxies are disabled, suggesting the disablement was a false positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryPolicy {
    /// Clear the registry, the global breaker and the direct-failure counter
    /// in one step, restoring the original routing immediately.
    #[default]
    HardReset,
    /// Permit exactly one subsequent request to run its original un-pruned
    /// chain as a probe. A successful probe performs the full reset; a
    /// failed probe reverts to suppression.
    SingleProbe,
}

/// Tunables for the failover subsystem.
///
/// Defaults are the canonical deployment values; every knob has a
/// `with_*` builder for profiles that need different thresholds.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// How long a failure record (and a global trip) stays in effect.
    pub disable_ttl: Duration,
    /// Distinct failing candidates required to trip the global breaker.
    pub trip_threshold: usize,
    /// Direct-connection failures tolerated before self-correction kicks in.
    pub direct_failure_threshold: u32,
    /// Self-correction behavior when the direct fallback keeps failing.
    pub recovery_policy: RecoveryPolicy,
    /// Whether failures after the initial trip push the recovery window out.
    /// Observed behavior is a fixed window from the first trip.
    pub extend_trip_on_failure: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            disable_ttl: Duration::from_secs(48 * 60 * 60),
            trip_threshold: 5,
            direct_failure_threshold: 20,
            recovery_policy: RecoveryPolicy::HardReset,
            extend_trip_on_failure: false,
        }
    }
}

impl GuardConfig {
    /// Create a new config with canonical defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the disable window shared by per-candidate records and the
    /// global trip
    pub fn with_disable_ttl(mut self, ttl: Duration) -> Self {
        self.disable_ttl = ttl;
        self
    }

    /// Set the global trip threshold (canonically 5-10)
    pub fn with_trip_threshold(mut self, threshold: usize) -> Self {
        self.trip_threshold = threshold;
        self
    }

    /// Set the direct-failure threshold for self-correction
    pub fn with_direct_failure_threshold(mut self, threshold: u32) -> Self {
        self.direct_failure_threshold = threshold;
        self
    }

    /// Set the self-correction policy
    pub fn with_recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.recovery_policy = policy;
        self
    }

    /// Let post-trip failures extend the recovery window
    pub fn with_extend_trip_on_failure(mut self, extend: bool) -> Self {
        self.extend_trip_on_failure = extend;
        self
    }

    pub(crate) fn disable_ttl_millis(&self) -> u64 {
        self.disable_ttl.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GuardConfig::default();
        assert_eq!(config.disable_ttl, Duration::from_secs(172_800));
        assert_eq!(config.trip_threshold, 5);
        assert_eq!(config.direct_failure_threshold, 20);
        assert_eq!(config.recovery_policy, RecoveryPolicy::HardReset);
        assert!(!config.extend_trip_on_failure);
    }

    #[test]
    fn test_config_builder() {
        let config = GuardConfig::new()
            .with_disable_ttl(Duration::from_secs(3600))
            .with_trip_threshold(10)
            .with_direct_failure_threshold(5)
            .with_recovery_policy(RecoveryPolicy::SingleProbe)
            .with_extend_trip_on_failure(true);
        assert_eq!(config.disable_ttl, Duration::from_secs(3600));
        assert_eq!(config.trip_threshold, 10);
        assert_eq!(config.direct_failure_threshold, 5);
        assert_eq!(config.recovery_policy, RecoveryPolicy::SingleProbe);
        assert!(config.extend_trip_on_failure);
    }

    #[test]
    fn test_disable_ttl_millis() {
        let config = GuardConfig::new().with_disable_ttl(Duration::from_secs(2));
        assert_eq!(config.disable_ttl_millis(), 2_000);
    }
}
