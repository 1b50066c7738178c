//! Failure tracking for the direct fallback path.
//!
//! Direct connections have no health key and cannot be disabled, but their
//! failures are still a signal: if requests keep dying on a direct
//! connection while proxies sit disabled in the registry, the disablement
//! itself was probably the false positive.

#[derive(Debug)]
pub struct DirectFailureCounter {
    threshold: u32,
    count: u32,
}

impl DirectFailureCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            count: 0,
        }
    }

    pub fn record_direct_failure(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        tracing::debug!(count = self.count, "failure on direct connection");
        self.count
    }

    /// Any successful request of any kind means the network is reachable.
    pub fn record_any_success(&mut self) {
        self.count = 0;
    }

    /// True when the direct path is failing past the threshold while
    /// candidates are actually disabled. With an empty registry the
    /// failures are just a broken network, not a wrong bypass.
    pub fn should_probe_proxies_again(&self, registry_non_empty: bool) -> bool {
        registry_non_empty && self.count > self.threshold
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }

    pub fn restore(&mut self, count: u32) {
        self.count = count;
    }
}
