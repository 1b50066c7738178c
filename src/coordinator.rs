//! Per-request decision flow.
//!
//! The coordinator owns the shared health state behind one coarse lock and
//! turns each incoming chain into a routing decision: consult the global
//! breaker, prune against the registry, and hand the result to the
//! consumer. Outcome reports arrive later, on whatever task the transport
//! runs on, and feed the same state through the same lock.
//!
//! Two contracts are unconditional:
//! - the decision consumer is invoked exactly once per request, on every
//!   exit path including a panic while computing;
//! - outcome reports are honored at most once per request, and only until
//!   the first terminal outcome.

use crate::candidate::{Candidate, ConfigSource, Endpoint, RequestId};
use crate::chain::{self, PrunedChain};
use crate::clock::Clock;
use crate::config::{GuardConfig, RecoveryPolicy};
use crate::events::{EventMethod, EventObject, EventSink, GuardEvent};
use crate::health::{BreakerVerdict, DirectFailureCounter, GlobalBreaker, HealthRegistry};
use crate::persistence::PersistedState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// One request's input: its default chain and where that chain came from.
#[derive(Debug)]
pub struct ChainRequest {
    pub id: RequestId,
    pub chain: Candidate,
    pub source: ConfigSource,
}

impl ChainRequest {
    pub fn new(chain: Candidate, source: ConfigSource) -> Self {
        Self {
            id: RequestId::new(),
            chain,
            source,
        }
    }
}

/// The result delivered to the decision consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Use this chain; it has at least one candidate and ends in direct.
    Chain(Candidate),
    /// Bypass proxies entirely; connect direct with no chain.
    DirectOnly,
}

/// Receives exactly one decision per request.
pub trait DecisionConsumer: Send + Sync {
    fn deliver(&self, request: RequestId, decision: RouteDecision);
}

/// Terminal outcome reported by the transport for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Transport-level error using the candidate in effect.
    Failure,
    /// The request completed with this status code.
    Completed(u16),
}

impl Outcome {
    /// Statuses in [200, 400) qualify as success. Anything else is neither
    /// success nor failure for health purposes.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed(status) if (200..400).contains(status))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    Idle,
    /// The next request runs its original chain un-pruned.
    Armed,
    /// The probe request is in flight; its outcome decides the reset.
    InFlight(RequestId),
}

struct Subscription {
    source: ConfigSource,
}

struct Shared {
    registry: HealthRegistry,
    breaker: GlobalBreaker,
    direct: DirectFailureCounter,
    probe: ProbeState,
    subscriptions: HashMap<RequestId, Subscription>,
}

impl Shared {
    /// Whole-subsystem reset: registry, breaker, counter and probe state.
    fn reset_all(&mut self) {
        self.registry.clear();
        self.breaker.clear();
        self.direct.clear();
        self.probe = ProbeState::Idle;
    }
}

/// Process-wide decision coordinator. One instance owns all mutable health
/// state for the subsystem's lifetime; inject it into the request path
/// rather than reaching for globals.
pub struct FailoverCoordinator {
    config: GuardConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    shared: Mutex<Shared>,
}

impl FailoverCoordinator {
    pub fn new(config: GuardConfig, clock: Arc<dyn Clock>, sink: Arc<dyn EventSink>) -> Self {
        let ttl_ms = config.disable_ttl_millis();
        let shared = Shared {
            registry: HealthRegistry::new(ttl_ms),
            breaker: GlobalBreaker::new(
                ttl_ms,
                config.trip_threshold,
                config.extend_trip_on_failure,
            ),
            direct: DirectFailureCounter::new(config.direct_failure_threshold),
            probe: ProbeState::Idle,
            subscriptions: HashMap::new(),
        };
        Self {
            config,
            clock,
            sink,
            shared: Mutex::new(shared),
        }
    }

    /// A panic while holding the lock must not take the subsystem down
    /// with it; decisions are still owed to every later request.
    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decide the route for `request` and deliver it to `consumer`.
    ///
    /// The consumer is invoked exactly once whatever happens; if the
    /// computation panics, a direct-only decision is delivered during
    /// unwind.
    pub fn decide(&self, request: ChainRequest, consumer: &dyn DecisionConsumer) {
        let id = request.id;
        let guard = DeliveryGuard::new(id, consumer);
        let (decision, events) = self.compute(request);
        guard.deliver(decision);
        self.emit_all(&events);
    }

    fn compute(&self, request: ChainRequest) -> (RouteDecision, Vec<GuardEvent>) {
        let now = self.clock.now_millis();
        let mut events = Vec::new();
        let mut shared = self.lock_shared();

        // The outcome subscription spans the request from decision to first
        // terminal outcome, whichever branch produces the decision.
        shared.subscriptions.insert(
            request.id,
            Subscription {
                source: request.source.clone(),
            },
        );

        match shared.breaker.too_many_failures(now) {
            BreakerVerdict::Tripped => {
                tracing::debug!(id = %request.id, "bypassed: global breaker tripped");
                return (RouteDecision::DirectOnly, events);
            }
            BreakerVerdict::RecoveredNow => {
                shared.reset_all();
                events.push(GuardEvent::new(
                    EventMethod::Timeout,
                    EventObject::ProxyBypass,
                    request.source.clone(),
                ));
            }
            BreakerVerdict::Clear => {}
        }

        if shared.probe == ProbeState::Armed {
            shared.probe = ProbeState::InFlight(request.id);
            let chain = if request.chain.ends_in_direct() {
                request.chain
            } else {
                request.chain.then(Candidate::direct())
            };
            tracing::info!(id = %request.id, chain = %chain, "probing original chain");
            return (RouteDecision::Chain(chain), events);
        }

        let outcome = chain::prune(request.chain, &mut shared.registry, now);
        for key in &outcome.reenabled {
            tracing::debug!(key = %key, "candidate re-enabled by expiry");
            events.push(GuardEvent::new(
                EventMethod::Enabled,
                EventObject::ProxyInfo,
                request.source.clone(),
            ));
        }

        match outcome.chain {
            PrunedChain::Routed(chain) => {
                tracing::debug!(id = %request.id, chain = %chain, "pruned chain selected");
                (RouteDecision::Chain(chain), events)
            }
            PrunedChain::NoRoute => {
                tracing::debug!(id = %request.id, "bypassed: no usable candidate");
                (RouteDecision::DirectOnly, events)
            }
        }
    }

    /// Feed a terminal (or non-terminal) outcome back into health state.
    ///
    /// `used` is the candidate endpoint in effect when the outcome was
    /// observed. Reports for unknown or already-terminated requests are
    /// ignored.
    pub fn report_outcome(&self, id: RequestId, used: &Endpoint, outcome: Outcome) {
        let mut events = Vec::new();
        {
            let now = self.clock.now_millis();
            let mut shared = self.lock_shared();
            let source = match shared.subscriptions.get(&id) {
                Some(sub) => sub.source.clone(),
                None => {
                    tracing::debug!(id = %id, "outcome for unknown or settled request ignored");
                    return;
                }
            };

            match outcome {
                Outcome::Failure => {
                    shared.subscriptions.remove(&id);
                    self.on_failure(&mut shared, id, used, &source, now, &mut events);
                }
                Outcome::Completed(_) if outcome.is_success() => {
                    shared.subscriptions.remove(&id);
                    self.on_success(&mut shared, id, used, &source, &mut events);
                }
                Outcome::Completed(status) => {
                    // Not a success, not a transport failure: the candidate
                    // reached a server. Health state is untouched and the
                    // subscription stays open for a terminal outcome.
                    tracing::debug!(id = %id, status, "non-qualifying completion");
                }
            }
        }
        self.emit_all(&events);
    }

    fn on_failure(
        &self,
        shared: &mut Shared,
        id: RequestId,
        used: &Endpoint,
        source: &ConfigSource,
        now: u64,
        events: &mut Vec<GuardEvent>,
    ) {
        // A failed probe reverts to suppression: the disablement stands,
        // and another full run of direct failures is required before the
        // next probe.
        if shared.probe == ProbeState::InFlight(id) {
            tracing::info!(id = %id, "probe failed, keeping proxies suppressed");
            shared.probe = ProbeState::Idle;
            shared.direct.clear();
        }

        match used.health_key() {
            Some(key) => {
                let failures = shared.registry.mark_failed(&key, now);
                if failures == 1 {
                    events.push(GuardEvent::new(
                        EventMethod::Disabled,
                        EventObject::ProxyInfo,
                        source.clone(),
                    ));
                }
                let live = shared.registry.active_len(now);
                if shared.breaker.note_failure(live, now) {
                    events.push(GuardEvent::new(
                        EventMethod::Start,
                        EventObject::ProxyBypass,
                        source.clone(),
                    ));
                }
            }
            None => {
                shared.direct.record_direct_failure();
                let registry_live = shared.registry.active_len(now) > 0;
                if shared.direct.should_probe_proxies_again(registry_live) {
                    match self.config.recovery_policy {
                        RecoveryPolicy::HardReset => {
                            tracing::warn!(
                                "direct fallback keeps failing, resetting proxy disablement"
                            );
                            shared.reset_all();
                            events.push(GuardEvent::new(
                                EventMethod::Timeout,
                                EventObject::ProxyBypass,
                                source.clone(),
                            ));
                        }
                        RecoveryPolicy::SingleProbe => {
                            if shared.probe == ProbeState::Idle {
                                tracing::info!("arming one-shot probe of the original chain");
                                shared.probe = ProbeState::Armed;
                            }
                        }
                    }
                }
            }
        }
    }

    fn on_success(
        &self,
        shared: &mut Shared,
        id: RequestId,
        used: &Endpoint,
        source: &ConfigSource,
        events: &mut Vec<GuardEvent>,
    ) {
        if let Some(key) = used.health_key() {
            if shared.registry.mark_succeeded(&key) {
                events.push(GuardEvent::new(
                    EventMethod::Enabled,
                    EventObject::ProxyInfo,
                    source.clone(),
                ));
            }
        }
        shared.direct.record_any_success();

        if shared.probe == ProbeState::InFlight(id) {
            if used.health_key().is_some() {
                // The probe went through a proxy that was supposed to be
                // broken: the disablement was a false positive.
                tracing::info!(id = %id, "probe succeeded through a proxy, resetting disablement");
                shared.reset_all();
                events.push(GuardEvent::new(
                    EventMethod::Timeout,
                    EventObject::ProxyBypass,
                    source.clone(),
                ));
            } else {
                // The probe only got through on its direct tail; that
                // proves nothing about the proxies.
                shared.probe = ProbeState::Idle;
            }
        }
    }

    /// Capture current breaker/counter/registry state for persistence.
    pub fn snapshot(&self) -> PersistedState {
        let shared = self.lock_shared();
        PersistedState {
            tripped_at: shared.breaker.tripped_at(),
            direct_failure_count: shared.direct.count(),
            errors: shared.registry.snapshot_entries(),
        }
    }

    /// Seed state from a persisted snapshot. Intended for startup, before
    /// requests flow.
    pub fn restore(&self, state: PersistedState) {
        let mut shared = self.lock_shared();
        shared.breaker.restore(state.tripped_at);
        shared.direct.restore(state.direct_failure_count);
        shared.registry.restore_entries(state.errors);
    }

    /// Drop all health state, returning to pristine.
    pub fn clear(&self) {
        let mut shared = self.lock_shared();
        shared.reset_all();
        shared.subscriptions.clear();
    }

    fn emit_all(&self, events: &[GuardEvent]) {
        for event in events {
            if let Err(err) = self.sink.emit(event) {
                tracing::debug!(error = %err, "event sink failure ignored");
            }
        }
    }
}

/// Guarantees exactly one delivery to the consumer. If the decision
/// computation unwinds, the drop handler falls back to direct-only, the
/// one result that is always safe to hand out.
struct DeliveryGuard<'a> {
    id: RequestId,
    consumer: &'a dyn DecisionConsumer,
    delivered: bool,
}

impl<'a> DeliveryGuard<'a> {
    fn new(id: RequestId, consumer: &'a dyn DecisionConsumer) -> Self {
        Self {
            id,
            consumer,
            delivered: false,
        }
    }

    fn deliver(mut self, decision: RouteDecision) {
        self.delivered = true;
        self.consumer.deliver(self.id, decision);
    }
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if !self.delivered {
            self.consumer.deliver(self.id, RouteDecision::DirectOnly);
        }
    }
}
