//! # egress-guard
//!
//! Health-tracked egress path selection: decides, for every outgoing
//! privileged request, which chain of proxy candidates (terminating in a
//! direct connection) should carry it, based on the recent success and
//! failure history of each candidate.
//!
//! ## Overview
//!
//! The crate is a multi-level circuit breaker around an ordered failover
//! chain. Individual misbehaving candidates are disabled for a bounded
//! window; when too many candidates fail concurrently a global breaker
//! forces every request to bypass proxies entirely; and if that bypass was
//! itself the wrong call (the direct path keeps failing too), the
//! subsystem self-corrects. All of it runs under concurrent access from
//! many in-flight requests, and a routing decision is always produced.
//!
//! ## Core Guarantees
//!
//! - **A decision per request, always**: the consumer is invoked exactly
//!   once, even if decision computation panics.
//! - **Order preserved**: pruning never reorders surviving candidates.
//! - **Direct last resort**: every routed chain ends in a direct hop, so
//!   failures undetectable before connect can still degrade gracefully.
//! - **Deterministic recovery**: disablement and the global trip expire on
//!   a lazy 48-hour clock; no background timers, testable with an injected
//!   [`Clock`](clock::Clock).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use egress_guard::{
//!     Candidate, ChainRequest, ConfigSource, DecisionConsumer, EgressGuard, ProxyScheme,
//!     RequestId, RouteDecision,
//! };
//!
//! struct Dispatcher;
//!
//! impl DecisionConsumer for Dispatcher {
//!     fn deliver(&self, request: RequestId, decision: RouteDecision) {
//!         // hand the chain (or the direct-only signal) to the transport
//!         let _ = (request, decision);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> egress_guard::Result<()> {
//!     let guard = EgressGuard::builder().start().await?;
//!
//!     let chain = Candidate::proxy(ProxyScheme::Http, "proxy.example", 8080)
//!         .then(Candidate::direct());
//!     let request = ChainRequest::new(chain, ConfigSource::Preferences);
//!     guard.coordinator().decide(request, &Dispatcher);
//!
//!     guard.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`candidate`] | Candidates, chains, health keys |
//! | [`chain`] | Chain pruning against the registry |
//! | [`health`] | Failure registry, global breaker, direct-failure counter |
//! | [`coordinator`] | Per-request decision flow and outcome handling |
//! | [`persistence`] | Persisted state and the storage seam |
//! | [`events`] | Structured state-transition events |
//! | [`service`] | Lifecycle: start/restore, shutdown/snapshot |
//! | [`clock`] | Injectable time source |
//! | [`config`] | Thresholds, TTLs and recovery policy |

pub mod candidate;
pub mod chain;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod health;
pub mod persistence;
pub mod service;

// Re-export main types for convenience
pub use candidate::{Candidate, ConfigSource, Endpoint, HealthKey, ProxyScheme, RequestId};
pub use chain::{prune, PruneOutcome, PrunedChain};
pub use config::{GuardConfig, RecoveryPolicy};
pub use coordinator::{
    ChainRequest, DecisionConsumer, FailoverCoordinator, Outcome, RouteDecision,
};
pub use error::{Error, ErrorContext};
pub use events::{EventMethod, EventObject, EventSink, GuardEvent, NoopEventSink};
pub use persistence::{MemoryStateStore, NullStateStore, PersistedState, StateStore};
pub use service::{EgressGuard, EgressGuardBuilder};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
