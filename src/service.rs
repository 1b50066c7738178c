//! Subsystem lifecycle.
//!
//! The activation gate (configuration plus whether any privileged caller
//! currently needs monitoring) starts and stops the subsystem from the
//! outside. Starting restores persisted health state; stopping snapshots
//! it back out, clearing the stored record instead when the state is
//! pristine. In between, the guard is just a handle to the coordinator.

use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;
use crate::coordinator::FailoverCoordinator;
use crate::events::{EventSink, NoopEventSink};
use crate::persistence::StateStore;
use crate::Result;
use std::sync::Arc;

/// Running instance of the failover subsystem.
pub struct EgressGuard {
    coordinator: Arc<FailoverCoordinator>,
    store: Arc<dyn StateStore>,
}

/// Builder for [`EgressGuard`], with system defaults for every collaborator.
pub struct EgressGuardBuilder {
    config: GuardConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    store: Arc<dyn StateStore>,
}

impl EgressGuardBuilder {
    pub fn new() -> Self {
        Self {
            config: GuardConfig::default(),
            clock: Arc::new(SystemClock),
            sink: Arc::new(NoopEventSink),
            store: Arc::new(crate::persistence::NullStateStore),
        }
    }

    pub fn with_config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    /// Start the subsystem, restoring persisted state. A missing or
    /// unreadable snapshot degrades to a pristine start.
    pub async fn start(self) -> Result<EgressGuard> {
        let coordinator = Arc::new(FailoverCoordinator::new(
            self.config,
            self.clock,
            self.sink,
        ));

        match self.store.load().await {
            Ok(Some(state)) => {
                tracing::info!(
                    store = self.store.name(),
                    errors = state.errors.len(),
                    tripped = state.tripped_at.is_some(),
                    "restored persisted failover state"
                );
                coordinator.restore(state);
            }
            Ok(None) => {
                tracing::debug!(store = self.store.name(), "no persisted state, pristine start");
            }
            Err(err) => {
                tracing::warn!(
                    store = self.store.name(),
                    error = %err,
                    "persisted state unreadable, starting pristine"
                );
            }
        }

        Ok(EgressGuard {
            coordinator,
            store: self.store,
        })
    }
}

impl Default for EgressGuardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EgressGuard {
    pub fn builder() -> EgressGuardBuilder {
        EgressGuardBuilder::new()
    }

    /// The decision coordinator, for the request-handling path.
    pub fn coordinator(&self) -> &Arc<FailoverCoordinator> {
        &self.coordinator
    }

    /// Stop the subsystem: persist current state (or clear the stored
    /// record if pristine), then drop in-memory state.
    pub async fn shutdown(self) -> Result<()> {
        let snapshot = self.coordinator.snapshot();
        if snapshot.is_pristine() {
            tracing::debug!(store = self.store.name(), "pristine state, clearing stored record");
            self.store.clear().await?;
        } else {
            tracing::info!(
                store = self.store.name(),
                errors = snapshot.errors.len(),
                "persisting failover state"
            );
            self.store.store(&snapshot).await?;
        }
        self.coordinator.clear();
        Ok(())
    }
}
