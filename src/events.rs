//! Structured state-transition events.
//!
//! The subsystem announces health transitions through an [`EventSink`] with
//! a fixed vocabulary: `{enabled, disabled, start, timeout}` over
//! `{proxyInfo, proxyBypass}`, each carrying the [`ConfigSource`] of the
//! affected configuration. Emission is fire-and-forget: sink errors are
//! swallowed at the call site and never reach the decision path.
//!
//! | Sink | Description |
//! |------|-------------|
//! | [`NoopEventSink`] | Default no-op sink |
//! | [`InMemoryEventSink`] | In-memory sink for testing |
//! | [`CompositeEventSink`] | Multi-destination composite sink |

use crate::candidate::ConfigSource;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventMethod {
    Enabled,
    Disabled,
    Start,
    Timeout,
}

/// What it happened to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventObject {
    ProxyInfo,
    ProxyBypass,
}

/// One state-transition event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardEvent {
    pub method: EventMethod,
    pub object: EventObject,
    pub source: ConfigSource,
}

impl GuardEvent {
    pub fn new(method: EventMethod, object: EventObject, source: ConfigSource) -> Self {
        Self {
            method,
            object,
            source,
        }
    }
}

/// Destination for guard events. Implementations must not block the caller
/// for long; the coordinator emits outside its lock but inside the request
/// path.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &GuardEvent) -> Result<()>;
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &GuardEvent) -> Result<()> {
        Ok(())
    }
}

/// In-memory sink for testing.
pub struct InMemoryEventSink {
    events: Arc<RwLock<Vec<GuardEvent>>>,
    max_events: usize,
}

impl InMemoryEventSink {
    pub fn new(max: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            max_events: max,
        }
    }

    pub fn events(&self) -> Vec<GuardEvent> {
        self.events.read().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEventSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: &GuardEvent) -> Result<()> {
        let mut events = self.events.write().unwrap();
        events.push(event.clone());
        if events.len() > self.max_events {
            events.remove(0);
        }
        Ok(())
    }
}

/// Composite sink for multiple destinations.
#[derive(Default)]
pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for CompositeEventSink {
    fn emit(&self, event: &GuardEvent) -> Result<()> {
        for s in &self.sinks {
            let _ = s.emit(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GuardEvent {
        GuardEvent::new(
            EventMethod::Start,
            EventObject::ProxyBypass,
            ConfigSource::Policy,
        )
    }

    #[test]
    fn test_in_memory_sink_records_events() {
        let sink = InMemoryEventSink::default();
        sink.emit(&sample()).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events()[0], sample());
    }

    #[test]
    fn test_in_memory_sink_caps_events() {
        let sink = InMemoryEventSink::new(2);
        for _ in 0..5 {
            sink.emit(&sample()).unwrap();
        }
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_composite_fans_out() {
        let a = Arc::new(InMemoryEventSink::default());
        let b = Arc::new(InMemoryEventSink::default());
        let composite = CompositeEventSink::new()
            .add_sink(a.clone())
            .add_sink(b.clone());
        composite.emit(&sample()).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_event_serialization_vocabulary() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["method"], "start");
        assert_eq!(json["object"], "proxyBypass");
        assert_eq!(json["source"], "policy");
    }

    #[test]
    fn test_extension_source_serialization() {
        let ev = GuardEvent::new(
            EventMethod::Disabled,
            EventObject::ProxyInfo,
            ConfigSource::Id("ext@example".into()),
        );
        let json = serde_json::to_value(ev).unwrap();
        assert_eq!(json["source"]["id"], "ext@example");
    }
}
