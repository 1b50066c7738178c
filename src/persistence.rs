//! Persisted breaker/registry state and the storage seam.
//!
//! The subsystem snapshots its state at shutdown and restores it at
//! startup. Storage mechanics live behind [`StateStore`]; this crate ships
//! an in-memory store for tests and a null store for deployments that do
//! not persist. A pristine snapshot clears any previously stored record
//! instead of writing an empty one, and any read or parse failure degrades
//! to pristine in-memory state rather than aborting startup.

use crate::candidate::HealthKey;
use crate::clock::EpochMillis;
use crate::error::ErrorContext;
use crate::health::ErrorRecord;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Wire form of the subsystem state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// When the global breaker tripped, if it is currently tripped.
    pub tripped_at: Option<EpochMillis>,
    /// Failures accumulated on the direct fallback path.
    pub direct_failure_count: u32,
    /// Failure records keyed by candidate identity.
    pub errors: Vec<(HealthKey, ErrorRecord)>,
}

impl PersistedState {
    /// Pristine state carries no information worth storing.
    pub fn is_pristine(&self) -> bool {
        self.tripped_at.is_none() && self.direct_failure_count == 0 && self.errors.is_empty()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Storage boundary for [`PersistedState`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// `Ok(None)` means no stored state (pristine start).
    async fn load(&self) -> Result<Option<PersistedState>>;
    async fn store(&self, state: &PersistedState) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// In-memory store. Keeps the serialized wire form so tests exercise the
/// real encoding, including corrupt payloads.
pub struct MemoryStateStore {
    bytes: Arc<RwLock<Option<Vec<u8>>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            bytes: Arc::new(RwLock::new(None)),
        }
    }

    /// Inject raw stored bytes, bypassing encoding. Test hook for
    /// corruption and legacy-format scenarios.
    pub fn set_raw(&self, bytes: Vec<u8>) {
        *self.bytes.write().unwrap() = Some(bytes);
    }

    pub fn raw(&self) -> Option<Vec<u8>> {
        self.bytes.read().unwrap().clone()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<PersistedState>> {
        match self.bytes.read().unwrap().as_deref() {
            None => Ok(None),
            Some(bytes) => PersistedState::from_json(bytes).map(Some).map_err(|e| {
                Error::persistence_with_context(
                    format!("stored state failed to decode: {}", e),
                    ErrorContext::new().with_source("memory_state_store"),
                )
            }),
        }
    }

    async fn store(&self, state: &PersistedState) -> Result<()> {
        let encoded = state.to_json()?;
        *self.bytes.write().unwrap() = Some(encoded);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.bytes.write().unwrap() = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Store for deployments without persistence: loads nothing, stores nothing.
pub struct NullStateStore;

impl NullStateStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for NullStateStore {
    async fn load(&self) -> Result<Option<PersistedState>> {
        Ok(None)
    }

    async fn store(&self, _state: &PersistedState) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
