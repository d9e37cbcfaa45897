//! Radio registry
//!
//! Owns the fixed set of radios, each bound to one adapter and one command
//! lock, plus the cached state of every radio and the active-radio pointer.
//!
//! Membership never changes after construction, so the slot map is read
//! without locking. The cached states and the active pointer sit behind one
//! short-held mutex that is never held across an adapter call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rcc_adapter::{CapabilityInfo, RadioAdapter, RadioId, RadioState};
use serde::Serialize;
use tokio::sync::Mutex as CommandLock;
use tracing::{debug, info};

use crate::error::FleetError;

/// Copy of one radio's registry entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadioDescriptor {
    pub id: RadioId,
    pub adapter_type: String,
    pub description: String,
    pub capabilities: CapabilityInfo,
    pub state: RadioState,
}

/// Handle to one radio's adapter, valid for one dispatch
#[derive(Clone)]
pub struct AdapterHandle {
    id: RadioId,
    adapter: Arc<dyn RadioAdapter>,
    command_lock: Arc<CommandLock<()>>,
}

impl AdapterHandle {
    pub fn id(&self) -> &RadioId {
        &self.id
    }

    pub fn adapter(&self) -> &dyn RadioAdapter {
        self.adapter.as_ref()
    }

    pub(crate) fn shared_adapter(&self) -> Arc<dyn RadioAdapter> {
        Arc::clone(&self.adapter)
    }

    /// Per-radio lock serializing commands; FIFO-fair
    pub(crate) fn command_lock(&self) -> Arc<CommandLock<()>> {
        Arc::clone(&self.command_lock)
    }
}

impl std::fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("id", &self.id)
            .field("adapter_type", &self.adapter.adapter_type())
            .finish()
    }
}

struct Slot {
    description: String,
    adapter: Arc<dyn RadioAdapter>,
    command_lock: Arc<CommandLock<()>>,
}

#[derive(Default)]
struct Shared {
    cached: HashMap<RadioId, RadioState>,
    active: Option<RadioId>,
}

/// The fleet's radios
///
/// Cached states are written only by the orchestrator, after an adapter call
/// has moved the radio through its state machine:
///
/// ```compile_fail
/// use rcc_adapter::{RadioId, RadioState, RadioStatus};
/// use rcc_fleet::RadioRegistry;
///
/// let registry = RadioRegistry::new();
/// let _ = registry.commit_state(&RadioId::new("r1"), RadioState::with_status(RadioStatus::Busy));
/// ```
#[derive(Default)]
pub struct RadioRegistry {
    order: Vec<RadioId>,
    slots: HashMap<RadioId, Slot>,
    shared: Mutex<Shared>,
}

impl RadioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a radio; only possible before the registry is shared
    pub fn register(
        &mut self,
        description: impl Into<String>,
        adapter: Arc<dyn RadioAdapter>,
    ) -> Result<(), FleetError> {
        let id = adapter.id().clone();
        if self.slots.contains_key(&id) {
            return Err(FleetError::RadioExists(id));
        }

        info!("Added radio: {} ({})", id, adapter.adapter_type());
        self.shared
            .get_mut()
            .cached
            .insert(id.clone(), adapter.state());
        self.slots.insert(
            id.clone(),
            Slot {
                description: description.into(),
                adapter,
                command_lock: Arc::new(CommandLock::new(())),
            },
        );
        self.order.push(id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Radio ids in configuration order
    pub fn ids(&self) -> &[RadioId] {
        &self.order
    }

    pub fn contains(&self, id: &RadioId) -> bool {
        self.slots.contains_key(id)
    }

    /// Snapshots of every radio, in configuration order
    pub fn list_radios(&self) -> Vec<RadioDescriptor> {
        let shared = self.shared.lock();
        self.order
            .iter()
            .filter_map(|id| {
                let slot = self.slots.get(id)?;
                Some(RadioDescriptor {
                    id: id.clone(),
                    adapter_type: slot.adapter.adapter_type().to_string(),
                    description: slot.description.clone(),
                    capabilities: slot.adapter.capabilities().clone(),
                    state: shared.cached.get(id).cloned().unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Handle for invoking a radio's adapter outside the registry lock
    pub fn get_adapter(&self, id: &RadioId) -> Result<AdapterHandle, FleetError> {
        let slot = self
            .slots
            .get(id)
            .ok_or_else(|| FleetError::RadioNotFound(id.clone()))?;
        Ok(AdapterHandle {
            id: id.clone(),
            adapter: Arc::clone(&slot.adapter),
            command_lock: Arc::clone(&slot.command_lock),
        })
    }

    /// Cached state of one radio
    pub fn get_state(&self, id: &RadioId) -> Option<RadioState> {
        self.shared.lock().cached.get(id).cloned()
    }

    /// Replace the cached state of one radio, returning the previous one
    pub(crate) fn commit_state(&self, id: &RadioId, state: RadioState) -> Result<RadioState, FleetError> {
        let mut shared = self.shared.lock();
        let cached = shared
            .cached
            .get_mut(id)
            .ok_or_else(|| FleetError::RadioNotFound(id.clone()))?;
        if cached.status != state.status {
            debug!("Radio {} status {} -> {}", id, cached.status, state.status);
        }
        Ok(std::mem::replace(cached, state))
    }

    /// Point the active radio at `id`; false if `id` is not registered
    pub fn set_active_radio(&self, id: &RadioId) -> bool {
        if !self.slots.contains_key(id) {
            return false;
        }
        let mut shared = self.shared.lock();
        if shared.active.as_ref() != Some(id) {
            info!("Active radio: {}", id);
        }
        shared.active = Some(id.clone());
        true
    }

    pub fn active_radio(&self) -> Option<RadioId> {
        self.shared.lock().active.clone()
    }
}
