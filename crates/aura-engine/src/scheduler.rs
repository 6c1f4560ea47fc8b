//! Per-automation concurrency guard
//!
//! A non-blocking try-lock keyed by automation id. A fire that arrives
//! while a chain for the same automation is in flight is dropped and
//! audited as suppressed. This is a discard policy, not a queue, so bursty
//! sensors cannot build an unbounded backlog.

use std::sync::Arc;

use aura_core::AutomationId;
use dashmap::DashMap;
use tracing::trace;

/// The set of automations with a chain currently in flight.
///
/// This is the only mutable state shared between the event loop and the
/// execution tasks.
#[derive(Clone, Default)]
pub struct InFlightSet {
    inner: Arc<DashMap<AutomationId, ()>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to claim the automation's execution slot.
    ///
    /// Returns `None` when a chain is already in flight. The returned
    /// claim releases the slot when dropped, i.e. the instant the chain
    /// task terminates.
    pub fn try_claim(&self, id: &AutomationId) -> Option<InFlightClaim> {
        match self.inner.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                trace!(automation = %id, "claimed execution slot");
                Some(InFlightClaim {
                    set: Arc::clone(&self.inner),
                    id: id.clone(),
                })
            }
        }
    }

    /// Whether a chain is currently in flight for this automation.
    pub fn is_in_flight(&self, id: &AutomationId) -> bool {
        self.inner.contains_key(id)
    }

    /// Number of chains currently in flight.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// RAII handle on an execution slot.
pub struct InFlightClaim {
    set: Arc<DashMap<AutomationId, ()>>,
    id: AutomationId,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        trace!(automation = %self.id, "released execution slot");
        self.set.remove(&self.id);
    }
}
