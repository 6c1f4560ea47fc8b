//! Event fan-out for the Aura automation engine
//!
//! The [`EventBus`] is the single entry point for inbound signals: adapters
//! normalize their payloads into [`Event`]s and publish them here; the
//! engine (and any other subscriber) receives an independent copy of every
//! event. Delivery is at-least-once (subscribers that lag behind the
//! channel capacity observe a `Lagged` error and continue), and the
//! engine's edge detection absorbs duplicates.
//!
//! Two drivers feed the bus besides the adapters:
//!
//! - [`clock::ClockDriver`] publishes a wall-clock tick at a configurable
//!   sub-second interval
//! - [`solar::SolarDriver`] computes sunrise/sunset once per day and
//!   publishes the schedule as solar events

pub mod clock;
pub mod solar;

use std::sync::Arc;

use aura_core::Event;
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity for event subscriptions.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The event bus for publishing and subscribing to normalized events.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the given channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: Event) {
        trace!(source = ?event.source, "publishing event");
        // Send errors just mean there are no active receivers
        let _ = self.sender.send(event);
    }

    /// Subscribe to the event stream.
    ///
    /// Each receiver gets an independent copy of every event published
    /// after the subscription was created.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle to a shared event bus.
pub type SharedEventBus = Arc<EventBus>;
