//! Last-known device state for the Aura automation engine
//!
//! The [`StateStore`] tracks the most recent discrete state and numeric
//! metric readings per device, fed from the normalized event stream. The
//! condition evaluator reads it as the "current world snapshot" at fire
//! time; it is never consulted for trigger edge detection, which is driven
//! purely by events.

use std::collections::HashMap;

use aura_core::{DeviceId, Event, EventSource};
use chrono::{DateTime, Local};
use dashmap::DashMap;
use tracing::trace;

/// Everything currently known about one device.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    /// Most recent discrete state, if any has been reported.
    pub state: Option<String>,

    /// Most recent reading per metric.
    pub metrics: HashMap<String, f64>,

    /// Timestamp of the last event that touched this device.
    pub last_seen: Option<DateTime<Local>>,
}

/// Tracks last-known state for all devices.
pub struct StateStore {
    devices: DashMap<DeviceId, DeviceSnapshot>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
        }
    }

    /// Fold an event into the snapshot.
    ///
    /// Only sensor readings and device state changes carry world state;
    /// every other event family is ignored.
    pub fn apply(&self, event: &Event) {
        let device_id = match (&event.source, &event.device_id) {
            (EventSource::SensorReading | EventSource::DeviceState, Some(id)) => id,
            _ => return,
        };

        let mut snapshot = self.devices.entry(device_id.clone()).or_default();
        snapshot.last_seen = Some(event.timestamp);

        match event.source {
            EventSource::SensorReading => {
                if let (Some(metric), Some(value)) = (&event.metric, event.value) {
                    trace!(device = %device_id, metric = %metric, value, "recording metric");
                    snapshot.metrics.insert(metric.clone(), value);
                }
            }
            EventSource::DeviceState => {
                if let Some(state) = &event.state {
                    trace!(device = %device_id, state = %state, "recording state");
                    snapshot.state = Some(state.clone());
                }
            }
            _ => {}
        }
    }

    /// Current discrete state of a device, if known.
    pub fn state_of(&self, device_id: &DeviceId) -> Option<String> {
        self.devices.get(device_id).and_then(|s| s.state.clone())
    }

    /// Whether a device is known to be in a specific state.
    pub fn is_state(&self, device_id: &DeviceId, state: &str) -> bool {
        self.state_of(device_id).as_deref() == Some(state)
    }

    /// Latest reading of one metric, if known.
    pub fn metric(&self, device_id: &DeviceId, metric: &str) -> Option<f64> {
        self.devices
            .get(device_id)
            .and_then(|s| s.metrics.get(metric).copied())
    }

    /// Clone out the full snapshot for a device.
    pub fn snapshot(&self, device_id: &DeviceId) -> Option<DeviceSnapshot> {
        self.devices.get(device_id).map(|s| s.clone())
    }

    /// Number of devices with any recorded state.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn device(raw: &str) -> DeviceId {
        DeviceId::new(raw).unwrap()
    }

    #[test]
    fn test_device_state_is_recorded() {
        let store = StateStore::new();
        store.apply(&Event::device_state(device("light.hall"), "on", ts()));

        assert!(store.is_state(&device("light.hall"), "on"));
        assert!(!store.is_state(&device("light.hall"), "off"));
    }

    #[test]
    fn test_latest_state_wins() {
        let store = StateStore::new();
        store.apply(&Event::device_state(device("lock.front"), "locked", ts()));
        store.apply(&Event::device_state(device("lock.front"), "unlocked", ts()));

        assert_eq!(store.state_of(&device("lock.front")).as_deref(), Some("unlocked"));
    }

    #[test]
    fn test_metrics_accumulate_per_name() {
        let store = StateStore::new();
        let id = device("sensor.multi");
        store.apply(&Event::sensor_reading(id.clone(), "temperature", 21.0, ts()));
        store.apply(&Event::sensor_reading(id.clone(), "humidity", 40.0, ts()));
        store.apply(&Event::sensor_reading(id.clone(), "temperature", 22.5, ts()));

        assert_eq!(store.metric(&id, "temperature"), Some(22.5));
        assert_eq!(store.metric(&id, "humidity"), Some(40.0));
        assert_eq!(store.metric(&id, "pressure"), None);
    }

    #[test]
    fn test_sensor_reading_does_not_touch_state() {
        let store = StateStore::new();
        let id = device("sensor.temp");
        store.apply(&Event::sensor_reading(id.clone(), "temperature", 19.0, ts()));

        assert_eq!(store.state_of(&id), None);
        assert!(store.snapshot(&id).unwrap().last_seen.is_some());
    }

    #[test]
    fn test_clock_ticks_are_ignored() {
        let store = StateStore::new();
        store.apply(&Event::clock_tick(ts()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_unknown_device_reads_as_none() {
        let store = StateStore::new();
        assert_eq!(store.state_of(&device("ghost")), None);
        assert!(!store.is_state(&device("ghost"), "on"));
    }
}
