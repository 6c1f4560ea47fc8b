//! Trigger definitions
//!
//! A trigger ties an automation to an external signal that can transition
//! from unsatisfied to satisfied. Definitions here are pure data; the edge
//! detection that turns satisfaction into firing pulses lives in the
//! engine.

use std::collections::BTreeSet;

use aura_core::{DeviceId, EventKey, SolarKind, Weekday, ZoneId, ZoneTransition};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Comparison operator for sensor thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
}

impl CompareOp {
    /// Apply the operator to a sampled value and the configured threshold.
    pub fn compare(self, sample: f64, threshold: f64) -> bool {
        match self {
            CompareOp::Gt => sample > threshold,
            CompareOp::Lt => sample < threshold,
            CompareOp::Eq => (sample - threshold).abs() < f64::EPSILON,
            CompareOp::Gte => sample >= threshold,
            CompareOp::Lte => sample <= threshold,
        }
    }
}

/// Trigger definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum Trigger {
    /// Fires when the wall clock reaches a time of day.
    Time(TimeTrigger),

    /// Fires at a time of day on selected weekdays.
    Schedule(ScheduleTrigger),

    /// Fires when a sensor reading satisfies a threshold comparison.
    SensorThreshold(SensorThresholdTrigger),

    /// Fires when a device reports a specific state.
    DeviceState(DeviceStateTrigger),

    /// Fires when a device battery drops to or below a percentage.
    BatteryLow(BatteryLowTrigger),

    /// Fires when a device goes offline.
    DeviceOffline(DeviceOfflineTrigger),

    /// Fires when a tracked entity enters or leaves a zone.
    Location(LocationTrigger),

    /// Fires at sunrise or sunset, shifted by an offset.
    SolarEvent(SolarEventTrigger),
}

impl Trigger {
    /// Short name of the trigger kind (matches the serde tag).
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Time(_) => "time",
            Trigger::Schedule(_) => "schedule",
            Trigger::SensorThreshold(_) => "sensor_threshold",
            Trigger::DeviceState(_) => "device_state",
            Trigger::BatteryLow(_) => "battery_low",
            Trigger::DeviceOffline(_) => "device_offline",
            Trigger::Location(_) => "location",
            Trigger::SolarEvent(_) => "solar_event",
        }
    }

    /// The routing key under which events relevant to this trigger arrive.
    pub fn key(&self) -> EventKey {
        match self {
            Trigger::Time(_) | Trigger::Schedule(_) | Trigger::SolarEvent(_) => EventKey::Clock,
            Trigger::SensorThreshold(t) => EventKey::Device(t.device_id.clone()),
            Trigger::DeviceState(t) => EventKey::Device(t.device_id.clone()),
            Trigger::BatteryLow(t) => EventKey::Device(t.device_id.clone()),
            Trigger::DeviceOffline(t) => EventKey::Device(t.device_id.clone()),
            Trigger::Location(t) => EventKey::Zone(t.zone.clone()),
        }
    }
}

/// Time-of-day trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeTrigger {
    /// Wall-clock time to fire at (matched to the minute).
    pub at: NaiveTime,
}

/// Weekly schedule trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTrigger {
    /// Days of week the trigger is active.
    pub days: BTreeSet<Weekday>,

    /// Wall-clock time to fire at on those days.
    pub at: NaiveTime,
}

/// Sensor threshold trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorThresholdTrigger {
    /// Sensor to watch.
    pub device_id: DeviceId,

    /// Metric name within the sensor's readings.
    pub metric: String,

    /// Comparison applied to each reading.
    pub op: CompareOp,

    /// Threshold the reading is compared against.
    pub value: f64,
}

/// Device state trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateTrigger {
    pub device_id: DeviceId,

    /// State that satisfies the trigger.
    pub state: String,
}

/// Battery low trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryLowTrigger {
    pub device_id: DeviceId,

    /// Satisfied while the battery reading is at or below this percentage.
    pub threshold_percent: u8,
}

/// Device offline trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOfflineTrigger {
    pub device_id: DeviceId,
}

/// Zone transition trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationTrigger {
    pub zone: ZoneId,

    /// Which direction of transition fires the trigger.
    pub transition: ZoneTransition,
}

/// Solar event trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarEventTrigger {
    pub kind: SolarKind,

    /// Minutes relative to the solar event; negative is before.
    #[serde(default)]
    pub offset_minutes: i32,
}
