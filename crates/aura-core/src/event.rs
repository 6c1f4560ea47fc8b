//! The normalized event shape
//!
//! Adapters translate their native payloads (sensor readings, device state
//! changes, clock ticks, location transitions, solar-schedule computations)
//! into this single flat shape before publishing. Which optional fields are
//! populated depends on [`EventSource`].

use chrono::{DateTime, Local, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::ids::{DeviceId, ZoneId};

/// Metric name carried by battery-level sensor readings.
pub const METRIC_BATTERY: &str = "battery";

/// Device state reported when a device loses connectivity.
pub const STATE_OFFLINE: &str = "offline";

/// Device state reported when a device regains connectivity.
pub const STATE_ONLINE: &str = "online";

/// Which family of inbound signal produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// A numeric sensor reading (temperature, humidity, battery, ...).
    SensorReading,

    /// A device reported a new discrete state.
    DeviceState,

    /// The periodic clock tick.
    ClockTick,

    /// A tracked entity entered or left a zone.
    LocationTransition,

    /// The daily solar-schedule computation.
    Solar,
}

/// Direction of a zone transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneTransition {
    Enter,
    Leave,
}

impl ZoneTransition {
    /// The state-field encoding of this transition.
    pub fn as_str(self) -> &'static str {
        match self {
            ZoneTransition::Enter => "enter",
            ZoneTransition::Leave => "leave",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "enter" => Some(ZoneTransition::Enter),
            "leave" => Some(ZoneTransition::Leave),
            _ => None,
        }
    }
}

/// Solar event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolarKind {
    Sunrise,
    Sunset,
}

impl SolarKind {
    /// The state-field encoding of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            SolarKind::Sunrise => "sunrise",
            SolarKind::Sunset => "sunset",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "sunrise" => Some(SolarKind::Sunrise),
            "sunset" => Some(SolarKind::Sunset),
            _ => None,
        }
    }
}

/// A normalized inbound signal.
///
/// The `timestamp` is the wall clock that drives all time-based evaluation;
/// the engine never consults the system clock during a processing pass, so
/// replaying an event stream reproduces behavior exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub source: EventSource,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<ZoneId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    pub timestamp: DateTime<Local>,
}

impl Event {
    /// A numeric sensor reading for one metric of one device.
    pub fn sensor_reading(
        device_id: DeviceId,
        metric: impl Into<String>,
        value: f64,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            source: EventSource::SensorReading,
            device_id: Some(device_id),
            zone: None,
            metric: Some(metric.into()),
            value: Some(value),
            state: None,
            timestamp,
        }
    }

    /// A discrete device state change (including `online`/`offline`).
    pub fn device_state(
        device_id: DeviceId,
        state: impl Into<String>,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            source: EventSource::DeviceState,
            device_id: Some(device_id),
            zone: None,
            metric: None,
            value: None,
            state: Some(state.into()),
            timestamp,
        }
    }

    /// A periodic clock tick.
    pub fn clock_tick(timestamp: DateTime<Local>) -> Self {
        Self {
            source: EventSource::ClockTick,
            device_id: None,
            zone: None,
            metric: None,
            value: None,
            state: None,
            timestamp,
        }
    }

    /// A tracked entity entering or leaving a zone.
    pub fn location(zone: ZoneId, transition: ZoneTransition, timestamp: DateTime<Local>) -> Self {
        Self {
            source: EventSource::LocationTransition,
            device_id: None,
            zone: Some(zone),
            metric: None,
            value: None,
            state: Some(transition.as_str().to_string()),
            timestamp,
        }
    }

    /// One half of the day's solar schedule: the wall-clock time at which
    /// `kind` occurs today, encoded as minutes since midnight in `value`.
    pub fn solar_schedule(kind: SolarKind, at: NaiveTime, timestamp: DateTime<Local>) -> Self {
        Self {
            source: EventSource::Solar,
            device_id: None,
            zone: None,
            metric: None,
            value: Some(f64::from(at.hour() * 60 + at.minute())),
            state: Some(kind.as_str().to_string()),
            timestamp,
        }
    }

    /// The zone transition carried by a location event, if any.
    pub fn transition(&self) -> Option<ZoneTransition> {
        if self.source != EventSource::LocationTransition {
            return None;
        }
        self.state.as_deref().and_then(ZoneTransition::parse)
    }

    /// The solar kind carried by a solar-schedule event, if any.
    pub fn solar_kind(&self) -> Option<SolarKind> {
        if self.source != EventSource::Solar {
            return None;
        }
        self.state.as_deref().and_then(SolarKind::parse)
    }

    /// The scheduled wall-clock time carried by a solar-schedule event.
    pub fn solar_time(&self) -> Option<NaiveTime> {
        if self.source != EventSource::Solar {
            return None;
        }
        let minutes = self.value? as u32;
        NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
    }

    /// The routing key this event is delivered under.
    pub fn key(&self) -> EventKey {
        match self.source {
            EventSource::SensorReading | EventSource::DeviceState => match &self.device_id {
                Some(id) => EventKey::Device(id.clone()),
                None => EventKey::Clock,
            },
            EventSource::ClockTick => EventKey::Clock,
            EventSource::LocationTransition => match &self.zone {
                Some(zone) => EventKey::Zone(zone.clone()),
                None => EventKey::Clock,
            },
            EventSource::Solar => EventKey::Solar,
        }
    }
}

/// Coarse routing key connecting events to the triggers that care about them.
///
/// The rule store indexes enabled automations under the keys of their
/// triggers so that one lookup resolves the candidates for an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// Events about one device (sensor readings and state changes).
    Device(DeviceId),
    /// Zone transition events for one zone.
    Zone(ZoneId),
    /// Clock ticks; time, schedule, and solar triggers listen here.
    Clock,
    /// Solar-schedule publications.
    Solar,
}
