//! Trigger edge detection
//!
//! Every trigger instance owns a two-state latch. On each relevant event
//! the trigger's satisfaction is sampled and the latch applies the
//! edge-triggered discipline:
//!
//! - unsatisfied → satisfied: arm and emit a rising-edge pulse
//! - satisfied → unsatisfied: silently reset (no pulse)
//! - satisfied while armed: nothing (absorbs re-fire storms from noisy
//!   telemetry; a battery sitting at 15% must not re-notify every tick)
//!
//! Events that are *irrelevant* to a trigger leave its latch untouched:
//! an unrelated device's reading must never reset another trigger's
//! armed state.

use aura_automation::Trigger;
use aura_core::event::{METRIC_BATTERY, STATE_OFFLINE};
use aura_core::{Event, EventSource, SolarKind};
use chrono::{DateTime, Datelike, Local, NaiveTime, Timelike};
use tracing::trace;

/// Latched runtime state for one trigger instance.
///
/// Owned exclusively by the event-processing loop; never serialized with
/// the automation definition.
#[derive(Debug, Clone, Default)]
pub struct TriggerLatch {
    armed: bool,
    last_fired_at: Option<DateTime<Local>>,
}

impl TriggerLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a satisfaction sample. Returns true exactly on the rising edge.
    pub fn update(&mut self, satisfied: bool, at: DateTime<Local>) -> bool {
        match (self.armed, satisfied) {
            (false, true) => {
                self.armed = true;
                self.last_fired_at = Some(at);
                true
            }
            (true, false) => {
                self.armed = false;
                false
            }
            _ => false,
        }
    }

    pub fn armed(&self) -> bool {
        self.armed
    }

    pub fn last_fired_at(&self) -> Option<DateTime<Local>> {
        self.last_fired_at
    }
}

/// Today's solar schedule as observed from solar events.
///
/// Solar triggers are matched against clock ticks using this table plus
/// the per-trigger offset; the schedule events themselves are irrelevant
/// to every latch.
#[derive(Debug, Clone, Default)]
pub struct SolarTable {
    sunrise: Option<NaiveTime>,
    sunset: Option<NaiveTime>,
}

impl SolarTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a solar-schedule event into the table.
    pub fn observe(&mut self, event: &Event) {
        let (Some(kind), Some(at)) = (event.solar_kind(), event.solar_time()) else {
            return;
        };
        trace!(?kind, %at, "observed solar schedule");
        match kind {
            SolarKind::Sunrise => self.sunrise = Some(at),
            SolarKind::Sunset => self.sunset = Some(at),
        }
    }

    /// Today's wall-clock time for a solar event, if known.
    pub fn time_of(&self, kind: SolarKind) -> Option<NaiveTime> {
        match kind {
            SolarKind::Sunrise => self.sunrise,
            SolarKind::Sunset => self.sunset,
        }
    }
}

/// Relevance and satisfaction of a trigger against one event.
///
/// Returns `None` when the event is irrelevant to the trigger (the latch
/// must not be touched), `Some(satisfied)` otherwise.
pub fn match_event(trigger: &Trigger, event: &Event, solar: &SolarTable) -> Option<bool> {
    match trigger {
        Trigger::Time(t) => {
            is_clock_tick(event).then(|| same_minute(event.timestamp.time(), t.at))
        }

        Trigger::Schedule(t) => is_clock_tick(event).then(|| {
            t.days.contains(&event.timestamp.weekday().into())
                && same_minute(event.timestamp.time(), t.at)
        }),

        Trigger::SensorThreshold(t) => {
            if event.source != EventSource::SensorReading
                || event.device_id.as_ref() != Some(&t.device_id)
                || event.metric.as_deref() != Some(t.metric.as_str())
            {
                return None;
            }
            Some(event.value.is_some_and(|v| t.op.compare(v, t.value)))
        }

        Trigger::DeviceState(t) => {
            if event.source != EventSource::DeviceState
                || event.device_id.as_ref() != Some(&t.device_id)
            {
                return None;
            }
            Some(event.state.as_deref() == Some(t.state.as_str()))
        }

        Trigger::BatteryLow(t) => {
            if event.source != EventSource::SensorReading
                || event.device_id.as_ref() != Some(&t.device_id)
                || event.metric.as_deref() != Some(METRIC_BATTERY)
            {
                return None;
            }
            Some(
                event
                    .value
                    .is_some_and(|v| v <= f64::from(t.threshold_percent)),
            )
        }

        Trigger::DeviceOffline(t) => {
            if event.source != EventSource::DeviceState
                || event.device_id.as_ref() != Some(&t.device_id)
            {
                return None;
            }
            Some(event.state.as_deref() == Some(STATE_OFFLINE))
        }

        Trigger::Location(t) => {
            if event.source != EventSource::LocationTransition
                || event.zone.as_ref() != Some(&t.zone)
            {
                return None;
            }
            Some(event.transition() == Some(t.transition))
        }

        Trigger::SolarEvent(t) => {
            if !is_clock_tick(event) {
                return None;
            }
            // Unknown schedule (startup, polar day/night): never satisfied.
            let Some(base) = solar.time_of(t.kind) else {
                return Some(false);
            };
            let target = base
                .overflowing_add_signed(chrono::Duration::minutes(i64::from(t.offset_minutes)))
                .0;
            Some(same_minute(event.timestamp.time(), target))
        }
    }
}

fn is_clock_tick(event: &Event) -> bool {
    event.source == EventSource::ClockTick
}

/// Time triggers are declared to the minute; sub-minute ticks within the
/// matching minute are collapsed into one pulse by the latch.
fn same_minute(t: NaiveTime, target: NaiveTime) -> bool {
    t.hour() == target.hour() && t.minute() == target.minute()
}
