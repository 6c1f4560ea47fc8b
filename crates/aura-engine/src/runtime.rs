//! Per-automation runtime state and the trigger combinator
//!
//! An [`AutomationRuntime`] pairs a loaded automation with one latch per
//! trigger. Runtime state is created when the automation is loaded or
//! enabled and destroyed (or rebuilt fresh) when it is edited, disabled,
//! or deleted. Editing one automation never disturbs another's latches.

use aura_automation::{Automation, TriggerLogic};
use aura_core::Event;
use tracing::{debug, trace};

use crate::trigger_eval::{match_event, SolarTable, TriggerLatch};

/// An automation plus its engine-owned latch state.
#[derive(Debug)]
pub struct AutomationRuntime {
    automation: Automation,
    latches: Vec<TriggerLatch>,
    /// Previous conjunction state, for AND edge detection.
    all_armed: bool,
}

impl AutomationRuntime {
    /// Load an automation with fresh (disarmed) latches.
    pub fn new(automation: Automation) -> Self {
        let latches = vec![TriggerLatch::new(); automation.triggers.len()];
        Self {
            automation,
            latches,
            all_armed: false,
        }
    }

    pub fn automation(&self) -> &Automation {
        &self.automation
    }

    /// One event-processing pass. Returns true when the automation fires.
    ///
    /// Pass order:
    /// 1. recurrence gate: gated-out events are dropped with every latch
    ///    frozen, so returning into the permitted window cannot fire from
    ///    stale latch state
    /// 2. per-trigger edge detection (irrelevant events skip a latch)
    /// 3. the AND/OR combinator over this pass's pulses
    pub fn process(&mut self, event: &Event, solar: &SolarTable) -> bool {
        if !self.automation.enabled {
            return false;
        }

        if let Some(recurrence) = &self.automation.recurrence {
            if !recurrence.permits(event.timestamp.date_naive()) {
                trace!(automation = %self.automation.id, "gated out by recurrence");
                return false;
            }
        }

        let mut pulses = 0usize;
        for (trigger, latch) in self.automation.triggers.iter().zip(self.latches.iter_mut()) {
            if let Some(satisfied) = match_event(trigger, event, solar) {
                if latch.update(satisfied, event.timestamp) {
                    trace!(
                        automation = %self.automation.id,
                        trigger = trigger.kind(),
                        "rising edge"
                    );
                    pulses += 1;
                }
            }
        }

        let fired = match self.automation.logic {
            // Any rising edge this pass fires.
            TriggerLogic::Or => pulses > 0,

            // Only the pass that completes the conjunction fires: all
            // latches armed, at least one of them armed just now. While
            // everything stays armed, no re-fire.
            TriggerLogic::And => {
                let all = self.latches.iter().all(TriggerLatch::armed);
                let completed = all && !self.all_armed && pulses > 0;
                self.all_armed = all;
                completed
            }
        };

        if fired {
            debug!(automation = %self.automation.id, logic = ?self.automation.logic, "automation fired");
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_automation::{
        Action, AutomationDraft, DeviceCommandAction, DeviceStateTrigger, Recurrence,
        RecurrenceKind, RuleStore, SensorThresholdTrigger, Trigger,
    };
    use aura_core::{ActionId, DeviceId, Weekday};
    use chrono::{DateTime, Local, TimeZone};

    fn at_day(day: u32, h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, day, h, m, 0).unwrap()
    }

    fn device(raw: &str) -> DeviceId {
        DeviceId::new(raw).unwrap()
    }

    fn temp_above(device_id: &str, value: f64) -> Trigger {
        Trigger::SensorThreshold(SensorThresholdTrigger {
            device_id: device(device_id),
            metric: "temperature".into(),
            op: aura_automation::CompareOp::Gt,
            value,
        })
    }

    fn door_state(device_id: &str, state: &str) -> Trigger {
        Trigger::DeviceState(DeviceStateTrigger {
            device_id: device(device_id),
            state: state.into(),
        })
    }

    fn draft(triggers: Vec<Trigger>, logic: TriggerLogic) -> AutomationDraft {
        AutomationDraft {
            name: "test".into(),
            enabled: true,
            triggers,
            logic,
            conditions: vec![],
            actions: vec![Action::DeviceCommand(DeviceCommandAction {
                id: ActionId::generate(),
                target: device("light.all"),
                command: "on".into(),
                params: serde_json::Value::Null,
                critical: false,
            })],
            recurrence: None,
        }
    }

    fn runtime_from(draft: AutomationDraft) -> AutomationRuntime {
        let store = RuleStore::new();
        let id = store.create(draft).unwrap();
        AutomationRuntime::new(store.get(&id).unwrap())
    }

    fn build(triggers: Vec<Trigger>, logic: TriggerLogic) -> AutomationRuntime {
        runtime_from(draft(triggers, logic))
    }

    fn reading(device_id: &str, value: f64, ts: DateTime<Local>) -> Event {
        Event::sensor_reading(device(device_id), "temperature", value, ts)
    }

    #[test]
    fn test_or_fires_on_any_rising_edge() {
        let mut runtime = build(
            vec![temp_above("sensor.a", 25.0), temp_above("sensor.b", 25.0)],
            TriggerLogic::Or,
        );
        let ts = at_day(2, 9, 0);

        assert!(runtime.process(&reading("sensor.a", 26.0, ts), &SolarTable::new()));
        // Repeated satisfaction while armed: no re-fire.
        assert!(!runtime.process(&reading("sensor.a", 27.0, ts), &SolarTable::new()));
        // The other trigger's edge fires independently.
        assert!(runtime.process(&reading("sensor.b", 30.0, ts), &SolarTable::new()));
    }

    #[test]
    fn test_or_rearms_after_reset() {
        let mut runtime = build(vec![temp_above("sensor.a", 25.0)], TriggerLogic::Or);
        let ts = at_day(2, 9, 0);
        let solar = SolarTable::new();

        assert!(runtime.process(&reading("sensor.a", 26.0, ts), &solar));
        assert!(!runtime.process(&reading("sensor.a", 20.0, ts), &solar));
        assert!(runtime.process(&reading("sensor.a", 26.0, ts), &solar));
    }

    #[test]
    fn test_and_fires_when_conjunction_completes() {
        let mut runtime = build(
            vec![temp_above("sensor.a", 25.0), door_state("door.front", "open")],
            TriggerLogic::And,
        );
        let ts = at_day(2, 9, 0);
        let solar = SolarTable::new();

        // First trigger arms: no fire yet.
        assert!(!runtime.process(&reading("sensor.a", 26.0, ts), &solar));
        // Second trigger completes the conjunction: fire.
        assert!(runtime.process(
            &Event::device_state(device("door.front"), "open", ts),
            &solar
        ));
        // Both stay armed: no re-fire.
        assert!(!runtime.process(&reading("sensor.a", 27.0, ts), &solar));
    }

    #[test]
    fn test_and_refires_only_after_dearm_and_full_rearm() {
        let mut runtime = build(
            vec![temp_above("sensor.a", 25.0), door_state("door.front", "open")],
            TriggerLogic::And,
        );
        let ts = at_day(2, 9, 0);
        let solar = SolarTable::new();

        assert!(!runtime.process(&reading("sensor.a", 26.0, ts), &solar));
        assert!(runtime.process(
            &Event::device_state(device("door.front"), "open", ts),
            &solar
        ));

        // Temperature de-arms...
        assert!(!runtime.process(&reading("sensor.a", 20.0, ts), &solar));
        // ...and re-arms alone, completing the conjunction again: fire.
        assert!(runtime.process(&reading("sensor.a", 26.0, ts), &solar));
    }

    #[test]
    fn test_irrelevant_events_do_not_reset_latches() {
        let mut runtime = build(
            vec![temp_above("sensor.a", 25.0), door_state("door.front", "open")],
            TriggerLogic::And,
        );
        let ts = at_day(2, 9, 0);
        let solar = SolarTable::new();

        assert!(!runtime.process(&reading("sensor.a", 26.0, ts), &solar));
        // Noise from a third device changes nothing.
        assert!(!runtime.process(&reading("sensor.noise", 99.0, ts), &solar));
        // The armed temperature trigger is still armed; the door completes.
        assert!(runtime.process(
            &Event::device_state(device("door.front"), "open", ts),
            &solar
        ));
    }

    #[test]
    fn test_recurrence_gate_freezes_latches() {
        let mut definition = draft(vec![temp_above("sensor.a", 25.0)], TriggerLogic::Or);
        definition.recurrence = Some(Recurrence {
            enabled: true,
            kind: RecurrenceKind::Weekly,
            weekdays: [Weekday::Mon, Weekday::Wed].into_iter().collect(),
        });
        let mut runtime = runtime_from(definition);
        let solar = SolarTable::new();

        // Monday: permitted, arms and fires.
        assert!(runtime.process(&reading("sensor.a", 26.0, at_day(2, 9, 0)), &solar));

        // Tuesday: gated out. A falling then rising sample is ignored;
        // the latch stays armed from Monday.
        assert!(!runtime.process(&reading("sensor.a", 20.0, at_day(3, 9, 0)), &solar));
        assert!(!runtime.process(&reading("sensor.a", 30.0, at_day(3, 10, 0)), &solar));

        // Wednesday: permitted again; still armed, so no spurious fire.
        assert!(!runtime.process(&reading("sensor.a", 30.0, at_day(4, 9, 0)), &solar));
        // After a real reset it fires again.
        assert!(!runtime.process(&reading("sensor.a", 20.0, at_day(4, 10, 0)), &solar));
        assert!(runtime.process(&reading("sensor.a", 30.0, at_day(4, 11, 0)), &solar));
    }

    #[test]
    fn test_disabled_runtime_never_fires() {
        let mut definition = draft(vec![temp_above("sensor.a", 25.0)], TriggerLogic::Or);
        definition.enabled = false;
        let mut runtime = runtime_from(definition);

        assert!(!runtime.process(&reading("sensor.a", 30.0, at_day(2, 9, 0)), &SolarTable::new()));
    }
}
