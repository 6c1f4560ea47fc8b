//! End-to-end engine behavior: event in, audit record out.
//!
//! These tests run the full wiring (rule store, event bus, state store,
//! engine loop, chain executor, audit log) against a fake command sink.
//! Virtual time (`start_paused`) makes delay and timeout behavior exact.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use aura_audit::{AuditLog, ExecutionOutcome, ExecutionRecord, StepOutcome, SUPPRESSED_CONDITION_NOT_MET, SUPPRESSED_IN_FLIGHT};
use aura_automation::{
    Action, AutomationDraft, CompareOp, Condition, DelayAction, DeviceCommandAction,
    DeviceStateTrigger, Recurrence, RecurrenceKind, RuleStore, SensorThresholdTrigger,
    TimeTrigger, TimeWindowCondition, Trigger, TriggerLogic,
};
use aura_core::{ActionId, DeviceId, Event, Weekday};
use aura_engine::{AutomationEngine, EngineConfig, EngineHandle};
use aura_event_bus::EventBus;
use aura_executor::{CommandSink, SinkError, StaticSceneCatalog};
use aura_state_store::StateStore;
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use tokio::sync::broadcast;

/// Sink that records every dispatched command.
struct FakeSink {
    commands: Mutex<Vec<String>>,
}

impl FakeSink {
    fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
        }
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandSink for FakeSink {
    async fn send_command(
        &self,
        _target: &DeviceId,
        command: &str,
        _params: &serde_json::Value,
    ) -> Result<(), SinkError> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(())
    }

    async fn notify(&self, _message: &str, _channels: &[String]) -> Result<(), SinkError> {
        Ok(())
    }
}

struct Harness {
    bus: Arc<EventBus>,
    rules: Arc<RuleStore>,
    audit: Arc<AuditLog>,
    sink: Arc<FakeSink>,
    records: broadcast::Receiver<ExecutionRecord>,
    handle: EngineHandle,
}

impl Harness {
    fn start() -> Self {
        // RUST_LOG=aura_engine=trace cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let bus = Arc::new(EventBus::new());
        let rules = Arc::new(RuleStore::new());
        let states = Arc::new(StateStore::new());
        let audit = Arc::new(AuditLog::new());
        let sink = Arc::new(FakeSink::new());
        let scenes = Arc::new(StaticSceneCatalog::new());

        let records = audit.subscribe();
        let engine = AutomationEngine::new(
            rules.clone(),
            states.clone(),
            bus.clone(),
            audit.clone(),
            sink.clone(),
            scenes,
            EngineConfig::default(),
        )
        .unwrap();
        let handle = engine.spawn();

        Self {
            bus,
            rules,
            audit,
            sink,
            records,
            handle,
        }
    }

    async fn next_record(&mut self) -> ExecutionRecord {
        tokio::time::timeout(Duration::from_secs(300), self.records.recv())
            .await
            .expect("timed out waiting for execution record")
            .expect("audit feed closed")
    }

    /// Let the engine drain everything already published.
    async fn settle(&self) {
        for _ in 0..200 {
            tokio::task::yield_now().await;
        }
    }
}

fn monday(h: u32, m: u32, s: u32) -> DateTime<Local> {
    // 2026-03-02 is a Monday
    Local.with_ymd_and_hms(2026, 3, 2, h, m, s).unwrap()
}

fn tuesday(h: u32, m: u32, s: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 3, 3, h, m, s).unwrap()
}

fn device(raw: &str) -> DeviceId {
    DeviceId::new(raw).unwrap()
}

fn light_off_action() -> Action {
    Action::DeviceCommand(DeviceCommandAction {
        id: ActionId::generate(),
        target: device("light.all"),
        command: "light_off".into(),
        params: serde_json::Value::Null,
        critical: false,
    })
}

fn door_trigger() -> Trigger {
    Trigger::DeviceState(DeviceStateTrigger {
        device_id: device("sensor.door"),
        state: "open".into(),
    })
}

fn base_draft(triggers: Vec<Trigger>, actions: Vec<Action>) -> AutomationDraft {
    AutomationDraft {
        name: "test automation".into(),
        enabled: true,
        triggers,
        logic: TriggerLogic::Or,
        conditions: vec![],
        actions,
        recurrence: None,
    }
}

#[tokio::test(start_paused = true)]
async fn clock_tick_automation_fires_exactly_once() {
    let mut harness = Harness::start();

    let mut draft = base_draft(
        vec![Trigger::Time(TimeTrigger {
            at: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
        })],
        vec![light_off_action()],
    );
    draft.recurrence = Some(Recurrence {
        enabled: true,
        kind: RecurrenceKind::Daily,
        weekdays: Default::default(),
    });
    harness.rules.create(draft).unwrap();
    harness.settle().await;

    // Sub-minute ticks around and inside the matching minute.
    harness.bus.publish(Event::clock_tick(monday(22, 59, 59)));
    harness.bus.publish(Event::clock_tick(monday(23, 0, 0)));
    harness.bus.publish(Event::clock_tick(monday(23, 0, 1)));
    harness.bus.publish(Event::clock_tick(monday(23, 0, 2)));

    let record = harness.next_record().await;
    assert_eq!(record.outcome, ExecutionOutcome::Completed);
    assert_eq!(record.action_results.len(), 1);
    assert_eq!(record.action_results[0].outcome, StepOutcome::Completed);

    harness.settle().await;
    assert_eq!(harness.sink.commands(), vec!["light_off"]);
    assert_eq!(harness.audit.len(), 1);

    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_satisfaction_does_not_refire() {
    let mut harness = Harness::start();

    harness
        .rules
        .create(base_draft(
            vec![Trigger::SensorThreshold(SensorThresholdTrigger {
                device_id: device("sensor.temp"),
                metric: "temperature".into(),
                op: CompareOp::Gte,
                value: 29.0,
            })],
            vec![light_off_action()],
        ))
        .unwrap();
    harness.settle().await;

    // Rising edge, then noise above the threshold.
    harness.bus.publish(Event::sensor_reading(
        device("sensor.temp"),
        "temperature",
        29.5,
        monday(9, 0, 0),
    ));
    harness.bus.publish(Event::sensor_reading(
        device("sensor.temp"),
        "temperature",
        30.0,
        monday(9, 1, 0),
    ));
    harness.bus.publish(Event::sensor_reading(
        device("sensor.temp"),
        "temperature",
        31.0,
        monday(9, 2, 0),
    ));

    let record = harness.next_record().await;
    assert_eq!(record.outcome, ExecutionOutcome::Completed);

    harness.settle().await;
    assert_eq!(harness.audit.len(), 1, "idempotent latch must not re-fire");

    // Reset below the threshold, then a new rising edge fires again.
    harness.bus.publish(Event::sensor_reading(
        device("sensor.temp"),
        "temperature",
        20.0,
        monday(10, 0, 0),
    ));
    harness.bus.publish(Event::sensor_reading(
        device("sensor.temp"),
        "temperature",
        29.1,
        monday(10, 5, 0),
    ));

    let record = harness.next_record().await;
    assert_eq!(record.outcome, ExecutionOutcome::Completed);

    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn condition_window_gates_fires() {
    let mut harness = Harness::start();

    let mut draft = base_draft(
        vec![Trigger::SensorThreshold(SensorThresholdTrigger {
            device_id: device("sensor.temp"),
            metric: "temperature".into(),
            op: CompareOp::Gte,
            value: 29.0,
        })],
        vec![light_off_action()],
    );
    draft.conditions = vec![Condition::TimeWindow(TimeWindowCondition {
        start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        end: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
    })];
    harness.rules.create(draft).unwrap();
    harness.settle().await;

    // Inside the window: completed.
    harness.bus.publish(Event::sensor_reading(
        device("sensor.temp"),
        "temperature",
        29.0,
        monday(9, 0, 0),
    ));
    let record = harness.next_record().await;
    assert_eq!(record.outcome, ExecutionOutcome::Completed);

    // Reset, then re-fire outside the window: suppressed.
    harness.bus.publish(Event::sensor_reading(
        device("sensor.temp"),
        "temperature",
        20.0,
        monday(12, 0, 0),
    ));
    harness.bus.publish(Event::sensor_reading(
        device("sensor.temp"),
        "temperature",
        29.5,
        tuesday(2, 0, 0),
    ));

    let record = harness.next_record().await;
    assert_eq!(record.outcome, ExecutionOutcome::Suppressed);
    assert_eq!(record.detail.as_deref(), Some(SUPPRESSED_CONDITION_NOT_MET));
    assert!(record.action_results.is_empty());

    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn in_flight_chain_suppresses_new_fires() {
    let mut harness = Harness::start();

    harness
        .rules
        .create(base_draft(
            vec![door_trigger()],
            vec![
                Action::Delay(DelayAction {
                    id: ActionId::generate(),
                    seconds: 10,
                }),
                light_off_action(),
            ],
        ))
        .unwrap();
    harness.settle().await;

    // First fire starts a chain that parks in the 10s delay.
    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "open", monday(9, 0, 0)));
    // De-arm and re-arm while the chain is still delayed.
    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "closed", monday(9, 0, 3)));
    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "open", monday(9, 0, 5)));

    // The second fire is discarded, not queued.
    let record = harness.next_record().await;
    assert_eq!(record.outcome, ExecutionOutcome::Suppressed);
    assert_eq!(record.detail.as_deref(), Some(SUPPRESSED_IN_FLIGHT));

    // The original chain then completes untouched.
    let record = harness.next_record().await;
    assert_eq!(record.outcome, ExecutionOutcome::Completed);
    harness.settle().await;
    assert_eq!(harness.sink.commands(), vec!["light_off"]);
    assert_eq!(harness.audit.len(), 2);

    // After completion a new qualifying edge starts a new chain.
    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "closed", monday(10, 0, 0)));
    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "open", monday(10, 0, 5)));

    let record = harness.next_record().await;
    assert_eq!(record.outcome, ExecutionOutcome::Completed);
    harness.settle().await;
    assert_eq!(harness.sink.commands().len(), 2);

    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn weekly_recurrence_blocks_other_days() {
    let mut harness = Harness::start();

    let mut draft = base_draft(vec![door_trigger()], vec![light_off_action()]);
    draft.recurrence = Some(Recurrence {
        enabled: true,
        kind: RecurrenceKind::Weekly,
        weekdays: [Weekday::Mon, Weekday::Wed].into_iter().collect(),
    });
    harness.rules.create(draft).unwrap();
    harness.settle().await;

    // Tuesday: trigger satisfaction is ignored entirely.
    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "open", tuesday(9, 0, 0)));
    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "closed", tuesday(9, 5, 0)));
    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "open", tuesday(9, 10, 0)));
    harness.settle().await;
    assert!(harness.audit.is_empty(), "gated days must produce no records");

    // Monday: fires normally.
    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "open", monday(9, 0, 0)));
    let record = harness.next_record().await;
    assert_eq!(record.outcome, ExecutionOutcome::Completed);

    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn running_chain_uses_its_snapshot_despite_edits() {
    let mut harness = Harness::start();

    let old_command = Action::DeviceCommand(DeviceCommandAction {
        id: ActionId::generate(),
        target: device("light.all"),
        command: "old_command".into(),
        params: serde_json::Value::Null,
        critical: false,
    });
    let id = harness
        .rules
        .create(base_draft(
            vec![door_trigger()],
            vec![
                Action::Delay(DelayAction {
                    id: ActionId::generate(),
                    seconds: 5,
                }),
                old_command,
            ],
        ))
        .unwrap();
    harness.settle().await;

    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "open", monday(9, 0, 0)));
    harness.settle().await;

    // Edit while the chain is parked in its delay.
    let new_command = Action::DeviceCommand(DeviceCommandAction {
        id: ActionId::generate(),
        target: device("light.all"),
        command: "new_command".into(),
        params: serde_json::Value::Null,
        critical: false,
    });
    harness
        .rules
        .update(&id, base_draft(vec![door_trigger()], vec![new_command]))
        .unwrap();

    // The in-flight chain still executes its fire-time snapshot.
    let record = harness.next_record().await;
    assert_eq!(record.outcome, ExecutionOutcome::Completed);
    assert_eq!(record.version, 1);
    harness.settle().await;
    assert_eq!(harness.sink.commands(), vec!["old_command"]);

    // The next fire executes the edited definition.
    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "open", monday(10, 0, 0)));
    let record = harness.next_record().await;
    assert_eq!(record.version, 2);
    harness.settle().await;
    assert_eq!(harness.sink.commands(), vec!["old_command", "new_command"]);

    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disabling_prevents_new_fires_but_keeps_running_chain() {
    let mut harness = Harness::start();

    let id = harness
        .rules
        .create(base_draft(
            vec![door_trigger()],
            vec![
                Action::Delay(DelayAction {
                    id: ActionId::generate(),
                    seconds: 10,
                }),
                light_off_action(),
            ],
        ))
        .unwrap();
    harness.settle().await;

    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "open", monday(9, 0, 0)));
    harness.settle().await;

    // Disable while the chain is delayed; new edges must not fire.
    harness.rules.set_enabled(&id, false).unwrap();
    harness.settle().await;
    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "closed", monday(9, 0, 2)));
    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "open", monday(9, 0, 4)));
    harness.settle().await;

    // The running chain is not aborted by the disable.
    let record = harness.next_record().await;
    assert_eq!(record.outcome, ExecutionOutcome::Completed);
    harness.settle().await;
    assert_eq!(harness.audit.len(), 1);
    assert_eq!(harness.sink.commands(), vec!["light_off"]);

    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_times_out_in_flight_chains() {
    let mut harness = Harness::start();

    harness
        .rules
        .create(base_draft(
            vec![door_trigger()],
            vec![
                Action::Delay(DelayAction {
                    id: ActionId::generate(),
                    seconds: 3600,
                }),
                light_off_action(),
            ],
        ))
        .unwrap();
    harness.settle().await;

    harness
        .bus
        .publish(Event::device_state(device("sensor.door"), "open", monday(9, 0, 0)));
    harness.settle().await;

    // Shutdown cancels the parked chain cooperatively.
    let Harness {
        mut records,
        handle,
        sink,
        ..
    } = harness;
    handle.shutdown().await;

    let record = tokio::time::timeout(Duration::from_secs(300), records.recv())
        .await
        .expect("timed out waiting for execution record")
        .expect("audit feed closed");
    assert_eq!(record.outcome, ExecutionOutcome::TimedOut);
    assert_eq!(record.action_results[0].outcome, StepOutcome::TimedOut);
    assert_eq!(record.action_results[1].outcome, StepOutcome::Skipped);
    assert!(sink.commands().is_empty());
}
