//! The event-processing loop
//!
//! One coordinating loop owns all trigger latch state, so edge
//! transitions are race-free by construction: events, rule changes, and
//! the shutdown signal are multiplexed into a single task, while every
//! permitted fire spawns an independent, cancellable chain task. The only
//! mutable state shared with those tasks is the in-flight try-lock set.

use std::collections::HashMap;
use std::sync::Arc;

use aura_audit::{
    AuditLog, ExecutionRecord, SUPPRESSED_CONDITION_NOT_MET, SUPPRESSED_IN_FLIGHT,
};
use aura_automation::{Automation, RuleChange, RuleStore};
use aura_core::{AutomationId, Event, EventSource};
use aura_event_bus::clock::{ClockDriver, ClockError};
use aura_event_bus::solar::SolarDriver;
use aura_event_bus::EventBus;
use aura_executor::{ChainExecutor, ChainSnapshot, CommandSink, SceneCatalog};
use aura_state_store::StateStore;
use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::eval::ConditionEvaluator;
use crate::runtime::AutomationRuntime;
use crate::scheduler::InFlightSet;
use crate::trigger_eval::SolarTable;

/// The automation engine.
///
/// Construct with the shared stores and seams, then [`spawn`] it; the
/// returned handle shuts the loop down cooperatively.
///
/// [`spawn`]: AutomationEngine::spawn
pub struct AutomationEngine {
    rules: Arc<RuleStore>,
    states: Arc<StateStore>,
    bus: Arc<EventBus>,
    audit: Arc<AuditLog>,
    executor: Arc<ChainExecutor>,
    config: EngineConfig,
}

impl AutomationEngine {
    pub fn new(
        rules: Arc<RuleStore>,
        states: Arc<StateStore>,
        bus: Arc<EventBus>,
        audit: Arc<AuditLog>,
        sink: Arc<dyn CommandSink>,
        scenes: Arc<dyn SceneCatalog>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let executor =
            Arc::new(ChainExecutor::new(sink, scenes).with_step_timeout(config.step_timeout()));
        Ok(Self {
            rules,
            states,
            bus,
            audit,
            executor,
            config,
        })
    }

    /// Spawn the clock driver (and the solar driver when a site location
    /// is configured) against this engine's bus. Call before [`spawn`];
    /// embedders that run their own drivers can skip this entirely.
    ///
    /// [`spawn`]: AutomationEngine::spawn
    pub fn spawn_drivers(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<tokio::task::JoinHandle<()>>, ClockError> {
        let mut handles = Vec::new();

        let clock = ClockDriver::new(self.bus.clone(), self.config.tick_interval())?;
        handles.push(clock.spawn(shutdown.clone()));

        if let Some(location) = self.config.location {
            handles.push(SolarDriver::new(self.bus.clone(), location).spawn(shutdown));
        }
        Ok(handles)
    }

    /// Start the loop.
    ///
    /// Subscriptions are created before the task is spawned, so events
    /// published after `spawn` returns are never missed.
    pub fn spawn(self) -> EngineHandle {
        let events = self.bus.subscribe();
        let changes = self.rules.subscribe_changes();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(self.run(events, changes, shutdown_rx));
        EngineHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(
        self,
        mut events: broadcast::Receiver<Event>,
        mut changes: broadcast::Receiver<RuleChange>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut state = LoopState {
            evaluator: ConditionEvaluator::new(self.states.clone()),
            rules: self.rules.clone(),
            states: self.states.clone(),
            audit: self.audit.clone(),
            executor: self.executor.clone(),
            runtimes: HashMap::new(),
            solar: SolarTable::new(),
            in_flight: InFlightSet::new(),
            chains: JoinSet::new(),
            cancel: cancel_rx,
        };
        state.load_all();
        info!(automations = state.runtimes.len(), "engine started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                event = events.recv() => match event {
                    Ok(event) => state.handle_event(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event stream lagged; continuing");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("event bus closed; stopping engine");
                        break;
                    }
                },

                change = changes.recv() => match change {
                    Ok(change) => state.apply_change(change),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Missed edits; resynchronize from the store.
                        warn!(missed, "change feed lagged; reloading automations");
                        state.load_all();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("rule store dropped; stopping engine");
                        break;
                    }
                },

                // Reap finished chain tasks as they terminate.
                Some(result) = state.chains.join_next() => {
                    if let Err(e) = result {
                        warn!(error = %e, "chain task aborted");
                    }
                }
            }
        }

        self.drain(state, cancel_tx).await;
    }

    /// Cooperative shutdown: signal every chain, wait out the grace
    /// period, then abort whatever is left. Cooperatively cancelled
    /// chains close their own records as timed out.
    async fn drain(&self, mut state: LoopState, cancel_tx: watch::Sender<bool>) {
        let in_flight = state.chains.len();
        if in_flight > 0 {
            info!(in_flight, "cancelling in-flight chains");
        }
        let _ = cancel_tx.send(true);

        let drained = tokio::time::timeout(self.config.shutdown_grace(), async {
            while state.chains.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = state.chains.len(),
                "shutdown grace elapsed; aborting remaining chains"
            );
            state.chains.shutdown().await;
        }
        info!("engine stopped");
    }
}

/// Handle to a running engine.
pub struct EngineHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl EngineHandle {
    /// Request shutdown and wait for the loop (and its grace period) to
    /// finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// All state owned by the running loop.
struct LoopState {
    rules: Arc<RuleStore>,
    states: Arc<StateStore>,
    audit: Arc<AuditLog>,
    executor: Arc<ChainExecutor>,
    evaluator: ConditionEvaluator,
    runtimes: HashMap<AutomationId, AutomationRuntime>,
    solar: SolarTable,
    in_flight: InFlightSet,
    chains: JoinSet<()>,
    cancel: watch::Receiver<bool>,
}

impl LoopState {
    /// (Re)build runtime state for every enabled automation.
    fn load_all(&mut self) {
        self.runtimes.clear();
        for automation in self.rules.list(true) {
            self.runtimes
                .insert(automation.id.clone(), AutomationRuntime::new(automation));
        }
    }

    /// Rebuild or drop runtime state for exactly one automation. Other
    /// automations' latches and in-flight chains are untouched.
    fn apply_change(&mut self, change: RuleChange) {
        match change {
            RuleChange::Saved(id) => match self.rules.get(&id) {
                Some(automation) if automation.enabled => {
                    debug!(automation = %id, "rebuilding runtime state");
                    self.runtimes.insert(id, AutomationRuntime::new(automation));
                }
                _ => {
                    debug!(automation = %id, "dropping runtime state");
                    self.runtimes.remove(&id);
                }
            },
            RuleChange::Removed(id) => {
                debug!(automation = %id, "dropping runtime state");
                self.runtimes.remove(&id);
            }
        }
    }

    /// One event-processing pass over the candidate automations.
    fn handle_event(&mut self, event: Event) {
        self.states.apply(&event);

        // Solar schedules feed the table read during tick matching; they
        // are irrelevant to every latch.
        if event.source == EventSource::Solar {
            self.solar.observe(&event);
            return;
        }

        for id in self.rules.ids_for(&event) {
            // The index can know about automations a lagged change feed
            // has not delivered yet; materialize them on demand.
            if !self.runtimes.contains_key(&id) {
                if let Some(automation) = self.rules.get(&id) {
                    if automation.enabled {
                        self.runtimes
                            .insert(id.clone(), AutomationRuntime::new(automation));
                    }
                }
            }

            let Some(runtime) = self.runtimes.get_mut(&id) else {
                continue;
            };
            if runtime.process(&event, &self.solar) {
                let automation = runtime.automation().clone();
                self.dispatch_fire(automation, &event);
            }
        }
    }

    /// Condition gate, concurrency guard, then chain spawn.
    fn dispatch_fire(&mut self, automation: Automation, event: &Event) {
        if !self
            .evaluator
            .evaluate_all(&automation.conditions, event.timestamp)
        {
            debug!(automation = %automation.id, "fire suppressed: condition not met");
            self.audit.record(ExecutionRecord::suppressed(
                automation.id.clone(),
                automation.version,
                SUPPRESSED_CONDITION_NOT_MET,
            ));
            return;
        }

        let Some(claim) = self.in_flight.try_claim(&automation.id) else {
            debug!(automation = %automation.id, "fire suppressed: chain in flight");
            self.audit.record(ExecutionRecord::suppressed(
                automation.id.clone(),
                automation.version,
                SUPPRESSED_IN_FLIGHT,
            ));
            return;
        };

        self.rules.mark_fired(&automation.id, Utc::now());

        let snapshot = ChainSnapshot {
            automation_id: automation.id.clone(),
            version: automation.version,
            actions: automation.actions.clone(),
        };
        info!(
            automation = %automation.id,
            version = snapshot.version,
            steps = snapshot.actions.len(),
            "starting execution chain"
        );

        let executor = Arc::clone(&self.executor);
        let audit = Arc::clone(&self.audit);
        let cancel = self.cancel.clone();
        self.chains.spawn(async move {
            let record = executor.run(snapshot, cancel).await;
            audit.record(record);
            // The claim is released here, the instant the chain terminates.
            drop(claim);
        });
    }
}
