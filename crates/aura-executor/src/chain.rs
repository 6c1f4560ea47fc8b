//! Action-chain execution
//!
//! A chain runs one automation's action snapshot strictly in order:
//! `Pending → Running(step) → Completed | Failed | TimedOut`. Steps are
//! best-effort: a failed or timed-out step is recorded and the chain
//! continues, unless the step is marked critical, which terminates the
//! chain as failed. Scene activations expand into nested segments under
//! the same rules; the nested results are recorded in execution order,
//! followed by the scene step's own summary result.
//!
//! Cancellation is cooperative and checked between steps (and during
//! delays); a cancelled chain closes as timed out with the remaining
//! steps skipped.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use aura_automation::{Action, DelayAction, DeviceCommandAction, NotifyAction, SceneActivateAction};
use aura_audit::{ActionResult, ExecutionOutcome, ExecutionRecord, StepOutcome};
use aura_core::AutomationId;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::scene::SceneCatalog;
use crate::sink::CommandSink;

/// Default per-step acknowledgment timeout.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum depth of scene-in-scene expansion.
const MAX_SCENE_DEPTH: usize = 8;

/// Progress states of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Pending,
    Running(usize),
    Completed,
    Failed,
    TimedOut,
}

/// The action list and version captured at fire time.
///
/// A chain only ever executes its snapshot; concurrent edits to the
/// automation are invisible to it.
#[derive(Debug, Clone)]
pub struct ChainSnapshot {
    pub automation_id: AutomationId,
    pub version: u64,
    pub actions: Vec<Action>,
}

/// How a finished segment reports back to its caller.
enum SegmentOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// What a single step decided about the rest of the chain.
enum StepFlow {
    Continue,
    FailChain,
    Cancelled,
}

/// Executes action chains against the outbound seams.
pub struct ChainExecutor {
    sink: Arc<dyn CommandSink>,
    scenes: Arc<dyn SceneCatalog>,
    step_timeout: Duration,
}

impl ChainExecutor {
    pub fn new(sink: Arc<dyn CommandSink>, scenes: Arc<dyn SceneCatalog>) -> Self {
        Self {
            sink,
            scenes,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Override the per-step acknowledgment timeout.
    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    /// Run a chain to completion and return its closed execution record.
    ///
    /// Never returns an error: every step-level failure is captured into
    /// the record.
    pub async fn run(
        &self,
        snapshot: ChainSnapshot,
        mut cancel: watch::Receiver<bool>,
    ) -> ExecutionRecord {
        let started_at = Utc::now();
        debug!(
            automation = %snapshot.automation_id,
            version = snapshot.version,
            steps = snapshot.actions.len(),
            "starting action chain"
        );

        let mut results = Vec::new();
        let outcome = self
            .run_segment(&snapshot.actions, &mut results, &mut cancel, 0)
            .await;

        let (state, outcome, detail) = match outcome {
            SegmentOutcome::Completed => (ChainState::Completed, ExecutionOutcome::Completed, None),
            SegmentOutcome::Failed => (
                ChainState::Failed,
                ExecutionOutcome::Failed,
                Some("critical step failed".to_string()),
            ),
            SegmentOutcome::Cancelled => (
                ChainState::TimedOut,
                ExecutionOutcome::TimedOut,
                Some("cancelled before completion".to_string()),
            ),
        };

        debug!(automation = %snapshot.automation_id, ?state, "chain finished");
        ExecutionRecord::finished(
            snapshot.automation_id,
            snapshot.version,
            started_at,
            outcome,
            detail,
            results,
        )
    }

    /// Execute one ordered segment; recurses for scene expansion.
    fn run_segment<'a>(
        &'a self,
        actions: &'a [Action],
        results: &'a mut Vec<ActionResult>,
        cancel: &'a mut watch::Receiver<bool>,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = SegmentOutcome> + Send + 'a>> {
        Box::pin(async move {
            let mut state = ChainState::Pending;
            trace!(?state, steps = actions.len(), "segment starting");

            for (index, action) in actions.iter().enumerate() {
                if *cancel.borrow() {
                    skip_remaining(&actions[index..], results);
                    return SegmentOutcome::Cancelled;
                }

                state = ChainState::Running(index);
                trace!(?state, kind = action.kind(), "running step");

                match self.execute_step(action, results, cancel, depth).await {
                    StepFlow::Continue => {}
                    StepFlow::FailChain => {
                        skip_remaining(&actions[index + 1..], results);
                        return SegmentOutcome::Failed;
                    }
                    StepFlow::Cancelled => {
                        skip_remaining(&actions[index + 1..], results);
                        return SegmentOutcome::Cancelled;
                    }
                }
            }

            SegmentOutcome::Completed
        })
    }

    async fn execute_step(
        &self,
        action: &Action,
        results: &mut Vec<ActionResult>,
        cancel: &mut watch::Receiver<bool>,
        depth: usize,
    ) -> StepFlow {
        match action {
            Action::DeviceCommand(a) => self.execute_device_command(a, results).await,
            Action::Notify(a) => self.execute_notify(a, results).await,
            Action::Delay(a) => execute_delay(a, results, cancel).await,
            Action::SceneActivate(a) => self.execute_scene(a, results, cancel, depth).await,
        }
    }

    // --- Individual step executors ---

    async fn execute_device_command(
        &self,
        action: &DeviceCommandAction,
        results: &mut Vec<ActionResult>,
    ) -> StepFlow {
        let dispatch = self
            .sink
            .send_command(&action.target, &action.command, &action.params);

        let result = match tokio::time::timeout(self.step_timeout, dispatch).await {
            Ok(Ok(())) => ActionResult::new(action.id.clone(), StepOutcome::Completed),
            Ok(Err(e)) => {
                warn!(target = %action.target, command = %action.command, error = %e, "device command failed");
                ActionResult::new(action.id.clone(), StepOutcome::Failed).with_detail(e.to_string())
            }
            Err(_) => {
                warn!(target = %action.target, command = %action.command, "device command timed out");
                ActionResult::new(action.id.clone(), StepOutcome::TimedOut)
                    .with_detail(format!("no acknowledgment within {:?}", self.step_timeout))
            }
        };

        let succeeded = result.outcome == StepOutcome::Completed;
        results.push(result);

        if !succeeded && action.critical {
            StepFlow::FailChain
        } else {
            StepFlow::Continue
        }
    }

    async fn execute_notify(
        &self,
        action: &NotifyAction,
        results: &mut Vec<ActionResult>,
    ) -> StepFlow {
        // Fire-and-forget: the step completes once dispatch returns Ok.
        let dispatch = self.sink.notify(&action.message, &action.channels);

        let result = match tokio::time::timeout(self.step_timeout, dispatch).await {
            Ok(Ok(())) => ActionResult::new(action.id.clone(), StepOutcome::Completed),
            Ok(Err(e)) => {
                warn!(error = %e, "notification dispatch failed");
                ActionResult::new(action.id.clone(), StepOutcome::Failed).with_detail(e.to_string())
            }
            Err(_) => ActionResult::new(action.id.clone(), StepOutcome::TimedOut)
                .with_detail(format!("dispatch blocked for {:?}", self.step_timeout)),
        };

        results.push(result);
        StepFlow::Continue
    }

    async fn execute_scene(
        &self,
        action: &SceneActivateAction,
        results: &mut Vec<ActionResult>,
        cancel: &mut watch::Receiver<bool>,
        depth: usize,
    ) -> StepFlow {
        if depth >= MAX_SCENE_DEPTH {
            warn!(scene = %action.scene_id, depth, "scene nesting too deep");
            results.push(
                ActionResult::new(action.id.clone(), StepOutcome::Failed)
                    .with_detail("scene nesting too deep"),
            );
            return if action.critical {
                StepFlow::FailChain
            } else {
                StepFlow::Continue
            };
        }

        let Some(actions) = self.scenes.resolve(&action.scene_id) else {
            results.push(
                ActionResult::new(action.id.clone(), StepOutcome::Failed)
                    .with_detail(format!("unknown scene: {}", action.scene_id)),
            );
            return if action.critical {
                StepFlow::FailChain
            } else {
                StepFlow::Continue
            };
        };

        debug!(scene = %action.scene_id, steps = actions.len(), "expanding scene");
        match self.run_segment(&actions, results, cancel, depth + 1).await {
            SegmentOutcome::Completed => {
                results.push(
                    ActionResult::new(action.id.clone(), StepOutcome::Completed)
                        .with_detail(format!("expanded {} steps", actions.len())),
                );
                StepFlow::Continue
            }
            SegmentOutcome::Failed => {
                results.push(
                    ActionResult::new(action.id.clone(), StepOutcome::Failed)
                        .with_detail("scene segment failed"),
                );
                if action.critical {
                    StepFlow::FailChain
                } else {
                    StepFlow::Continue
                }
            }
            SegmentOutcome::Cancelled => {
                results.push(
                    ActionResult::new(action.id.clone(), StepOutcome::TimedOut)
                        .with_detail("interrupted by shutdown"),
                );
                StepFlow::Cancelled
            }
        }
    }
}

/// Suspend only this chain; other chains and the event loop keep running.
async fn execute_delay(
    action: &DelayAction,
    results: &mut Vec<ActionResult>,
    cancel: &mut watch::Receiver<bool>,
) -> StepFlow {
    let sleep = tokio::time::sleep(Duration::from_secs(action.seconds));
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => {
                results.push(ActionResult::new(action.id.clone(), StepOutcome::Completed));
                return StepFlow::Continue;
            }
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    results.push(
                        ActionResult::new(action.id.clone(), StepOutcome::TimedOut)
                            .with_detail("interrupted by shutdown"),
                    );
                    return StepFlow::Cancelled;
                }
            }
        }
    }
}

fn skip_remaining(actions: &[Action], results: &mut Vec<ActionResult>) {
    for action in actions {
        results.push(ActionResult::new(action.id().clone(), StepOutcome::Skipped));
    }
}
