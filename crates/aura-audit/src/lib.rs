//! Execution audit records and the audit feed
//!
//! Every fire attempt (successful, suppressed, failed, or timed out)
//! produces exactly one [`ExecutionRecord`]. Records are created closed
//! and never reopened; external consumers (dashboards) read them through
//! the broadcast feed or the bounded ring of recent records and never
//! mutate them.
//!
//! Step-level failures are data here, not errors: a failing automation
//! must never stop other automations from evaluating, so nothing in this
//! crate propagates upward.

use std::collections::VecDeque;
use std::sync::Mutex;

use aura_core::{ActionId, AutomationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Suppression detail recorded when conditions did not hold at fire time.
pub const SUPPRESSED_CONDITION_NOT_MET: &str = "condition_not_met";

/// Suppression detail recorded when a chain was already in flight.
pub const SUPPRESSED_IN_FLIGHT: &str = "in_flight";

/// Default number of recent records retained in memory.
const DEFAULT_RETENTION: usize = 1024;

/// Capacity of the audit broadcast feed.
const FEED_CAPACITY: usize = 1024;

/// Terminal outcome of one fire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The chain ran to the end of its last step.
    Completed,

    /// The fire was dropped before any step ran (condition gate or
    /// concurrency guard); see the record's `detail`.
    Suppressed,

    /// A critical step failed and terminated the chain.
    Failed,

    /// The chain did not finish: cancelled at shutdown or cut off by the
    /// grace period.
    TimedOut,
}

/// Outcome of a single step within a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Failed,
    TimedOut,
    /// Never ran: an earlier critical failure or a cancellation stopped
    /// the chain first.
    Skipped,
}

/// Result of one executed (or skipped) action step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: ActionId,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ActionResult {
    pub fn new(action_id: ActionId, outcome: StepOutcome) -> Self {
        Self {
            action_id,
            outcome,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// The audit entity produced per fire attempt.
///
/// Constructed closed: both constructors stamp `finished_at`, and nothing
/// in the public API mutates a record afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique record id.
    pub id: String,

    /// Automation that fired (or would have fired).
    pub automation_id: AutomationId,

    /// Automation version snapshotted at fire time.
    pub version: u64,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    pub outcome: ExecutionOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Per-step results, in execution order (scene segments expanded
    /// in place).
    pub action_results: Vec<ActionResult>,
}

impl ExecutionRecord {
    /// Record a fire that was suppressed before any step ran.
    pub fn suppressed(
        automation_id: AutomationId,
        version: u64,
        reason: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string(),
            automation_id,
            version,
            started_at: now,
            finished_at: Some(now),
            outcome: ExecutionOutcome::Suppressed,
            detail: Some(reason.into()),
            action_results: Vec::new(),
        }
    }

    /// Close a record for a chain that ran.
    pub fn finished(
        automation_id: AutomationId,
        version: u64,
        started_at: DateTime<Utc>,
        outcome: ExecutionOutcome,
        detail: Option<String>,
        action_results: Vec<ActionResult>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            automation_id,
            version,
            started_at,
            finished_at: Some(Utc::now()),
            outcome,
            detail,
            action_results,
        }
    }
}

/// Bounded in-memory audit log with a broadcast feed.
pub struct AuditLog {
    recent: Mutex<VecDeque<ExecutionRecord>>,
    feed: broadcast::Sender<ExecutionRecord>,
    retention: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Keep at most `retention` records in memory; older ones are evicted.
    pub fn with_retention(retention: usize) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            recent: Mutex::new(VecDeque::with_capacity(retention.min(DEFAULT_RETENTION))),
            feed,
            retention: retention.max(1),
        }
    }

    /// Append a closed record and publish it on the feed.
    pub fn record(&self, record: ExecutionRecord) {
        debug!(
            automation = %record.automation_id,
            outcome = ?record.outcome,
            "recording execution"
        );

        if let Ok(mut recent) = self.recent.lock() {
            if recent.len() == self.retention {
                recent.pop_front();
            }
            recent.push_back(record.clone());
        }

        // Send errors just mean no dashboards are listening
        let _ = self.feed.send(record);
    }

    /// Subscribe to the stream of execution records.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionRecord> {
        self.feed.subscribe()
    }

    /// The most recent `n` records, newest first.
    pub fn recent(&self, n: usize) -> Vec<ExecutionRecord> {
        match self.recent.lock() {
            Ok(recent) => recent.iter().rev().take(n).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.recent.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn automation_id() -> AutomationId {
        AutomationId::generate()
    }

    #[test]
    fn test_suppressed_record_is_closed() {
        let record = ExecutionRecord::suppressed(automation_id(), 3, SUPPRESSED_IN_FLIGHT);

        assert_eq!(record.outcome, ExecutionOutcome::Suppressed);
        assert_eq!(record.detail.as_deref(), Some(SUPPRESSED_IN_FLIGHT));
        assert!(record.finished_at.is_some());
        assert!(record.action_results.is_empty());
        assert_eq!(record.version, 3);
    }

    #[test]
    fn test_finished_record_carries_step_results() {
        let step = ActionResult::new(ActionId::generate(), StepOutcome::Completed);
        let record = ExecutionRecord::finished(
            automation_id(),
            1,
            Utc::now(),
            ExecutionOutcome::Completed,
            None,
            vec![step.clone()],
        );

        assert_eq!(record.outcome, ExecutionOutcome::Completed);
        assert_eq!(record.action_results, vec![step]);
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let log = AuditLog::with_retention(2);
        for version in 1..=3 {
            log.record(ExecutionRecord::suppressed(
                automation_id(),
                version,
                SUPPRESSED_IN_FLIGHT,
            ));
        }

        assert_eq!(log.len(), 2);
        let recent = log.recent(10);
        // Newest first; version 1 was evicted.
        assert_eq!(recent[0].version, 3);
        assert_eq!(recent[1].version, 2);
    }

    #[tokio::test]
    async fn test_feed_delivers_records() {
        let log = AuditLog::new();
        let mut feed = log.subscribe();

        let record = ExecutionRecord::suppressed(automation_id(), 1, SUPPRESSED_CONDITION_NOT_MET);
        log.record(record.clone());

        let received = feed.recv().await.unwrap();
        assert_eq!(received.id, record.id);
        assert_eq!(received.detail.as_deref(), Some(SUPPRESSED_CONDITION_NOT_MET));
    }

    #[test]
    fn test_serde_round_trip() {
        let record = ExecutionRecord::finished(
            automation_id(),
            2,
            Utc::now(),
            ExecutionOutcome::Failed,
            Some("critical step failed".into()),
            vec![ActionResult::new(ActionId::generate(), StepOutcome::Failed)
                .with_detail("device unavailable")],
        );

        let json = serde_json::to_string(&record).unwrap();
        let back: ExecutionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
