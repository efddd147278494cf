//! Submission guard.
//!
//! [`SubmissionCoordinator`] decides, under the attempt lock, whether a
//! submit call does any work. The first call freezes the session and scores
//! the snapshot; later calls are ignored while a write is in flight or after
//! it succeeded, and re-send the retained summary after a failed write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::model::TestDefinition;
use crate::report::{AttemptKey, SubmitTrigger, TestResultSummary};
use crate::scoring::{self, MarkingPolicy};
use crate::session::{FrozenSession, TestSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPhase {
    /// Accepting answers.
    Open,
    /// Frozen; a write to the report sink is running.
    InFlight,
    /// Frozen; the last write failed and may be retried.
    Failed,
    /// Frozen and durably stored.
    Persisted,
}

impl SubmissionPhase {
    /// No write is running and none is pending a first attempt.
    pub fn is_settled(self) -> bool {
        matches!(self, SubmissionPhase::Failed | SubmissionPhase::Persisted)
    }
}

/// A write the caller must perform outside the lock.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub key: AttemptKey,
    pub summary: TestResultSummary,
    /// `false` when re-sending after a failed write.
    pub first_attempt: bool,
}

/// What a submit call did.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The summary is durably stored.
    Persisted(TestResultSummary),
    /// Another submission already owns the attempt; nothing was done.
    Ignored(SubmissionPhase),
}

#[derive(Debug)]
pub struct SubmissionCoordinator {
    phase: SubmissionPhase,
    trigger: Option<SubmitTrigger>,
    snapshot: Option<FrozenSession>,
    summary: Option<TestResultSummary>,
}

impl SubmissionCoordinator {
    pub fn new() -> Self {
        Self {
            phase: SubmissionPhase::Open,
            trigger: None,
            snapshot: None,
            summary: None,
        }
    }

    /// Claim the submission. Returns the write to perform, or `None` if
    /// this call must be ignored.
    ///
    /// On the first call the session is frozen at `now` and the snapshot
    /// scored. After a failed write the retained summary is handed out
    /// again unchanged.
    pub fn begin(
        &mut self,
        session: &mut TestSession,
        definition: &TestDefinition,
        policy: &dyn MarkingPolicy,
        trigger: SubmitTrigger,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingWrite>, ScoringError> {
        match self.phase {
            SubmissionPhase::InFlight | SubmissionPhase::Persisted => {
                tracing::debug!(phase = ?self.phase, %trigger, "submission ignored");
                Ok(None)
            }
            SubmissionPhase::Open => {
                let Some(snapshot) = session.freeze(definition, now) else {
                    tracing::debug!("session already frozen");
                    return Ok(None);
                };
                self.trigger = Some(trigger);
                self.snapshot = Some(snapshot);
                self.prepare_write(definition, policy, true)
            }
            SubmissionPhase::Failed => self.prepare_write(definition, policy, false),
        }
    }

    /// Record the outcome of the write handed out by [`begin`](Self::begin).
    pub fn complete(&mut self, stored: bool) {
        if self.phase != SubmissionPhase::InFlight {
            return;
        }
        self.phase = if stored {
            SubmissionPhase::Persisted
        } else {
            SubmissionPhase::Failed
        };
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.phase
    }

    pub fn trigger(&self) -> Option<SubmitTrigger> {
        self.trigger
    }

    pub fn snapshot(&self) -> Option<&FrozenSession> {
        self.snapshot.as_ref()
    }

    /// The summary computed at freeze time, once scoring has run.
    pub fn summary(&self) -> Option<&TestResultSummary> {
        self.summary.as_ref()
    }

    fn prepare_write(
        &mut self,
        definition: &TestDefinition,
        policy: &dyn MarkingPolicy,
        first_attempt: bool,
    ) -> Result<Option<PendingWrite>, ScoringError> {
        let summary = match self.summary.clone() {
            Some(summary) => summary,
            None => {
                let (Some(snapshot), Some(trigger)) = (&self.snapshot, self.trigger) else {
                    return Ok(None);
                };
                match scoring::score(definition, snapshot, trigger, policy) {
                    Ok(summary) => {
                        self.summary = Some(summary.clone());
                        summary
                    }
                    Err(e) => {
                        self.phase = SubmissionPhase::Failed;
                        return Err(e);
                    }
                }
            }
        };

        self.phase = SubmissionPhase::InFlight;
        Ok(Some(PendingWrite {
            key: summary.key(),
            summary,
            first_attempt,
        }))
    }
}

impl Default for SubmissionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
