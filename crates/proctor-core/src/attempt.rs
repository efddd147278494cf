//! A running attempt.
//!
//! [`Attempt`] owns the session, the submission guard and the countdown.
//! The manual submit button and countdown expiry both go through
//! [`Attempt::submit`], so at most one scoring and persistence pass runs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;

use crate::clock::Clock;
use crate::countdown::{Countdown, CountdownStatus};
use crate::error::{StoreError, SubmitError};
use crate::model::{OptionKey, TestDefinition};
use crate::report::{AttemptKey, SubmitTrigger, TestResultSummary};
use crate::scoring::MarkingPolicy;
use crate::session::{SessionState, StatusCounts, TestSession};
use crate::submission::{PendingWrite, SubmissionCoordinator, SubmissionPhase, SubmitOutcome};
use crate::traits::ReportSink;

struct AttemptInner {
    session: TestSession,
    submission: SubmissionCoordinator,
}

pub struct Attempt {
    definition: Arc<TestDefinition>,
    key: AttemptKey,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ReportSink>,
    policy: Arc<dyn MarkingPolicy>,
    inner: Arc<Mutex<AttemptInner>>,
    countdown: Countdown,
    phase_tx: Arc<watch::Sender<SubmissionPhase>>,
}

impl Attempt {
    /// Build an attempt whose session started at `session.started_at`.
    /// The countdown is idle until [`start_countdown`](Self::start_countdown).
    pub(crate) fn new(
        definition: Arc<TestDefinition>,
        session: TestSession,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn ReportSink>,
        policy: Arc<dyn MarkingPolicy>,
        countdown: Countdown,
    ) -> Arc<Self> {
        let key = AttemptKey::new(
            session.test_code.clone(),
            session.user_id.clone(),
            session.started_at,
        );
        let (phase_tx, _) = watch::channel(SubmissionPhase::Open);
        Arc::new(Self {
            definition,
            key,
            clock,
            sink,
            policy,
            inner: Arc::new(Mutex::new(AttemptInner {
                session,
                submission: SubmissionCoordinator::new(),
            })),
            countdown,
            phase_tx: Arc::new(phase_tx),
        })
    }

    /// Start the countdown; expiry submits with [`SubmitTrigger::Auto`].
    pub(crate) fn start_countdown(self: &Arc<Self>) -> bool {
        let weak: Weak<Attempt> = Arc::downgrade(self);
        self.countdown.start(
            self.key.started_at,
            self.definition.duration_seconds(),
            move || {
                let Some(attempt) = weak.upgrade() else {
                    return;
                };
                tokio::spawn(async move {
                    match attempt.submit(SubmitTrigger::Auto).await {
                        Ok(SubmitOutcome::Persisted(summary)) => {
                            tracing::info!(key = %attempt.key, score = summary.score, "auto-submitted");
                        }
                        Ok(SubmitOutcome::Ignored(phase)) => {
                            tracing::debug!(key = %attempt.key, ?phase, "auto-submit ignored");
                        }
                        Err(e) => {
                            tracing::warn!(key = %attempt.key, "auto-submit failed: {e}");
                        }
                    }
                });
            },
        )
    }

    pub fn key(&self) -> &AttemptKey {
        &self.key
    }

    pub fn definition(&self) -> &TestDefinition {
        &self.definition
    }

    pub fn select_option(&self, index: usize, option: OptionKey) -> bool {
        self.mutate(|state| state.select_option(index, option))
    }

    pub fn clear_response(&self, index: usize) -> bool {
        self.mutate(|state| state.clear_response(index))
    }

    pub fn toggle_mark_for_review(&self, index: usize) -> bool {
        self.mutate(|state| state.toggle_mark_for_review(index))
    }

    pub fn navigate_to(&self, index: usize) -> bool {
        self.mutate(|state| state.navigate_to(index))
    }

    pub fn next(&self) -> bool {
        self.mutate(SessionState::next)
    }

    pub fn previous(&self) -> bool {
        self.mutate(SessionState::previous)
    }

    /// A copy of the current session state.
    pub fn state(&self) -> SessionState {
        self.lock().session.state.clone()
    }

    pub fn current_index(&self) -> usize {
        self.lock().session.state.current_index()
    }

    pub fn status_counts(&self) -> StatusCounts {
        self.lock().session.state.status_counts()
    }

    pub fn countdown(&self) -> CountdownStatus {
        self.countdown.status()
    }

    pub fn subscribe_countdown(&self) -> watch::Receiver<CountdownStatus> {
        self.countdown.subscribe()
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.lock().submission.phase()
    }

    /// Observe submission phase changes, e.g. to wait for an auto-submit.
    pub fn subscribe_phase(&self) -> watch::Receiver<SubmissionPhase> {
        self.phase_tx.subscribe()
    }

    /// The summary computed at freeze time, persisted or not.
    pub fn pending_summary(&self) -> Option<TestResultSummary> {
        self.lock().submission.summary().cloned()
    }

    /// Freeze, score and persist the attempt.
    ///
    /// Ignored while another submission is in flight or after the result
    /// was stored. After a persistence failure the session stays frozen and
    /// calling this again re-sends the summary computed at freeze time.
    ///
    /// The write runs on its own task. Dropping the returned future does
    /// not abandon it: the phase still settles to `Persisted` or `Failed`.
    pub async fn submit(&self, trigger: SubmitTrigger) -> Result<SubmitOutcome, SubmitError> {
        let pending = {
            let mut inner = self.lock();
            let now = self.clock.now();
            let AttemptInner {
                session,
                submission,
            } = &mut *inner;
            let begun = submission.begin(
                session,
                &self.definition,
                self.policy.as_ref(),
                trigger,
                now,
            );
            match begun {
                Ok(Some(pending)) => {
                    self.phase_tx.send_replace(submission.phase());
                    pending
                }
                Ok(None) => return Ok(SubmitOutcome::Ignored(submission.phase())),
                Err(e) => {
                    self.phase_tx.send_replace(submission.phase());
                    return Err(e.into());
                }
            }
        };

        self.countdown.cancel();
        if pending.first_attempt {
            tracing::info!(key = %pending.key, %trigger, "submission started");
        } else {
            tracing::info!(key = %pending.key, "retrying result save");
        }

        let write = tokio::spawn(persist(
            Arc::clone(&self.sink),
            Arc::clone(&self.inner),
            Arc::clone(&self.phase_tx),
            pending,
        ));

        let (pending, stored) = match write.await {
            Ok(written) => written,
            Err(e) => {
                let phase = {
                    let mut inner = self.lock();
                    inner.submission.complete(false);
                    inner.submission.phase()
                };
                self.phase_tx.send_replace(phase);
                tracing::warn!(key = %self.key, "result save task failed: {e}");
                return Err(SubmitError::PersistenceFailure {
                    key: self.key.storage_key(),
                    source: StoreError::Unavailable(format!("result save task failed: {e}")),
                });
            }
        };

        match stored {
            Ok(()) => {
                tracing::info!(
                    key = %pending.key,
                    score = pending.summary.score,
                    total = pending.summary.total_marks,
                    "result saved"
                );
                Ok(SubmitOutcome::Persisted(pending.summary))
            }
            Err(source) => {
                tracing::warn!(key = %pending.key, "could not save result: {source}");
                Err(SubmitError::PersistenceFailure {
                    key: pending.key.storage_key(),
                    source,
                })
            }
        }
    }

    fn mutate(&self, f: impl FnOnce(&mut SessionState) -> bool) -> bool {
        f(&mut self.lock().session.state)
    }

    fn lock(&self) -> MutexGuard<'_, AttemptInner> {
        lock_inner(&self.inner)
    }
}

/// Write one pending summary and record the outcome on the coordinator.
async fn persist(
    sink: Arc<dyn ReportSink>,
    inner: Arc<Mutex<AttemptInner>>,
    phase_tx: Arc<watch::Sender<SubmissionPhase>>,
    pending: PendingWrite,
) -> (PendingWrite, Result<(), StoreError>) {
    let stored = sink.put(&pending.key, &pending.summary).await;
    let phase = {
        let mut inner = lock_inner(&inner);
        inner.submission.complete(stored.is_ok());
        inner.submission.phase()
    };
    phase_tx.send_replace(phase);
    (pending, stored)
}

fn lock_inner(inner: &Mutex<AttemptInner>) -> MutexGuard<'_, AttemptInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
