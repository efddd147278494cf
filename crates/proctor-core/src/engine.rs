//! Attempt orchestration.
//!
//! [`SessionEngine`] wires the collaborators together: it resolves a test
//! code into a [`PreparedAttempt`] (the instructions screen), and turns that
//! into a running [`Attempt`] once the candidate dismisses the instructions.

use std::sync::Arc;
use std::time::Duration;

use crate::attempt::Attempt;
use crate::clock::{truncate_to_millis, Clock, SystemClock};
use crate::countdown::{Countdown, DEFAULT_TICK_INTERVAL};
use crate::error::{SessionError, StoreError};
use crate::model::TestDefinition;
use crate::report::{AttemptKey, TestResultSummary};
use crate::scoring::{MarkingPolicy, StandardMarking};
use crate::session::TestSession;
use crate::traits::{DefinitionProvider, ReportSink};

/// Configuration for attempts started by the engine.
#[derive(Debug, Clone)]
pub struct AttemptConfig {
    /// Spacing between countdown ticks.
    pub tick_interval: Duration,
    /// Warn once when this many seconds remain.
    pub low_time_warning_secs: Option<u64>,
}

impl Default for AttemptConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            low_time_warning_secs: Some(300),
        }
    }
}

pub struct SessionEngine {
    definitions: Arc<dyn DefinitionProvider>,
    sink: Arc<dyn ReportSink>,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn MarkingPolicy>,
    config: AttemptConfig,
}

impl SessionEngine {
    pub fn new(
        definitions: Arc<dyn DefinitionProvider>,
        sink: Arc<dyn ReportSink>,
        config: AttemptConfig,
    ) -> Self {
        Self {
            definitions,
            sink,
            clock: Arc::new(SystemClock),
            policy: Arc::new(StandardMarking),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_marking_policy(mut self, policy: Arc<dyn MarkingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Resolve `test_code` for `user_id`. No time is running yet.
    pub async fn prepare(
        &self,
        test_code: &str,
        user_id: &str,
    ) -> Result<PreparedAttempt, SessionError> {
        let definition = self
            .definitions
            .fetch(test_code)
            .await?
            .ok_or_else(|| SessionError::DefinitionNotFound(test_code.to_string()))?;

        if definition.questions.is_empty() {
            return Err(SessionError::EmptyQuestionSet(test_code.to_string()));
        }

        tracing::debug!(
            test_code,
            questions = definition.question_count(),
            duration_minutes = definition.duration_minutes,
            "test definition loaded"
        );

        Ok(PreparedAttempt {
            definition: Arc::new(definition),
            user_id: user_id.to_string(),
            clock: Arc::clone(&self.clock),
            sink: Arc::clone(&self.sink),
            policy: Arc::clone(&self.policy),
            config: self.config.clone(),
        })
    }

    /// Rebuild a stored result from the values the results view is
    /// addressed by.
    pub async fn load_result(
        &self,
        key: &AttemptKey,
    ) -> Result<Option<TestResultSummary>, StoreError> {
        self.sink.get(key).await
    }
}

/// A loaded test waiting for the candidate to dismiss the instructions.
pub struct PreparedAttempt {
    definition: Arc<TestDefinition>,
    user_id: String,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ReportSink>,
    policy: Arc<dyn MarkingPolicy>,
    config: AttemptConfig,
}

impl PreparedAttempt {
    /// The definition to render on the instructions screen.
    pub fn definition(&self) -> &TestDefinition {
        &self.definition
    }

    /// Dismiss the instructions: stamp the start time and start the clock.
    ///
    /// Must be called from within a tokio runtime.
    pub fn begin(self) -> Result<Arc<Attempt>, SessionError> {
        let started_at = truncate_to_millis(self.clock.now());
        let session = TestSession::start(&self.definition, self.user_id, started_at)?;

        let mut countdown = Countdown::new(Arc::clone(&self.clock))
            .with_tick_interval(self.config.tick_interval);
        if let Some(secs) = self.config.low_time_warning_secs {
            countdown = countdown.with_low_time_warning(secs);
        }

        let attempt = Attempt::new(
            self.definition,
            session,
            self.clock,
            self.sink,
            self.policy,
            countdown,
        );
        attempt.start_countdown();

        tracing::info!(
            key = %attempt.key(),
            duration_minutes = attempt.definition().duration_minutes,
            "attempt started"
        );
        Ok(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use crate::countdown::CountdownPhase;
    use crate::error::SubmitError;
    use crate::model::{OptionKey, TestQuestion};
    use crate::report::SubmitTrigger;
    use crate::submission::{SubmissionPhase, SubmitOutcome};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Definitions(HashMap<String, TestDefinition>);

    #[async_trait]
    impl DefinitionProvider for Definitions {
        async fn fetch(&self, test_code: &str) -> Result<Option<TestDefinition>, StoreError> {
            Ok(self.0.get(test_code).cloned())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        stored: Mutex<HashMap<AttemptKey, TestResultSummary>>,
        calls: AtomicU32,
        fail_next: AtomicU32,
    }

    #[async_trait]
    impl ReportSink for RecordingSink {
        async fn put(&self, key: &AttemptKey, summary: &TestResultSummary) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Unavailable("injected".into()));
            }
            self.stored
                .lock()
                .unwrap()
                .insert(key.clone(), summary.clone());
            Ok(())
        }

        async fn get(&self, key: &AttemptKey) -> Result<Option<TestResultSummary>, StoreError> {
            Ok(self.stored.lock().unwrap().get(key).cloned())
        }
    }

    fn question(id: &str, correct: OptionKey) -> TestQuestion {
        TestQuestion {
            id: id.into(),
            text: format!("Question {id}"),
            options: ["w".into(), "x".into(), "y".into(), "z".into()],
            correct_option: correct,
            marks: 4,
            explanation: None,
        }
    }

    fn mock_test(questions: Vec<TestQuestion>) -> TestDefinition {
        TestDefinition {
            code: "mock-1".into(),
            title: "Mock test".into(),
            duration_minutes: 1,
            questions,
        }
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn engine(definition: TestDefinition, sink: Arc<RecordingSink>) -> SessionEngine {
        let definitions = Definitions(HashMap::from([(definition.code.clone(), definition)]));
        SessionEngine::new(Arc::new(definitions), sink, AttemptConfig::default())
            .with_clock(Arc::new(MonotonicClock::anchored_at(epoch())))
    }

    fn two_questions() -> TestDefinition {
        mock_test(vec![question("q0", OptionKey::A), question("q1", OptionKey::C)])
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_code_is_not_found() {
        let engine = engine(two_questions(), Arc::default());
        let err = engine.prepare("nope", "u1").await.err().unwrap();
        assert!(matches!(err, SessionError::DefinitionNotFound(code) if code == "nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_test_is_rejected_before_the_clock_starts() {
        let engine = engine(mock_test(Vec::new()), Arc::default());
        let err = engine.prepare("mock-1", "u1").await.err().unwrap();
        assert!(matches!(err, SessionError::EmptyQuestionSet(code) if code == "mock-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn prepared_attempt_does_not_tick() {
        let engine = engine(two_questions(), Arc::default());
        let prepared = engine.prepare("mock-1", "u1").await.unwrap();
        assert_eq!(prepared.definition().question_count(), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let attempt = prepared.begin().unwrap();
        assert_eq!(attempt.key().started_at, epoch() + chrono::Duration::seconds(30));
        assert_eq!(attempt.countdown().phase, CountdownPhase::Running);
        assert_eq!(attempt.countdown().remaining_secs, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_auto_submits_exactly_once() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(two_questions(), Arc::clone(&sink));
        let attempt = engine.prepare("mock-1", "u1").await.unwrap().begin().unwrap();
        attempt.select_option(0, OptionKey::A);

        let mut phase = attempt.subscribe_phase();
        phase
            .wait_for(|p| *p == SubmissionPhase::Persisted)
            .await
            .unwrap();

        // A late duplicate expiry must not reach the sink again.
        let again = attempt.submit(SubmitTrigger::Auto).await.unwrap();
        assert!(matches!(again, SubmitOutcome::Ignored(SubmissionPhase::Persisted)));
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        let stored = engine.load_result(attempt.key()).await.unwrap().unwrap();
        assert_eq!(stored.trigger, SubmitTrigger::Auto);
        assert_eq!(stored.score, 4);
        assert_eq!(stored.time_taken_minutes, 1);
        assert_eq!(attempt.countdown().phase, CountdownPhase::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_submits_write_once() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(two_questions(), Arc::clone(&sink));
        let attempt = engine.prepare("mock-1", "u1").await.unwrap().begin().unwrap();

        let outcomes = futures::future::join_all(
            (0..4).map(|_| attempt.submit(SubmitTrigger::Manual)),
        )
        .await;

        let persisted = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(SubmitOutcome::Persisted(_))))
            .count();
        assert_eq!(persisted, 1);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(attempt.countdown().phase, CountdownPhase::Cancelled);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_resends_the_frozen_summary() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail_next.store(1, Ordering::SeqCst);
        let engine = engine(two_questions(), Arc::clone(&sink));
        let attempt = engine.prepare("mock-1", "u1").await.unwrap().begin().unwrap();
        attempt.select_option(0, OptionKey::A);
        attempt.select_option(1, OptionKey::B);

        let err = attempt.submit(SubmitTrigger::Manual).await.unwrap_err();
        assert!(matches!(err, SubmitError::PersistenceFailure { .. }));
        assert!(err.is_retryable());
        assert_eq!(attempt.phase(), SubmissionPhase::Failed);
        let frozen = attempt.pending_summary().unwrap();

        // Answers are locked while the retry is pending.
        assert!(!attempt.select_option(1, OptionKey::C));
        tokio::time::sleep(Duration::from_secs(90)).await;

        let outcome = attempt.submit(SubmitTrigger::Manual).await.unwrap();
        let SubmitOutcome::Persisted(saved) = outcome else {
            panic!("retry should persist");
        };
        assert_eq!(saved, frozen);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        let stored = engine.load_result(attempt.key()).await.unwrap().unwrap();
        assert_eq!(stored, frozen);
        assert_eq!(stored.score, 4);
        assert_eq!(stored.incorrect, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_submit_still_stores_the_result() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(two_questions(), Arc::clone(&sink));
        let attempt = engine.prepare("mock-1", "u1").await.unwrap().begin().unwrap();
        attempt.select_option(0, OptionKey::A);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            attempt.submit(SubmitTrigger::Manual),
        )
        .await;
        assert!(abandoned.is_err());

        let settled = *attempt
            .subscribe_phase()
            .wait_for(|p| p.is_settled())
            .await
            .unwrap();
        assert_eq!(settled, SubmissionPhase::Persisted);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);

        let again = attempt.submit(SubmitTrigger::Manual).await.unwrap();
        assert!(matches!(again, SubmitOutcome::Ignored(SubmissionPhase::Persisted)));
        let stored = engine.load_result(attempt.key()).await.unwrap().unwrap();
        assert_eq!(stored.score, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_failed_submit_can_be_retried() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail_next.store(1, Ordering::SeqCst);
        let engine = engine(two_questions(), Arc::clone(&sink));
        let attempt = engine.prepare("mock-1", "u1").await.unwrap().begin().unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            attempt.submit(SubmitTrigger::Manual),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(attempt.phase(), SubmissionPhase::Failed);

        let outcome = attempt.submit(SubmitTrigger::Manual).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Persisted(_)));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert!(engine.load_result(attempt.key()).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_is_rejected_after_submit() {
        let engine = engine(two_questions(), Arc::default());
        let attempt = engine.prepare("mock-1", "u1").await.unwrap().begin().unwrap();
        assert!(attempt.next());
        attempt.submit(SubmitTrigger::Manual).await.unwrap();

        assert!(!attempt.previous());
        assert!(!attempt.toggle_mark_for_review(0));
        assert_eq!(attempt.current_index(), 1);
        assert!(attempt.state().is_frozen());
    }
}
