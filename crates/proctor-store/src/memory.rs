//! In-memory store for tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use proctor_core::error::StoreError;
use proctor_core::model::TestDefinition;
use proctor_core::report::{AttemptKey, TestResultSummary};
use proctor_core::traits::{DefinitionProvider, ReportSink};

/// Holds definitions and results in memory.
///
/// Counts `put` calls and can be told to reject the next few writes, which
/// makes it useful for exercising the submission retry path.
#[derive(Default)]
pub struct MemoryStore {
    definitions: Mutex<HashMap<String, TestDefinition>>,
    reports: Mutex<HashMap<AttemptKey, TestResultSummary>>,
    put_count: AtomicU32,
    failing_puts: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that serves the given definitions.
    pub fn with_definitions(definitions: impl IntoIterator<Item = TestDefinition>) -> Self {
        let store = Self::new();
        for definition in definitions {
            store.insert_definition(definition);
        }
        store
    }

    pub fn insert_definition(&self, definition: TestDefinition) {
        lock(&self.definitions).insert(definition.code.clone(), definition);
    }

    /// Reject the next `n` calls to `put` with [`StoreError::Unavailable`].
    pub fn fail_next_puts(&self, n: u32) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Number of `put` calls received, failed ones included.
    pub fn put_count(&self) -> u32 {
        self.put_count.load(Ordering::SeqCst)
    }

    /// Number of stored results.
    pub fn report_count(&self) -> usize {
        lock(&self.reports).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl DefinitionProvider for MemoryStore {
    async fn fetch(&self, test_code: &str) -> Result<Option<TestDefinition>, StoreError> {
        Ok(lock(&self.definitions).get(test_code).cloned())
    }
}

#[async_trait]
impl ReportSink for MemoryStore {
    async fn put(&self, key: &AttemptKey, summary: &TestResultSummary) -> Result<(), StoreError> {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }

        let mut reports = lock(&self.reports);
        match reports.get(key) {
            Some(existing) if existing == summary => Ok(()),
            Some(_) => Err(StoreError::Conflict {
                key: key.storage_key(),
            }),
            None => {
                reports.insert(key.clone(), summary.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, key: &AttemptKey) -> Result<Option<TestResultSummary>, StoreError> {
        Ok(lock(&self.reports).get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use proctor_core::report::SubmitTrigger;

    fn summary(score: i64) -> TestResultSummary {
        TestResultSummary {
            test_code: "mock".into(),
            user_id: "u1".into(),
            attempt_timestamp: DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
            submitted_at: DateTime::from_timestamp_millis(1_700_000_600_000).unwrap(),
            trigger: SubmitTrigger::Manual,
            total_questions: 1,
            attempted: 1,
            correct: 1,
            incorrect: 0,
            unanswered: 0,
            score,
            total_marks: 4,
            percentage: 100.0,
            time_taken_minutes: 10,
            detailed_answers: vec![],
        }
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = MemoryStore::new();
        let s = summary(4);
        store.put(&s.key(), &s).await.unwrap();
        store.put(&s.key(), &s).await.unwrap();

        assert_eq!(store.put_count(), 2);
        assert_eq!(store.report_count(), 1);
        assert_eq!(store.get(&s.key()).await.unwrap(), Some(s));
    }

    #[tokio::test]
    async fn different_content_conflicts() {
        let store = MemoryStore::new();
        let first = summary(4);
        store.put(&first.key(), &first).await.unwrap();

        let err = store.put(&first.key(), &summary(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.get(&first.key()).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn keys_with_colons_do_not_collide() {
        let store = MemoryStore::new();
        let first = TestResultSummary {
            test_code: "mock:1".into(),
            ..summary(4)
        };
        let second = TestResultSummary {
            test_code: "mock".into(),
            user_id: "1:u1".into(),
            ..summary(0)
        };

        store.put(&first.key(), &first).await.unwrap();
        store.put(&second.key(), &second).await.unwrap();

        assert_eq!(store.report_count(), 2);
        let fetched = store.get(&second.key()).await.unwrap().unwrap();
        assert_eq!(fetched.user_id, "1:u1");
        assert_eq!(store.get(&first.key()).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_puts(2);
        let s = summary(4);

        assert!(store.put(&s.key(), &s).await.unwrap_err().is_retryable());
        assert!(store.put(&s.key(), &s).await.is_err());
        store.put(&s.key(), &s).await.unwrap();
        assert_eq!(store.put_count(), 3);
    }

    #[tokio::test]
    async fn fetch_unknown_code() {
        let store = MemoryStore::new();
        assert!(store.fetch("missing").await.unwrap().is_none());
    }
}
