//! Collaborator traits for definition lookup and result storage.
//!
//! Implemented by the `proctor-store` crate.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::TestDefinition;
use crate::report::{AttemptKey, TestResultSummary};

/// Resolves a test code to its definition.
#[async_trait]
pub trait DefinitionProvider: Send + Sync {
    /// `Ok(None)` when no test has this code.
    async fn fetch(&self, test_code: &str) -> Result<Option<TestDefinition>, StoreError>;
}

/// Durable storage for graded results.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Store `summary` under `key`.
    ///
    /// Must be idempotent: storing an identical summary under an existing
    /// key succeeds. A different summary under the same key is a
    /// [`StoreError::Conflict`].
    async fn put(&self, key: &AttemptKey, summary: &TestResultSummary) -> Result<(), StoreError>;

    /// Load the summary stored under `key`, if any.
    async fn get(&self, key: &AttemptKey) -> Result<Option<TestResultSummary>, StoreError>;
}
