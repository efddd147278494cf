//! Session state machine.
//!
//! All answer, status and navigation state of an attempt lives in a single
//! [`SessionState`] value that only changes through [`SessionState::apply`].
//! The per-status transitions themselves are defined on
//! [`QuestionStatus`](crate::model::QuestionStatus).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::model::{OptionKey, QuestionStatus, TestDefinition, UserAnswer};

/// An input to the session reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SelectOption { index: usize, option: OptionKey },
    ClearResponse { index: usize },
    ToggleMarkForReview { index: usize },
    NavigateTo { index: usize },
    /// Stop accepting mutations. Emitted when submission begins.
    Freeze,
}

/// Answers, statuses and the current position of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    current_index: usize,
    answers: Vec<Option<OptionKey>>,
    statuses: Vec<QuestionStatus>,
    frozen: bool,
}

/// Question palette legend: how many questions are in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub not_visited: usize,
    pub unanswered: usize,
    pub answered: usize,
    pub marked_for_review: usize,
    pub answered_and_marked: usize,
}

impl SessionState {
    /// Create the state for `question_count` questions with the first one
    /// already visited.
    pub fn new(question_count: usize) -> Result<Self, SessionError> {
        if question_count == 0 {
            return Err(SessionError::EmptyQuestionSet(String::new()));
        }
        let mut statuses = vec![QuestionStatus::NotVisited; question_count];
        statuses[0] = statuses[0].on_visit();
        Ok(Self {
            current_index: 0,
            answers: vec![None; question_count],
            statuses,
            frozen: false,
        })
    }

    /// Apply an event. Returns `true` if the state changed.
    ///
    /// Out-of-range indexes and any event after [`SessionEvent::Freeze`]
    /// are ignored.
    pub fn apply(&mut self, event: SessionEvent) -> bool {
        if self.frozen {
            tracing::debug!(?event, "session frozen, ignoring event");
            return false;
        }
        match event {
            SessionEvent::SelectOption { index, option } => {
                if !self.in_range(index) {
                    return false;
                }
                let status = self.statuses[index].on_select();
                self.set_slot(index, Some(option), status)
            }
            SessionEvent::ClearResponse { index } => {
                if !self.in_range(index) {
                    return false;
                }
                let status = self.statuses[index].on_clear();
                self.set_slot(index, None, status)
            }
            SessionEvent::ToggleMarkForReview { index } => {
                if !self.in_range(index) {
                    return false;
                }
                let status = self.statuses[index].on_toggle_mark();
                self.set_slot(index, self.answers[index], status)
            }
            SessionEvent::NavigateTo { index } => {
                if !self.in_range(index) {
                    tracing::debug!(index, count = self.len(), "navigation out of range");
                    return false;
                }
                let leaving = self.current_index;
                let mut changed = false;
                if self.statuses[leaving] == QuestionStatus::NotVisited
                    && self.answers[leaving].is_none()
                {
                    self.statuses[leaving] = QuestionStatus::Unanswered;
                    changed = true;
                }
                let status = self.statuses[index].on_visit();
                changed |= self.set_slot(index, self.answers[index], status);
                changed |= leaving != index;
                self.current_index = index;
                changed
            }
            SessionEvent::Freeze => {
                self.frozen = true;
                true
            }
        }
    }

    /// Write one question's answer and status. Returns `true` if either
    /// differed.
    fn set_slot(
        &mut self,
        index: usize,
        answer: Option<OptionKey>,
        status: QuestionStatus,
    ) -> bool {
        let changed = self.answers[index] != answer || self.statuses[index] != status;
        self.answers[index] = answer;
        self.statuses[index] = status;
        changed
    }

    /// Reducer form of [`apply`](Self::apply).
    pub fn reduce(mut self, event: SessionEvent) -> Self {
        self.apply(event);
        self
    }

    pub fn select_option(&mut self, index: usize, option: OptionKey) -> bool {
        self.apply(SessionEvent::SelectOption { index, option })
    }

    pub fn clear_response(&mut self, index: usize) -> bool {
        self.apply(SessionEvent::ClearResponse { index })
    }

    pub fn toggle_mark_for_review(&mut self, index: usize) -> bool {
        self.apply(SessionEvent::ToggleMarkForReview { index })
    }

    pub fn navigate_to(&mut self, index: usize) -> bool {
        self.apply(SessionEvent::NavigateTo { index })
    }

    /// Move to the next question; no-op on the last one.
    pub fn next(&mut self) -> bool {
        self.navigate_to(self.current_index + 1)
    }

    /// Move to the previous question; no-op on the first one.
    pub fn previous(&mut self) -> bool {
        match self.current_index.checked_sub(1) {
            Some(index) => self.navigate_to(index),
            None => false,
        }
    }

    pub fn freeze(&mut self) -> bool {
        self.apply(SessionEvent::Freeze)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn answer(&self, index: usize) -> Option<OptionKey> {
        self.answers.get(index).copied().flatten()
    }

    pub fn status(&self, index: usize) -> Option<QuestionStatus> {
        self.statuses.get(index).copied()
    }

    pub fn answers(&self) -> &[Option<OptionKey>] {
        &self.answers
    }

    pub fn statuses(&self) -> &[QuestionStatus] {
        &self.statuses
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for status in &self.statuses {
            match status {
                QuestionStatus::NotVisited => counts.not_visited += 1,
                QuestionStatus::Unanswered => counts.unanswered += 1,
                QuestionStatus::Answered => counts.answered += 1,
                QuestionStatus::MarkedForReview => counts.marked_for_review += 1,
                QuestionStatus::AnsweredAndMarked => counts.answered_and_marked += 1,
            }
        }
        counts
    }

    fn in_range(&self, index: usize) -> bool {
        index < self.statuses.len()
    }
}

/// The aggregate root of one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSession {
    pub test_code: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    /// Set when the session freezes at submission time.
    pub ended_at: Option<DateTime<Utc>>,
    pub state: SessionState,
}

impl TestSession {
    /// Start a session for `definition`.
    pub fn start(
        definition: &TestDefinition,
        user_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let state = SessionState::new(definition.question_count())
            .map_err(|_| SessionError::EmptyQuestionSet(definition.code.clone()))?;
        Ok(Self {
            test_code: definition.code.clone(),
            user_id: user_id.into(),
            started_at,
            ended_at: None,
            state,
        })
    }

    /// Freeze the session and capture its answers.
    ///
    /// Returns `None` if the session was already frozen.
    pub fn freeze(&mut self, definition: &TestDefinition, now: DateTime<Utc>) -> Option<FrozenSession> {
        if !self.state.freeze() {
            return None;
        }
        self.ended_at = Some(now);
        Some(FrozenSession {
            test_code: self.test_code.clone(),
            user_id: self.user_id.clone(),
            started_at: self.started_at,
            ended_at: now,
            answers: self.user_answers(definition),
        })
    }

    /// Project the current state onto the definition's question ids.
    pub fn user_answers(&self, definition: &TestDefinition) -> Vec<UserAnswer> {
        definition
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| UserAnswer {
                question_id: q.id.clone(),
                selected_option: self.state.answer(i),
                status: self.state.status(i).unwrap_or(QuestionStatus::NotVisited),
            })
            .collect()
    }
}

/// Immutable snapshot taken when submission begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenSession {
    pub test_code: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub answers: Vec<UserAnswer>,
}
