//! Result summary types and the attempt key they are stored under.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{OptionKey, QuestionStatus, OPTION_COUNT};

/// What started a submission. Grading is identical for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitTrigger {
    /// The candidate pressed submit.
    Manual,
    /// The countdown reached zero.
    Auto,
}

impl fmt::Display for SubmitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitTrigger::Manual => write!(f, "manual"),
            SubmitTrigger::Auto => write!(f, "auto"),
        }
    }
}

/// Identifies one attempt: `(test code, user, start timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptKey {
    pub test_code: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
}

impl AttemptKey {
    pub fn new(
        test_code: impl Into<String>,
        user_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            test_code: test_code.into(),
            user_id: user_id.into(),
            started_at,
        }
    }

    /// Rebuild a key from the values a results view is addressed by.
    pub fn from_millis(
        test_code: impl Into<String>,
        user_id: impl Into<String>,
        started_at_ms: i64,
    ) -> Option<Self> {
        let started_at = DateTime::from_timestamp_millis(started_at_ms)?;
        Some(Self::new(test_code, user_id, started_at))
    }

    /// Flat string form used as the storage key.
    ///
    /// `%` and `:` inside the code and user id are escaped, so distinct keys
    /// never share a string form.
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}",
            escape_key_part(&self.test_code),
            escape_key_part(&self.user_id),
            self.started_at.timestamp_millis()
        )
    }
}

fn escape_key_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for AttemptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Per-question record consumed by the review view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedAnswer {
    pub question_id: String,
    #[serde(default)]
    pub text: String,
    pub options: [String; OPTION_COUNT],
    pub selected_option: Option<OptionKey>,
    pub correct_option: OptionKey,
    pub status: QuestionStatus,
    pub is_correct: bool,
    /// Marks available for this question.
    pub marks: u32,
    /// Marks the marking policy awarded.
    pub marks_awarded: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Graded result of one attempt. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResultSummary {
    pub test_code: String,
    pub user_id: String,
    /// Start of the attempt; part of the storage key.
    pub attempt_timestamp: DateTime<Utc>,
    /// Freeze time of the session.
    pub submitted_at: DateTime<Utc>,
    pub trigger: SubmitTrigger,
    pub total_questions: usize,
    pub attempted: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub unanswered: usize,
    pub score: i64,
    pub total_marks: u64,
    /// `100 × score / total_marks`, two decimals.
    pub percentage: f64,
    pub time_taken_minutes: i64,
    pub detailed_answers: Vec<DetailedAnswer>,
}

impl TestResultSummary {
    pub fn key(&self) -> AttemptKey {
        AttemptKey::new(
            self.test_code.clone(),
            self.user_id.clone(),
            self.attempt_timestamp,
        )
    }

    /// Render the summary and per-question breakdown as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!("## Result: {}\n\n", self.test_code));
        md.push_str(&format!(
            "**Score:** {}/{} ({:.2}%), {} correct, {} incorrect, {} unanswered\n\n",
            self.score,
            self.total_marks,
            self.percentage,
            self.correct,
            self.incorrect,
            self.unanswered
        ));
        md.push_str(&format!(
            "Submitted {} ({}), {} min taken\n\n",
            self.submitted_at.to_rfc3339(),
            self.trigger,
            self.time_taken_minutes
        ));

        md.push_str("| # | Question | Selected | Correct | Marks |\n");
        md.push_str("|---|----------|----------|---------|-------|\n");
        for (i, a) in self.detailed_answers.iter().enumerate() {
            let selected = a
                .selected_option
                .map(|k| k.to_string())
                .unwrap_or_else(|| "-".to_string());
            md.push_str(&format!(
                "| {} | {} | {} | {} | {}/{} |\n",
                i + 1,
                a.question_id,
                selected,
                a.correct_option,
                a.marks_awarded,
                a.marks
            ));
        }

        md
    }
}
