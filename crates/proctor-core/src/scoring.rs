//! Grading of frozen session snapshots.
//!
//! [`score`] is pure: the same definition and snapshot always produce the
//! same summary, which is what makes a failed save safe to retry.

use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::model::{TestDefinition, TestQuestion};
use crate::report::{DetailedAnswer, SubmitTrigger, TestResultSummary};
use crate::session::FrozenSession;

/// How a single question was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerOutcome {
    Correct,
    Incorrect,
    Unanswered,
}

/// Maps a question's outcome to the marks it contributes.
pub trait MarkingPolicy: Send + Sync {
    fn name(&self) -> &str;

    fn award(&self, question: &TestQuestion, outcome: AnswerOutcome) -> i64;
}

/// Full marks for a correct answer, nothing otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardMarking;

impl MarkingPolicy for StandardMarking {
    fn name(&self) -> &str {
        "standard"
    }

    fn award(&self, question: &TestQuestion, outcome: AnswerOutcome) -> i64 {
        match outcome {
            AnswerOutcome::Correct => i64::from(question.marks),
            AnswerOutcome::Incorrect | AnswerOutcome::Unanswered => 0,
        }
    }
}

/// Grade `snapshot` against `definition` using `policy`.
pub fn score(
    definition: &TestDefinition,
    snapshot: &FrozenSession,
    trigger: SubmitTrigger,
    policy: &dyn MarkingPolicy,
) -> Result<TestResultSummary, ScoringError> {
    if snapshot.answers.len() != definition.questions.len() {
        return Err(ScoringError::LengthMismatch {
            questions: definition.questions.len(),
            answers: snapshot.answers.len(),
        });
    }

    let mut attempted = 0usize;
    let mut correct = 0usize;
    let mut total_score = 0i64;
    let mut detailed_answers = Vec::with_capacity(definition.questions.len());

    for (question, answer) in definition.questions.iter().zip(&snapshot.answers) {
        let outcome = match answer.selected_option {
            None => AnswerOutcome::Unanswered,
            Some(selected) if selected == question.correct_option => AnswerOutcome::Correct,
            Some(_) => AnswerOutcome::Incorrect,
        };
        if outcome != AnswerOutcome::Unanswered {
            attempted += 1;
        }
        let is_correct = outcome == AnswerOutcome::Correct;
        if is_correct {
            correct += 1;
        }
        let awarded = policy.award(question, outcome);
        total_score += awarded;

        detailed_answers.push(DetailedAnswer {
            question_id: question.id.clone(),
            text: question.text.clone(),
            options: question.options.clone(),
            selected_option: answer.selected_option,
            correct_option: question.correct_option,
            status: answer.status,
            is_correct,
            marks: question.marks,
            marks_awarded: awarded,
            explanation: question.explanation.clone(),
        });
    }

    let total_questions = definition.questions.len();
    let total_marks = definition.total_marks();
    let elapsed_ms = (snapshot.ended_at - snapshot.started_at).num_milliseconds();

    Ok(TestResultSummary {
        test_code: snapshot.test_code.clone(),
        user_id: snapshot.user_id.clone(),
        attempt_timestamp: snapshot.started_at,
        submitted_at: snapshot.ended_at,
        trigger,
        total_questions,
        attempted,
        correct,
        incorrect: attempted - correct,
        unanswered: total_questions - attempted,
        score: total_score,
        total_marks,
        percentage: percentage(total_score, total_marks),
        time_taken_minutes: (elapsed_ms as f64 / 60_000.0).round() as i64,
        detailed_answers,
    })
}

/// `100 × score / total`, rounded to two decimals; zero when nothing is
/// at stake.
pub fn percentage(score: i64, total_marks: u64) -> f64 {
    if total_marks == 0 {
        return 0.0;
    }
    let raw = score as f64 * 100.0 / total_marks as f64;
    (raw * 100.0).round() / 100.0
}
