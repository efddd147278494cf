//! Core data model types for proctor.
//!
//! Test definitions, questions, option keys and the per-question status
//! enum whose transition table drives the whole session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of options every question carries.
pub const OPTION_COUNT: usize = 4;

/// One of the four answer options of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionKey {
    A,
    B,
    C,
    D,
}

impl OptionKey {
    /// All keys in display order.
    pub const ALL: [OptionKey; OPTION_COUNT] = [OptionKey::A, OptionKey::B, OptionKey::C, OptionKey::D];

    /// Position of this key in a question's option array.
    pub fn index(self) -> usize {
        match self {
            OptionKey::A => 0,
            OptionKey::B => 1,
            OptionKey::C => 2,
            OptionKey::D => 3,
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKey::A => write!(f, "A"),
            OptionKey::B => write!(f, "B"),
            OptionKey::C => write!(f, "C"),
            OptionKey::D => write!(f, "D"),
        }
    }
}

impl FromStr for OptionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(OptionKey::A),
            "B" => Ok(OptionKey::B),
            "C" => Ok(OptionKey::C),
            "D" => Ok(OptionKey::D),
            other => Err(format!("unknown option key: {other}")),
        }
    }
}

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestQuestion {
    /// Stable identifier, unique within a test.
    pub id: String,
    /// Question prompt as authored (may contain math markup).
    #[serde(default)]
    pub text: String,
    /// Option texts, indexed by `OptionKey::index`.
    pub options: [String; OPTION_COUNT],
    /// The key of the correct option.
    pub correct_option: OptionKey,
    /// Marks awarded for a correct answer. Always positive.
    pub marks: u32,
    /// Worked solution shown in the review view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// A complete, read-only test definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Test code used to look the definition up.
    pub code: String,
    /// Human-readable title.
    #[serde(default)]
    pub title: String,
    /// Total time allowed for an attempt.
    pub duration_minutes: u32,
    /// Questions in presentation order.
    pub questions: Vec<TestQuestion>,
}

impl TestDefinition {
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Sum of marks over every question.
    pub fn total_marks(&self) -> u64 {
        self.questions.iter().map(|q| u64::from(q.marks)).sum()
    }

    pub fn duration_seconds(&self) -> u64 {
        u64::from(self.duration_minutes) * 60
    }
}

/// Per-question progress status shown in the question palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    NotVisited,
    Unanswered,
    Answered,
    MarkedForReview,
    AnsweredAndMarked,
}

impl QuestionStatus {
    /// Whether this status implies a recorded answer.
    pub fn has_answer(self) -> bool {
        matches!(self, QuestionStatus::Answered | QuestionStatus::AnsweredAndMarked)
    }

    /// Status after an option is selected. Never drops to `Unanswered`.
    pub fn on_select(self) -> Self {
        match self {
            QuestionStatus::MarkedForReview | QuestionStatus::AnsweredAndMarked => {
                QuestionStatus::AnsweredAndMarked
            }
            _ => QuestionStatus::Answered,
        }
    }

    /// Status after the response is cleared.
    pub fn on_clear(self) -> Self {
        match self {
            QuestionStatus::AnsweredAndMarked => QuestionStatus::MarkedForReview,
            _ => QuestionStatus::Unanswered,
        }
    }

    /// Status after the review flag is toggled.
    pub fn on_toggle_mark(self) -> Self {
        match self {
            QuestionStatus::Answered => QuestionStatus::AnsweredAndMarked,
            QuestionStatus::AnsweredAndMarked => QuestionStatus::Answered,
            QuestionStatus::MarkedForReview => QuestionStatus::Unanswered,
            QuestionStatus::Unanswered | QuestionStatus::NotVisited => {
                QuestionStatus::MarkedForReview
            }
        }
    }

    /// Status once the question has been shown to the candidate.
    pub fn on_visit(self) -> Self {
        match self {
            QuestionStatus::NotVisited => QuestionStatus::Unanswered,
            other => other,
        }
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionStatus::NotVisited => write!(f, "not visited"),
            QuestionStatus::Unanswered => write!(f, "not answered"),
            QuestionStatus::Answered => write!(f, "answered"),
            QuestionStatus::MarkedForReview => write!(f, "marked for review"),
            QuestionStatus::AnsweredAndMarked => write!(f, "answered & marked"),
        }
    }
}

/// One question's entry in a frozen session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAnswer {
    pub question_id: String,
    pub selected_option: Option<OptionKey>,
    pub status: QuestionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_key_display_and_parse() {
        assert_eq!(OptionKey::C.to_string(), "C");
        assert_eq!("a".parse::<OptionKey>().unwrap(), OptionKey::A);
        assert_eq!(" d ".parse::<OptionKey>().unwrap(), OptionKey::D);
        assert!("e".parse::<OptionKey>().is_err());
        assert!("".parse::<OptionKey>().is_err());
    }

    #[test]
    fn option_key_index_matches_all_order() {
        for (i, key) in OptionKey::ALL.iter().enumerate() {
            assert_eq!(key.index(), i);
        }
    }

    #[test]
    fn select_transitions() {
        use QuestionStatus::*;
        assert_eq!(NotVisited.on_select(), Answered);
        assert_eq!(Unanswered.on_select(), Answered);
        assert_eq!(Answered.on_select(), Answered);
        assert_eq!(MarkedForReview.on_select(), AnsweredAndMarked);
        assert_eq!(AnsweredAndMarked.on_select(), AnsweredAndMarked);
    }

    #[test]
    fn clear_transitions() {
        use QuestionStatus::*;
        assert_eq!(AnsweredAndMarked.on_clear(), MarkedForReview);
        assert_eq!(Answered.on_clear(), Unanswered);
        assert_eq!(MarkedForReview.on_clear(), Unanswered);
        assert_eq!(NotVisited.on_clear(), Unanswered);
    }

    #[test]
    fn toggle_mark_cycles() {
        use QuestionStatus::*;
        assert_eq!(Answered.on_toggle_mark(), AnsweredAndMarked);
        assert_eq!(AnsweredAndMarked.on_toggle_mark(), Answered);
        assert_eq!(MarkedForReview.on_toggle_mark(), Unanswered);
        assert_eq!(Unanswered.on_toggle_mark(), MarkedForReview);
        assert_eq!(NotVisited.on_toggle_mark(), MarkedForReview);
    }

    #[test]
    fn total_marks_sums_questions() {
        let def = TestDefinition {
            code: "t".into(),
            title: String::new(),
            duration_minutes: 3,
            questions: vec![
                TestQuestion {
                    id: "q1".into(),
                    text: String::new(),
                    options: ["1".into(), "2".into(), "3".into(), "4".into()],
                    correct_option: OptionKey::A,
                    marks: 4,
                    explanation: None,
                },
                TestQuestion {
                    id: "q2".into(),
                    text: String::new(),
                    options: ["1".into(), "2".into(), "3".into(), "4".into()],
                    correct_option: OptionKey::B,
                    marks: 2,
                    explanation: None,
                },
            ],
        };
        assert_eq!(def.total_marks(), 6);
        assert_eq!(def.question_count(), 2);
        assert_eq!(def.duration_seconds(), 180);
    }
}
