//! TOML test definition parser.
//!
//! Loads test definitions from TOML files and directories, and validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{OptionKey, TestDefinition, TestQuestion, OPTION_COUNT};

#[derive(Debug, Deserialize)]
struct TomlDefinitionFile {
    test: TomlTestHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlTestHeader {
    code: String,
    #[serde(default)]
    title: String,
    duration_minutes: u32,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    #[serde(default)]
    text: String,
    options: Vec<String>,
    correct: String,
    #[serde(default = "default_marks")]
    marks: u32,
    #[serde(default)]
    explanation: Option<String>,
}

fn default_marks() -> u32 {
    1
}

/// Parse a single TOML file into a `TestDefinition`.
pub fn parse_definition(path: &Path) -> Result<TestDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read test definition: {}", path.display()))?;

    parse_definition_str(&content, path)
}

/// Parse a TOML string into a `TestDefinition`.
pub fn parse_definition_str(content: &str, source_path: &Path) -> Result<TestDefinition> {
    let parsed: TomlDefinitionFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let questions = parsed
        .questions
        .into_iter()
        .map(|q| {
            let option_count = q.options.len();
            let options: [String; OPTION_COUNT] = q.options.try_into().map_err(|_| {
                anyhow::anyhow!(
                    "question {}: expected {OPTION_COUNT} options, found {option_count}",
                    q.id
                )
            })?;

            let correct_option: OptionKey = q
                .correct
                .parse()
                .map_err(|e: String| anyhow::anyhow!("question {}: {}", q.id, e))?;

            if q.marks == 0 {
                anyhow::bail!("question {}: marks must be positive", q.id);
            }

            Ok(TestQuestion {
                id: q.id,
                text: q.text,
                options,
                correct_option,
                marks: q.marks,
                explanation: q.explanation,
            })
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("invalid test definition: {}", source_path.display()))?;

    Ok(TestDefinition {
        code: parsed.test.code,
        title: parsed.test.title,
        duration_minutes: parsed.test.duration_minutes,
        questions,
    })
}

/// Recursively load all `.toml` test definitions from a directory.
///
/// Files that fail to parse are skipped with a warning.
pub fn load_definition_directory(dir: &Path) -> Result<Vec<TestDefinition>> {
    let mut definitions = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();

        if path.is_dir() {
            definitions.extend(load_definition_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_definition(&path) {
                Ok(definition) => definitions.push(definition),
                Err(e) => tracing::warn!("skipping {}: {:#}", path.display(), e),
            }
        }
    }

    definitions.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(definitions)
}

/// A non-fatal problem found in a test definition.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    pub message: String,
}

/// Validate a test definition for common authoring mistakes.
pub fn validate_definition(definition: &TestDefinition) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if definition.duration_minutes == 0 {
        warnings.push(ValidationWarning {
            question_id: None,
            message: "duration_minutes is 0; attempts expire immediately".into(),
        });
    }

    if definition.questions.is_empty() {
        warnings.push(ValidationWarning {
            question_id: None,
            message: "test has no questions and cannot be started".into(),
        });
    }

    let mut seen_ids = HashSet::new();
    for question in &definition.questions {
        if !seen_ids.insert(&question.id) {
            warnings.push(ValidationWarning {
                question_id: Some(question.id.clone()),
                message: format!("duplicate question ID: {}", question.id),
            });
        }
    }

    for question in &definition.questions {
        let mut seen_text = HashSet::new();
        for (key, text) in OptionKey::ALL.iter().zip(&question.options) {
            if !seen_text.insert(text.trim()) {
                warnings.push(ValidationWarning {
                    question_id: Some(question.id.clone()),
                    message: format!("option {key} repeats an earlier option's text"),
                });
            }
        }
    }

    warnings
}
