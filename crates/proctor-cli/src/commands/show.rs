//! The `proctor show` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use proctor_core::report::{AttemptKey, TestResultSummary};
use proctor_core::traits::ReportSink;
use proctor_store::{load_config_from, JsonReportStore};

pub async fn execute(
    test: String,
    user: String,
    started_ms: i64,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = JsonReportStore::new(&config.reports_dir);

    let key = AttemptKey::from_millis(&test, &user, started_ms)
        .with_context(|| format!("invalid start timestamp: {started_ms}"))?;
    let summary = store
        .get(&key)
        .await
        .with_context(|| format!("failed to load result {key}"))?
        .with_context(|| format!("no result stored for {key}"))?;

    match format.as_str() {
        "markdown" | "md" => println!("{}", summary.to_markdown()),
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => {
            print_summary(&summary);
            println!();
            print_review(&summary);
        }
    }

    Ok(())
}

/// Print the headline numbers of a graded attempt.
pub fn print_summary(summary: &TestResultSummary) {
    let mut table = Table::new();
    table.set_header(vec!["Result", ""]);

    let rows = [
        ("Test", summary.test_code.clone()),
        ("Candidate", summary.user_id.clone()),
        (
            "Started",
            summary.attempt_timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        ("Submitted", format!("{} ({})", summary.submitted_at.format("%H:%M:%S UTC"), summary.trigger)),
        ("Score", format!("{}/{}", summary.score, summary.total_marks)),
        ("Percentage", format!("{:.2}%", summary.percentage)),
        ("Attempted", format!("{}/{}", summary.attempted, summary.total_questions)),
        ("Correct", summary.correct.to_string()),
        ("Incorrect", summary.incorrect.to_string()),
        ("Unanswered", summary.unanswered.to_string()),
        ("Time taken", format!("{} min", summary.time_taken_minutes)),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }

    println!("{table}");
}

/// Print the per-question breakdown.
pub fn print_review(summary: &TestResultSummary) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Your answer", "Correct", "Status", "Marks"]);

    for (i, answer) in summary.detailed_answers.iter().enumerate() {
        let selected = answer
            .selected_option
            .map(|o| o.to_string())
            .unwrap_or_else(|| "-".to_string());
        let verdict = if answer.is_correct { "ok" } else { "x" };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&answer.text),
            Cell::new(format!("{selected} {verdict}")),
            Cell::new(answer.correct_option),
            Cell::new(answer.status),
            Cell::new(format!("{}/{}", answer.marks_awarded, answer.marks)),
        ]);
    }

    println!("{table}");
}
