//! The `proctor take` command.
//!
//! Reads one command per line from stdin while the countdown runs. Closing
//! stdin submits the attempt.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Table};
use tokio::io::{AsyncBufReadExt, BufReader};

use proctor_core::attempt::Attempt;
use proctor_core::countdown::CountdownPhase;
use proctor_core::engine::SessionEngine;
use proctor_core::model::{OptionKey, TestDefinition};
use proctor_core::report::SubmitTrigger;
use proctor_core::submission::{SubmissionPhase, SubmitOutcome};
use proctor_store::{load_config_from, DefinitionDirectory, JsonReportStore};

use super::show::print_summary;

/// One line of candidate input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Answer(OptionKey),
    Clear,
    Mark,
    Next,
    Previous,
    Goto(usize),
    List,
    Submit,
    Help,
    Show,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(Command::Show);
    };
    let arg = parts.next();

    match (verb.to_ascii_lowercase().as_str(), arg) {
        ("a", Some(key)) => key.parse().map(Command::Answer),
        ("a", None) => Err("usage: a <A|B|C|D>".into()),
        ("c", None) => Ok(Command::Clear),
        ("m", None) => Ok(Command::Mark),
        ("n", None) => Ok(Command::Next),
        ("p", None) => Ok(Command::Previous),
        ("g", Some(n)) => match n.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(Command::Goto(n - 1)),
            _ => Err(format!("not a question number: {n}")),
        },
        ("g", None) => Err("usage: g <question number>".into()),
        ("l", None) => Ok(Command::List),
        ("s", None) => Ok(Command::Submit),
        ("h" | "?", None) => Ok(Command::Help),
        _ => Err(format!("unknown command: {}", line.trim())),
    }
}

pub async fn execute(
    test: String,
    user: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let user_id = user.unwrap_or_else(|| config.user_id.clone());

    let engine = SessionEngine::new(
        Arc::new(DefinitionDirectory::new(&config.definitions_dir)),
        Arc::new(JsonReportStore::new(&config.reports_dir)),
        config.attempt_config(),
    );

    let prepared = engine.prepare(&test, &user_id).await?;
    print_instructions(prepared.definition());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    if lines.next_line().await?.is_none() {
        anyhow::bail!("input closed before the test started; nothing was recorded");
    }

    let attempt = prepared.begin()?;
    print_question(&attempt);

    let mut countdown = attempt.subscribe_countdown();
    let mut phase = attempt.subscribe_phase();
    let mut input_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                let Some(line) = line? else {
                    input_open = false;
                    println!("End of input, submitting.");
                    if submit(&attempt).await? {
                        break;
                    }
                    let settled = *phase.wait_for(|p| p.is_settled()).await?;
                    if settled == SubmissionPhase::Persisted {
                        print_result(&attempt);
                        break;
                    }
                    anyhow::bail!(
                        "result for {} could not be saved and no more input is available",
                        attempt.key()
                    );
                };

                match parse_command(&line) {
                    Ok(Command::Submit) => {
                        if submit(&attempt).await? {
                            break;
                        }
                    }
                    Ok(command) => run_command(&attempt, command),
                    Err(message) => println!("{message} (h for help)"),
                }
            }
            changed = phase.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *phase.borrow_and_update();
                match current {
                    SubmissionPhase::Persisted => {
                        print_result(&attempt);
                        break;
                    }
                    SubmissionPhase::Failed => {
                        println!("could not save, please retry (s to submit again)");
                    }
                    SubmissionPhase::Open | SubmissionPhase::InFlight => {}
                }
            }
            changed = countdown.changed() => {
                if changed.is_ok() && countdown.borrow_and_update().phase == CountdownPhase::Expired {
                    println!("\nTime is up, submitting.");
                }
            }
        }
    }

    Ok(())
}

fn print_result(attempt: &Attempt) {
    if let Some(summary) = attempt.pending_summary() {
        println!("\nTest submitted.");
        print_summary(&summary);
        println!("Attempt key: {}", attempt.key());
    }
}

/// Submit manually. Returns `true` once the result is stored.
async fn submit(attempt: &Attempt) -> Result<bool> {
    match attempt.submit(SubmitTrigger::Manual).await {
        Ok(SubmitOutcome::Persisted(_)) => {
            print_result(attempt);
            Ok(true)
        }
        Ok(SubmitOutcome::Ignored(SubmissionPhase::Persisted)) => Ok(true),
        Ok(SubmitOutcome::Ignored(_)) => {
            println!("Submission already in progress.");
            Ok(false)
        }
        Err(e) if e.is_retryable() => {
            tracing::warn!("{e}");
            println!("could not save, please retry (s to submit again)");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn run_command(attempt: &Attempt, command: Command) {
    let index = attempt.current_index();
    let accepted = match command {
        Command::Answer(option) => attempt.select_option(index, option),
        Command::Clear => attempt.clear_response(index),
        Command::Mark => attempt.toggle_mark_for_review(index),
        Command::Next => attempt.next(),
        Command::Previous => attempt.previous(),
        Command::Goto(target) => attempt.navigate_to(target),
        Command::List => {
            print_palette(attempt);
            return;
        }
        Command::Help => {
            print_help();
            return;
        }
        Command::Show | Command::Submit => true,
    };

    if !accepted {
        println!("Nothing changed.");
    }
    print_question(attempt);
}

fn print_instructions(definition: &TestDefinition) {
    println!("{} [{}]", definition.title, definition.code);
    println!(
        "{} questions, {} marks, {} minutes.",
        definition.question_count(),
        definition.total_marks(),
        definition.duration_minutes
    );
    println!("The test is submitted automatically when time runs out.");
    print_help();
    println!("\nPress Enter to start.");
}

fn print_help() {
    println!("Commands:");
    println!("  a <key>  answer the current question (A-D)");
    println!("  c        clear the answer");
    println!("  m        mark or unmark for review");
    println!("  n / p    next / previous question");
    println!("  g <n>    go to question n");
    println!("  l        list all questions");
    println!("  s        submit");
}

fn print_question(attempt: &Attempt) {
    let index = attempt.current_index();
    let Some(question) = attempt.definition().questions.get(index) else {
        return;
    };
    let state = attempt.state();
    let remaining = attempt.countdown().remaining_secs;

    println!(
        "\nQuestion {}/{} [{}] {:02}:{:02} left",
        index + 1,
        state.len(),
        state.status(index).map(|s| s.to_string()).unwrap_or_default(),
        remaining / 60,
        remaining % 60
    );
    println!("{}", question.text);
    for (key, text) in OptionKey::ALL.iter().zip(&question.options) {
        let marker = if state.answer(index) == Some(*key) { "*" } else { " " };
        println!(" {marker}{key}) {text}");
    }
}

fn print_palette(attempt: &Attempt) {
    let state = attempt.state();
    let mut table = Table::new();
    table.set_header(vec!["#", "Status", "Answer"]);

    for (i, status) in state.statuses().iter().enumerate() {
        let answer = state
            .answer(i)
            .map(|o| o.to_string())
            .unwrap_or_else(|| "-".to_string());
        let number = if i == state.current_index() {
            format!("> {}", i + 1)
        } else {
            (i + 1).to_string()
        };
        table.add_row(vec![Cell::new(number), Cell::new(status), Cell::new(answer)]);
    }

    println!("{table}");
    let counts = attempt.status_counts();
    println!(
        "answered {}, answered and marked {}, marked {}, unanswered {}, not visited {}",
        counts.answered,
        counts.answered_and_marked,
        counts.marked_for_review,
        counts.unanswered,
        counts.not_visited
    );
}
