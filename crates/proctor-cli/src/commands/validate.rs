//! The `proctor validate` command.

use std::path::PathBuf;

use anyhow::Result;

use proctor_core::parser;

pub fn execute(definition_path: PathBuf) -> Result<()> {
    let definitions = if definition_path.is_dir() {
        parser::load_definition_directory(&definition_path)?
    } else {
        vec![parser::parse_definition(&definition_path)?]
    };

    let mut total_warnings = 0;

    for definition in &definitions {
        println!(
            "Test: {} [{}] ({} questions, {} marks, {} minutes)",
            definition.title,
            definition.code,
            definition.question_count(),
            definition.total_marks(),
            definition.duration_minutes
        );

        let warnings = parser::validate_definition(definition);
        for w in &warnings {
            let prefix = w
                .question_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if definitions.is_empty() {
        println!("No test definitions found.");
    } else if total_warnings == 0 {
        println!("All test definitions valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
