//! The `proctor init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("proctor.toml").exists() {
        println!("proctor.toml already exists, skipping.");
    } else {
        std::fs::write("proctor.toml", SAMPLE_CONFIG)?;
        println!("Created proctor.toml");
    }

    std::fs::create_dir_all("tests")?;
    let sample_path = Path::new("tests/sample.toml");
    if sample_path.exists() {
        println!("tests/sample.toml already exists, skipping.");
    } else {
        std::fs::write(sample_path, SAMPLE_TEST)?;
        println!("Created tests/sample.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: proctor validate --definition tests/sample.toml");
    println!("  2. Run: proctor take --test sample");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# proctor configuration

definitions_dir = "./tests"
reports_dir = "./proctor-results"
user_id = "candidate"
tick_interval_ms = 1000
low_time_warning_secs = 300
"#;

const SAMPLE_TEST: &str = r#"[test]
code = "sample"
title = "Sample Test"
duration_minutes = 10

[[questions]]
id = "q1"
text = "What is 2 + 2?"
options = ["3", "4", "5", "22"]
correct = "B"
marks = 4
explanation = "Two plus two is four."

[[questions]]
id = "q2"
text = "Which planet is closest to the Sun?"
options = ["Venus", "Earth", "Mercury", "Mars"]
correct = "C"
marks = 4

[[questions]]
id = "q3"
text = "Water boils at sea level at how many degrees Celsius?"
options = ["90", "100", "110", "120"]
correct = "B"
marks = 4
explanation = "At one atmosphere water boils at 100 degrees Celsius."
"#;
