//! proctor CLI: take timed tests and review graded results.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "proctor", version, about = "Timed multiple-choice test sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a timed test
    Take {
        /// Test code to load from the definitions directory
        #[arg(long)]
        test: String,

        /// Candidate id (defaults to `user_id` from the config)
        #[arg(long)]
        user: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show a stored result
    Show {
        /// Test code
        #[arg(long)]
        test: String,

        /// Candidate id
        #[arg(long)]
        user: String,

        /// Attempt start time in Unix milliseconds
        #[arg(long)]
        started: i64,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate test definition TOML files
    Validate {
        /// Path to a definition file or directory
        #[arg(long)]
        definition: PathBuf,
    },

    /// Create starter config and a sample test
    Init,
}

#[tokio::main]
async fn main() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "proctor=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take { test, user, config } => commands::take::execute(test, user, config).await,
        Commands::Show {
            test,
            user,
            started,
            format,
            config,
        } => commands::show::execute(test, user, started, format, config).await,
        Commands::Validate { definition } => commands::validate::execute(definition),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }

    // An unfinished blocking stdin read would otherwise hold the runtime open.
    process::exit(0);
}
