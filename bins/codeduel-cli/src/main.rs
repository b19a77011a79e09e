mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use codeduel_common::types::Language;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codeduel-cli")]
#[command(about = "CodeDuel judge CLI - Run and judge submissions locally", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Judge a solution file against a JSON array of test cases
    Judge {
        /// Language (javascript/js, python/py, typescript/ts)
        #[arg(short, long)]
        language: Language,

        /// Path to the solution source file
        #[arg(short, long)]
        code: PathBuf,

        /// Path to a JSON file holding the test cases
        #[arg(short, long)]
        tests: PathBuf,

        /// Per-test time limit in milliseconds (defaults to JUDGE_TIME_LIMIT_MS)
        #[arg(long)]
        time_limit: Option<u64>,

        /// Print the redacted view a player would see
        #[arg(long, default_value = "false")]
        player_view: bool,
    },

    /// Run a solution once against a single JSON input
    Run {
        /// Language (javascript/js, python/py, typescript/ts)
        #[arg(short, long)]
        language: Language,

        /// Path to the solution source file
        #[arg(short, long)]
        code: PathBuf,

        /// JSON input passed to the entry point
        #[arg(short, long, default_value = "null")]
        input: String,

        /// Time limit in milliseconds (defaults to JUDGE_TIME_LIMIT_MS)
        #[arg(long)]
        time_limit: Option<u64>,
    },

    /// Check that the configured execution backend is reachable
    Health,

    /// List configured languages and their images
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Judge {
            language,
            code,
            tests,
            time_limit,
            player_view,
        } => {
            commands::judge(language, &code, &tests, time_limit, player_view).await?;
        }
        Commands::Run {
            language,
            code,
            input,
            time_limit,
        } => {
            commands::run(language, &code, &input, time_limit).await?;
        }
        Commands::Health => {
            commands::health().await?;
        }
        Commands::Languages => {
            commands::list_languages()?;
        }
    }

    Ok(())
}
