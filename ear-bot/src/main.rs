use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ear_bot::{Config, Controller, GitHubClient, Mode};
use ear_bot_core::{Handle, SubmissionId};

/// Assigns reviewers to assembly review pull requests
#[derive(Parser, Debug)]
#[command(name = "ear-bot")]
#[command(about = "Assigns reviewers to assembly review pull requests", long_about = None)]
struct Cli {
    /// Log what would be done without touching GitHub or any file
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan every open submission and advance its review
    Search,
    /// Process a reply posted on a submission
    Comment(CommentArgs),
    /// Assign a supervisor to a new submission
    Supervisor(SupervisorArgs),
    /// Finalize a merged submission
    Merged(MergedArgs),
}

#[derive(Parser, Debug)]
struct CommentArgs {
    /// Submission (pull request) number
    #[arg(long)]
    submission: u64,

    /// Login of the comment author
    #[arg(long)]
    author: String,

    /// Comment text
    #[arg(long)]
    body: String,
}

#[derive(Parser, Debug)]
struct SupervisorArgs {
    #[arg(long)]
    submission: u64,

    /// Login of the person who opened the submission
    #[arg(long)]
    submitter: String,
}

#[derive(Parser, Debug)]
struct MergedArgs {
    #[arg(long)]
    submission: u64,

    /// Login of the reviewer who completed the review
    #[arg(long)]
    reviewer: String,
}

impl Commands {
    fn into_mode(self) -> Mode {
        match self {
            Commands::Search => Mode::Search,
            Commands::Comment(args) => Mode::Comment {
                submission: SubmissionId(args.submission),
                author: Handle::new(args.author),
                body: args.body,
            },
            Commands::Supervisor(args) => Mode::Supervisor {
                submission: SubmissionId(args.submission),
                submitter: Handle::new(args.submitter),
            },
            Commands::Merged(args) => Mode::Merged {
                submission: SubmissionId(args.submission),
                reviewer: Handle::new(args.reviewer),
            },
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration from environment")?;
    let client = GitHubClient::new(&config)?;
    info!(
        "Working on {}/{}{}",
        config.repo_owner,
        config.repo_name,
        if cli.dry_run { " (dry run)" } else { "" }
    );

    let controller = Controller::new(Arc::new(client), config).with_dry_run(cli.dry_run);
    controller.run(cli.command.into_mode(), Utc::now()).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
