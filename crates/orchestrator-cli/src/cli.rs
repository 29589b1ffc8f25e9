//! CLI flag surface: a `clap::Parser` derive struct.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "orchestrator", about = "Background coding-agent orchestrator")]
pub struct Cli {
    /// Task type / prompt for the agent.
    #[arg(short = 't', long = "task-type")]
    pub task_type: String,

    /// Path to the repository the agent will work in. Must exist on disk.
    #[arg(short = 'r', long = "repo")]
    pub repo: PathBuf,

    /// Maximum LLM turns before the session is classified `turn_limit`.
    #[arg(long = "turn-limit", default_value_t = 10)]
    pub turn_limit: u32,

    /// Wall-clock session timeout, in seconds.
    #[arg(long = "timeout", default_value_t = 300)]
    pub timeout: u64,

    /// Maximum retry attempts before `max_retries_exhausted`.
    #[arg(long = "max-retries", default_value_t = 3)]
    pub max_retries: u32,

    /// Emit the final `RetryResult` as JSON on stdout before exiting.
    #[arg(long = "json", default_value_t = false)]
    pub json: bool,

    /// Shell command run against the host workspace to verify a build. No
    /// verifier runs at all unless at least one of build/test/lint is set.
    #[arg(long = "verify-build")]
    pub verify_build: Option<String>,

    /// Shell command run against the host workspace to verify tests pass.
    #[arg(long = "verify-test")]
    pub verify_test: Option<String>,

    /// Shell command run against the host workspace to verify lint passes.
    #[arg(long = "verify-lint")]
    pub verify_lint: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CliValidationError {
    #[error("--task-type must not be empty")]
    EmptyTaskType,
    #[error("--repo does not exist: {0}")]
    RepoMissing(PathBuf),
    #[error("--turn-limit must be between 1 and 100, got {0}")]
    TurnLimitOutOfRange(u32),
    #[error("--timeout must be between 30 and 3600 seconds, got {0}")]
    TimeoutOutOfRange(u64),
    #[error("--max-retries must be between 1 and 10, got {0}")]
    MaxRetriesOutOfRange(u32),
}

impl Cli {
    /// Validate the flag range constraints below. Exit code `2`
    /// (invalid argument) is mapped by the caller on `Err`.
    pub fn validate(&self) -> Result<(), CliValidationError> {
        if self.task_type.trim().is_empty() {
            return Err(CliValidationError::EmptyTaskType);
        }
        if !self.repo.exists() {
            return Err(CliValidationError::RepoMissing(self.repo.clone()));
        }
        if !(1..=100).contains(&self.turn_limit) {
            return Err(CliValidationError::TurnLimitOutOfRange(self.turn_limit));
        }
        if !(30..=3600).contains(&self.timeout) {
            return Err(CliValidationError::TimeoutOutOfRange(self.timeout));
        }
        if !(1..=10).contains(&self.max_retries) {
            return Err(CliValidationError::MaxRetriesOutOfRange(self.max_retries));
        }
        Ok(())
    }
}
