//! CLI entry point: parses arguments, wires the retry orchestrator to a
//! real Anthropic client and Docker-backed container manager, installs
//! signal handlers, and maps the terminal result to a process exit code.

mod cli;
mod llm;
mod logging;
mod metrics;
mod verifier;

use std::process::ExitCode;

use clap::Parser;
use orchestrator_core::container::ContainerManager;
use orchestrator_core::error::ContainerError;
use orchestrator_core::retry::Verifier;
use orchestrator_core::session::SessionSupervisor;
use orchestrator_core::types::{RetryConfig, SessionConfig};
use orchestrator_core::{RetryFinalStatus, RetryOrchestrator};
use tracing::{error, info};

use cli::Cli;
use llm::AnthropicClient;
use metrics::Counter;
use verifier::ShellVerifier;

const EXIT_SUCCESS: u8 = 0;
const EXIT_SESSION_FAILURE: u8 = 1;
const EXIT_INVALID_ARGUMENT: u8 = 2;
const EXIT_TIMEOUT: u8 = 124;
const EXIT_SIGINT: u8 = 130;
const EXIT_SIGTERM: u8 = 143;

fn exit_code_for(status: RetryFinalStatus) -> u8 {
    match status {
        RetryFinalStatus::Success => EXIT_SUCCESS,
        RetryFinalStatus::Timeout => EXIT_TIMEOUT,
        RetryFinalStatus::Failed | RetryFinalStatus::TurnLimit | RetryFinalStatus::MaxRetriesExhausted => {
            EXIT_SESSION_FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let cli = Cli::parse();
    if let Err(e) = cli.validate() {
        error!(error = %e, "invalid argument");
        eprintln!("error: {e}");
        return ExitCode::from(EXIT_INVALID_ARGUMENT);
    }

    let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") else {
        eprintln!("error: ANTHROPIC_API_KEY is required");
        return ExitCode::from(EXIT_INVALID_ARGUMENT);
    };
    let model = std::env::var("CLAUDE_MODEL").ok();

    let client = AnthropicClient::new(api_key, model);
    let retry_config = RetryConfig {
        max_retries: cli.max_retries,
    };
    let orchestrator = RetryOrchestrator::new(retry_config);

    let shell_verifier = ShellVerifier {
        build_cmd: cli.verify_build.clone(),
        test_cmd: cli.verify_test.clone(),
        lint_cmd: cli.verify_lint.clone(),
    };
    let verifier: Option<&dyn Verifier> = if shell_verifier.is_configured() {
        Some(&shell_verifier)
    } else {
        None
    };

    let repo = cli.repo.clone();
    let turn_limit = cli.turn_limit;
    let timeout_ms = cli.timeout * 1000;
    let task_type = cli.task_type.clone();

    let session_factory = || {
        let mut config = SessionConfig::new(repo.clone());
        config.turn_limit = turn_limit;
        config.timeout_ms = timeout_ms;
        let container: Box<dyn orchestrator_core::container::ContainerRuntime> = match ContainerManager::connect() {
            Ok(manager) => Box::new(manager),
            Err(e) => Box::new(FailedContainer(e)),
        };
        SessionSupervisor::new(config, container, 4096)
    };

    let run = orchestrator.run(&task_type, &client, session_factory, verifier, &repo);

    tokio::select! {
        result = run => {
            let counter = Counter::new();
            counter.record(result.final_status);
            info!(
                final_status = ?result.final_status,
                attempts = result.attempts,
                summary = %counter.summary(),
                "retry orchestrator finished"
            );
            if cli.json {
                match serde_json::to_string(&result) {
                    Ok(json) => println!("{json}"),
                    Err(e) => error!(error = %e, "failed to serialize result"),
                }
            }
            ExitCode::from(exit_code_for(result.final_status))
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, stopping in-flight session");
            orchestrator.stop().await;
            ExitCode::from(EXIT_SIGINT)
        }
        _ = wait_for_sigterm() => {
            info!("received SIGTERM, stopping in-flight session");
            orchestrator.stop().await;
            ExitCode::from(EXIT_SIGTERM)
        }
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

/// Placeholder runtime used only when the container backend itself could
/// not be constructed (e.g. the Docker socket is unreachable at startup);
/// every method fails immediately so the session surfaces a clean error
/// instead of panicking during `session_factory`.
struct FailedContainer(ContainerError);

#[async_trait::async_trait]
impl orchestrator_core::container::ContainerRuntime for FailedContainer {
    async fn create(
        &mut self,
        _config: &orchestrator_core::types::ContainerConfig,
    ) -> Result<(), ContainerError> {
        Err(ContainerError::ConnectFailed(self.0.to_string()))
    }

    async fn start(&mut self) -> Result<(), ContainerError> {
        Err(ContainerError::ConnectFailed(self.0.to_string()))
    }

    async fn exec(
        &mut self,
        _cmd: &[String],
        _timeout: std::time::Duration,
    ) -> Result<orchestrator_core::types::ToolResult, ContainerError> {
        Err(ContainerError::ConnectFailed(self.0.to_string()))
    }

    async fn cleanup(&mut self) -> Result<(), ContainerError> {
        Ok(())
    }
}
