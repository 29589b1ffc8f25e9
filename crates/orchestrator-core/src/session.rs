//! Session supervisor. Owns one container and one agentic loop. Enforces
//! the turn budget (delegated to the driver) and the wall-clock timeout
//! via a small explicit cancellation token, then classifies the terminal
//! status. Purely in-memory: no cross-process persistence.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use uuid::Uuid;

use crate::agentic_loop::{AgentLoopDriver, LlmClient, ToolExecutor};
use crate::container::ContainerRuntime;
use crate::error::{ContainerError, DriverError, SessionError};
use crate::tools::{self, ToolCall};
use crate::types::{SessionConfig, SessionResult, SessionStatus};

/// A small atomic flag with a check-at-every-boundary discipline — not
/// `tokio_util::sync::CancellationToken`, because an explicit small type
/// is easier for a reviewer to audit end to end.
#[derive(Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks the cancellation token before every tool dispatch, increments
/// the monotonic tool-call counter, and delegates to the dispatcher. A
/// cancelled token surfaces a typed `SessionTimeout` here — the only
/// error path `tools::dispatch` itself never takes.
struct SupervisedExecutor<'a> {
    workspace: PathBuf,
    container: &'a mut dyn ContainerRuntime,
    token: CancellationToken,
    timeout_ms: u64,
    tool_call_count: u64,
}

#[async_trait]
impl<'a> ToolExecutor for SupervisedExecutor<'a> {
    async fn execute(&mut self, call: ToolCall) -> Result<String, SessionError> {
        if self.token.is_cancelled() {
            return Err(SessionError::Timeout {
                timeout_ms: self.timeout_ms,
            });
        }
        self.tool_call_count += 1;
        Ok(tools::dispatch(call, &self.workspace, self.container).await)
    }
}

/// One `(container, agentic loop)` pair. A `RetryOrchestrator` constructs
/// a fresh one per attempt — sessions are never reused.
pub struct SessionSupervisor {
    session_id: Uuid,
    config: SessionConfig,
    container: Box<dyn ContainerRuntime>,
    driver: AgentLoopDriver,
}

impl SessionSupervisor {
    pub fn new(config: SessionConfig, container: Box<dyn ContainerRuntime>, max_tokens: u32) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            config,
            container,
            driver: AgentLoopDriver::new(max_tokens),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Creates and starts the container.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let container_config = self.config.container_config();
        self.container.create(&container_config).await?;
        self.container.start().await?;
        Ok(())
    }

    /// Establishes the wall-clock timeout and cancellation token, then
    /// drives the agentic loop, and classifies the terminal status
    /// (mutually exclusive by construction here).
    pub async fn run(&mut self, client: &dyn LlmClient, user_message: String) -> SessionResult {
        let started = Instant::now();
        let token = CancellationToken::new();
        let timer_token = token.clone();
        let timeout = self.config.timeout();

        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timer_token.cancel();
        });

        let mut executor = SupervisedExecutor {
            workspace: self.config.workspace_dir.clone(),
            container: self.container.as_mut(),
            token,
            timeout_ms: self.config.timeout_ms,
            tool_call_count: 0,
        };

        let outcome = self
            .driver
            .run(client, user_message, self.config.turn_limit, &mut executor)
            .await;

        timer.abort();
        let tool_call_count = executor.tool_call_count;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(final_response) => {
                SessionResult::success(self.session_id, tool_call_count, duration_ms, final_response)
            }
            Err(SessionError::Timeout { .. }) => SessionResult::failure(
                self.session_id,
                SessionStatus::Timeout,
                tool_call_count,
                duration_ms,
                "session exceeded its wall-clock timeout".to_string(),
            ),
            Err(SessionError::Driver(DriverError::TurnLimit { max_iterations })) => SessionResult::failure(
                self.session_id,
                SessionStatus::TurnLimit,
                tool_call_count,
                duration_ms,
                format!("exceeded turn limit of {max_iterations}"),
            ),
            Err(other) => SessionResult::failure(
                self.session_id,
                SessionStatus::Failed,
                tool_call_count,
                duration_ms,
                other.to_string(),
            ),
        }
    }

    /// Invokes `cleanup()` on the container. Idempotent and safe to call
    /// in the middle of an error path.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        self.container
            .cleanup()
            .await
            .map_err(|e: ContainerError| SessionError::Container(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_token_starts_uncancelled_and_flips_once() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled(), "clones share the same underlying flag");
    }
}
