//! End-to-end scenarios over the retry orchestrator, session supervisor,
//! and tool dispatcher, exercised against fakes rather than a live Docker
//! daemon or Anthropic endpoint. Placed at crate-root `tests/` since it
//! spans more than one module.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use orchestrator_core::agentic_loop::{
    CompletionResponse, ContentBlock, LlmApiError, LlmClient, Message, StopReason, StopReasonOrOther,
};
use orchestrator_core::container::{ContainerResult, ContainerRuntime};
use orchestrator_core::error::RetryError;
use orchestrator_core::retry::{RetryOrchestrator, Verifier};
use orchestrator_core::session::SessionSupervisor;
use orchestrator_core::tools::{self, ReadFileArgs, ToolCall};
use orchestrator_core::types::{
    ContainerConfig, RetryConfig, RetryFinalStatus, SessionConfig, ToolResult, VerificationError,
    VerificationErrorKind, VerificationResult,
};

/// A container runtime that never talks to a real daemon. `exec` delegates
/// to a boxed closure so each scenario can script exactly the stdout/stderr
/// it needs without a Docker socket.
struct FakeContainerRuntime {
    exec_calls: Arc<AtomicU32>,
    handler: Box<dyn Fn(&[String]) -> ContainerResult<ToolResult> + Send>,
}

impl FakeContainerRuntime {
    fn new(handler: impl Fn(&[String]) -> ContainerResult<ToolResult> + Send + 'static) -> Self {
        Self {
            exec_calls: Arc::new(AtomicU32::new(0)),
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeContainerRuntime {
    async fn create(&mut self, _config: &ContainerConfig) -> ContainerResult<()> {
        Ok(())
    }

    async fn start(&mut self) -> ContainerResult<()> {
        Ok(())
    }

    async fn exec(&mut self, cmd: &[String], _timeout: Duration) -> ContainerResult<ToolResult> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        (self.handler)(cmd)
    }

    async fn cleanup(&mut self) -> ContainerResult<()> {
        Ok(())
    }
}

fn ok_result(stdout: impl Into<String>) -> ContainerResult<ToolResult> {
    Ok(ToolResult {
        stdout: stdout.into(),
        stderr: String::new(),
        exit_code: Some(0),
    })
}

/// A scripted LLM client: each call to `complete` pops the next queued
/// response, recording every message list it was sent so assertions can
/// inspect exactly what prompt crossed the wire on a given attempt.
struct FakeLlmClient {
    responses: Mutex<VecDeque<(Option<Duration>, CompletionResponse)>>,
    sent: Mutex<Vec<Vec<Message>>>,
}

impl FakeLlmClient {
    fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| (None, r)).collect()),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn with_delay(mut self, index: usize, delay: Duration) -> Self {
        let mut responses = self.responses.lock().unwrap();
        if let Some(entry) = responses.get_mut(index) {
            entry.0 = Some(delay);
        }
        drop(responses);
        self
    }

    fn first_sent_text(&self, call_index: usize) -> String {
        let sent = self.sent.lock().unwrap();
        match &sent[call_index][0].content[0] {
            ContentBlock::Text(text) => text.clone(),
            other => panic!("expected a text block, got {other:?}"),
        }
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[orchestrator_core::types::Tool],
        _max_tokens: u32,
    ) -> Result<CompletionResponse, LlmApiError> {
        self.sent.lock().unwrap().push(messages.to_vec());
        let (delay, response) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("FakeLlmClient ran out of scripted responses");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(response)
    }
}

fn end_turn(text: &str) -> CompletionResponse {
    CompletionResponse {
        content: vec![ContentBlock::Text(text.to_string())],
        stop_reason: StopReasonOrOther::Known(StopReason::EndTurn),
    }
}

fn tool_use(id: &str, name: &str, input: serde_json::Value) -> CompletionResponse {
    CompletionResponse {
        content: vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }],
        stop_reason: StopReasonOrOther::Known(StopReason::ToolUse),
    }
}

fn session(workspace: PathBuf, container: FakeContainerRuntime) -> SessionSupervisor {
    let mut config = SessionConfig::new(workspace);
    config.turn_limit = 10;
    config.timeout_ms = 300_000;
    SessionSupervisor::new(config, Box::new(container), 4096)
}

struct AlwaysFailThenPass {
    call_count: AtomicU32,
}

#[async_trait]
impl Verifier for AlwaysFailThenPass {
    async fn verify(&self, _workspace: &Path) -> Result<VerificationResult, RetryError> {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            Ok(VerificationResult::failing(
                vec![VerificationError {
                    kind: VerificationErrorKind::Build,
                    summary: "TypeScript compile failed: 2 errors".to_string(),
                }],
                10,
            ))
        } else {
            Ok(VerificationResult::passing(10))
        }
    }
}

struct AlwaysFail;

#[async_trait]
impl Verifier for AlwaysFail {
    async fn verify(&self, _workspace: &Path) -> Result<VerificationResult, RetryError> {
        Ok(VerificationResult::failing(
            vec![VerificationError {
                kind: VerificationErrorKind::Build,
                summary: "still broken".to_string(),
            }],
            5,
        ))
    }
}

struct CountingVerifier {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Verifier for CountingVerifier {
    async fn verify(&self, _workspace: &Path) -> Result<VerificationResult, RetryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(VerificationResult::passing(1))
    }
}

/// Scenario 1: happy path, one attempt, no verifier.
#[tokio::test]
async fn happy_path_one_attempt_no_verifier() {
    let workspace = tempfile::tempdir().unwrap();
    let client = FakeLlmClient::new(vec![end_turn("Done.")]);
    let orchestrator = RetryOrchestrator::new(RetryConfig { max_retries: 3 });
    let ws_path = workspace.path().to_path_buf();

    let result = orchestrator
        .run(
            "Fix the bug",
            &client,
            || session(ws_path.clone(), FakeContainerRuntime::new(|_| ok_result(""))),
            None,
            workspace.path(),
        )
        .await;

    assert_eq!(result.final_status, RetryFinalStatus::Success);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.session_results.len(), 1);
    assert_eq!(result.verification_results.len(), 0);
    assert_eq!(result.session_results[0].final_response, "Done.");
}

/// Scenario 2: verifier fails on attempt 1, passes on attempt 2. The
/// attempt-2 message must lead with the original task, name attempt 1,
/// carry the build digest, and close with the fixed instruction.
#[tokio::test]
async fn retries_once_on_verification_failure_then_succeeds() {
    let workspace = tempfile::tempdir().unwrap();
    let client = Arc::new(FakeLlmClient::new(vec![end_turn("Done."), end_turn("Done.")]));
    let orchestrator = RetryOrchestrator::new(RetryConfig { max_retries: 3 });
    let verifier = AlwaysFailThenPass {
        call_count: AtomicU32::new(0),
    };
    let ws_path = workspace.path().to_path_buf();

    let result = orchestrator
        .run(
            "Fix the bug",
            client.as_ref(),
            || session(ws_path.clone(), FakeContainerRuntime::new(|_| ok_result(""))),
            Some(&verifier),
            workspace.path(),
        )
        .await;

    assert_eq!(result.final_status, RetryFinalStatus::Success);
    assert_eq!(result.attempts, 2);

    let second_message = client.first_sent_text(1);
    assert!(second_message.starts_with("Fix the bug"));
    assert!(second_message.contains("PREVIOUS ATTEMPT 1 FAILED VERIFICATION:"));
    assert!(second_message.contains("TYPESCRIPT COMPILE FAILED: 2 ERRORS"));
    assert!(second_message.ends_with("Fix the issues above and complete the original task."));
}

/// Scenario 3: verifier always fails, exhausting `max_retries`.
#[tokio::test]
async fn exhausts_max_retries_when_verifier_never_passes() {
    let workspace = tempfile::tempdir().unwrap();
    let client = FakeLlmClient::new(vec![end_turn("Done."), end_turn("Done."), end_turn("Done.")]);
    let orchestrator = RetryOrchestrator::new(RetryConfig { max_retries: 3 });
    let verifier = AlwaysFail;
    let ws_path = workspace.path().to_path_buf();

    let result = orchestrator
        .run(
            "Fix the bug",
            &client,
            || session(ws_path.clone(), FakeContainerRuntime::new(|_| ok_result(""))),
            Some(&verifier),
            workspace.path(),
        )
        .await;

    assert_eq!(result.final_status, RetryFinalStatus::MaxRetriesExhausted);
    assert_eq!(result.attempts, 3);
    assert!(result.error.unwrap().contains("3 attempts"));
}

/// Scenario 4: a session timeout is terminal — the verifier must never run
/// and the orchestrator must not retry.
#[tokio::test]
async fn session_timeout_is_terminal_and_skips_verifier() {
    let workspace = tempfile::tempdir().unwrap();
    // The response arrives well after the session's wall-clock timeout, so
    // the cancellation token has already flipped by the next tool boundary.
    let client = FakeLlmClient::new(vec![tool_use("call-1", "list_files", serde_json::json!({"path": "."}))])
        .with_delay(0, Duration::from_millis(80));
    let orchestrator = RetryOrchestrator::new(RetryConfig { max_retries: 3 });
    let verifier_calls = Arc::new(AtomicU32::new(0));
    let verifier = CountingVerifier {
        calls: verifier_calls.clone(),
    };
    let ws_path = workspace.path().to_path_buf();

    let result = orchestrator
        .run(
            "Fix the bug",
            &client,
            || {
                let mut config = SessionConfig::new(ws_path.clone());
                config.turn_limit = 10;
                config.timeout_ms = 10;
                SessionSupervisor::new(
                    config,
                    Box::new(FakeContainerRuntime::new(|_| ok_result(""))),
                    4096,
                )
            },
            Some(&verifier),
            workspace.path(),
        )
        .await;

    assert_eq!(result.final_status, RetryFinalStatus::Timeout);
    assert_eq!(result.attempts, 1);
    assert_eq!(verifier_calls.load(Ordering::SeqCst), 0, "verifier must not run after a terminal timeout");
}

/// Scenario 5: a `str_replace` with two matches is rejected and the error
/// names the 1-based line numbers of every match.
#[tokio::test]
async fn multi_match_edit_is_rejected_with_line_numbers() {
    let workspace = tempfile::tempdir().unwrap();
    let ws_path = workspace.path().to_path_buf();
    let mut container = FakeContainerRuntime::new(|_| ok_result("foo\nbar\nfoo\nbaz"));

    let call = ToolCall::EditFile(orchestrator_core::tools::EditFileArgs {
        command: orchestrator_core::tools::EditFileCommand::StrReplace,
        path: "file.txt".to_string(),
        old_str: Some("foo".to_string()),
        new_str: Some("qux".to_string()),
        content: None,
    });

    let result = tools::dispatch(call, &ws_path, &mut container).await;

    assert!(result.contains("found 2 times"), "got: {result}");
    assert!(result.contains("1, 3"), "got: {result}");
}

/// Scenario 6: reading a path under `.git/hooks` is blocked before the
/// container is ever touched.
#[tokio::test]
async fn git_hooks_path_is_blocked_without_touching_the_container() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(workspace.path().join(".git/hooks")).unwrap();
    std::fs::write(workspace.path().join(".git/hooks/pre-commit"), "#!/bin/sh\n").unwrap();

    let ws_path = workspace.path().to_path_buf();
    let mut container = FakeContainerRuntime::new(|_| ok_result("should never run"));
    let exec_calls = container.exec_calls.clone();

    let call = ToolCall::ReadFile(ReadFileArgs {
        path: ".git/hooks/pre-commit".to_string(),
    });
    let result = tools::dispatch(call, &ws_path, &mut container).await;

    assert!(result.starts_with("Error:"), "got: {result}");
    assert!(result.to_lowercase().contains("hook"), "got: {result}");
    assert_eq!(exec_calls.load(Ordering::SeqCst), 0, "container exec must never be invoked");
}
