//! Retry orchestrator: the outer loop over sessions. Structures each
//! retry message as the original task first, then an "errors to
//! fix"/"previous attempts" block, and calls the verifier exactly once
//! per attempt — no tiered escalation, just flat `max_retries` attempts.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as TokioMutex;

use crate::agentic_loop::LlmClient;
use crate::error::RetryError;
use crate::session::SessionSupervisor;
use crate::summarizer::build_digest;
use crate::types::{RetryConfig, RetryFinalStatus, RetryResult, SessionStatus, VerificationResult};

/// An external callback that inspects the workspace and returns pass/fail
/// with typed error summaries. A verifier implementation bug degrades to
/// `final_status = failed` rather than unwinding, because this trait's
/// method is fallible by construction.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, workspace: &Path) -> Result<VerificationResult, RetryError>;
}

/// Construct the message for one attempt. Attempt 1 is exactly the
/// original task. Attempts >= 2 place the original task *before* the first
/// `---` — the LLM treats leading text as the primary directive — followed
/// by a digest of only the *last* failed verification (earlier failures
/// may contain stale errors).
fn build_attempt_message(
    original_task: &str,
    attempt: u32,
    last_failed: Option<&VerificationResult>,
) -> String {
    if attempt == 1 {
        return original_task.to_string();
    }
    let digest = last_failed
        .map(|r| build_digest(std::slice::from_ref(r)))
        .unwrap_or_else(|| build_digest(&[]));
    format!(
        "{original_task}\n\n---\nPREVIOUS ATTEMPT {previous} FAILED VERIFICATION:\n{digest}\n---\nFix the issues above and complete the original task.",
        previous = attempt - 1
    )
}

/// Outer loop over sessions. A `RetryOrchestrator` never reuses a session
/// across attempts — accumulated conversation history would push the
/// original task out of context.
pub struct RetryOrchestrator {
    config: RetryConfig,
    /// The in-flight session, shared so a concurrent `stop()` (e.g. from a
    /// signal handler) can tear it down while `run` is still executing.
    active: Arc<TokioMutex<Option<Arc<TokioMutex<SessionSupervisor>>>>>,
}

impl RetryOrchestrator {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            active: Arc::new(TokioMutex::new(None)),
        }
    }

    /// Forwards to the active session, if any. Used by signal handlers;
    /// safe to call whether or not a session is currently running.
    pub async fn stop(&self) {
        let active = self.active.lock().await.clone();
        if let Some(session) = active {
            let mut session = session.lock().await;
            let _ = session.stop().await;
        }
    }

    pub async fn run(
        &self,
        original_task: &str,
        client: &dyn LlmClient,
        mut session_factory: impl FnMut() -> SessionSupervisor,
        verifier: Option<&dyn Verifier>,
        workspace: &Path,
    ) -> RetryResult {
        let mut result = RetryResult::new();
        let mut last_failed_verification: Option<VerificationResult> = None;

        for attempt in 1..=self.config.max_retries {
            let message = build_attempt_message(original_task, attempt, last_failed_verification.as_ref());

            let session = Arc::new(TokioMutex::new(session_factory()));
            *self.active.lock().await = Some(session.clone());
            result.attempts = attempt;

            if let Err(e) = session.lock().await.start().await {
                let session_id = session.lock().await.session_id();
                session.lock().await.stop().await.ok();
                *self.active.lock().await = None;
                result.session_results.push(crate::types::SessionResult::failure(
                    session_id,
                    SessionStatus::Failed,
                    0,
                    0,
                    e.to_string(),
                ));
                result.final_status = RetryFinalStatus::Failed;
                result.error = Some(e.to_string());
                return result;
            }

            let session_result = session.lock().await.run(client, message).await;
            session.lock().await.stop().await.ok();
            *self.active.lock().await = None;

            let status = session_result.status;
            result.session_results.push(session_result);

            // Timeouts, turn-limit exhaustion, and session failures
            // indicate budget or infrastructure, not an LLM mistake — they
            // are terminal and must not be retried.
            if status != SessionStatus::Success {
                result.final_status = status.into();
                return result;
            }

            let Some(verifier) = verifier else {
                result.final_status = RetryFinalStatus::Success;
                return result;
            };

            match verifier.verify(workspace).await {
                Ok(verification) => {
                    let passed = verification.passed;
                    if !passed {
                        last_failed_verification = Some(verification.clone());
                    }
                    result.verification_results.push(verification);
                    if passed {
                        result.final_status = RetryFinalStatus::Success;
                        return result;
                    }
                }
                Err(e) => {
                    result.final_status = RetryFinalStatus::Failed;
                    result.error = Some(format!("verifier failed: {e}"));
                    return result;
                }
            }
        }

        result.final_status = RetryFinalStatus::MaxRetriesExhausted;
        result.error = Some(format!(
            "Verification still failing after {} attempts",
            self.config.max_retries
        ));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VerificationError, VerificationErrorKind};

    #[test]
    fn attempt_one_is_exactly_the_original_task() {
        assert_eq!(build_attempt_message("Fix the bug", 1, None), "Fix the bug");
    }

    #[test]
    fn attempt_two_places_task_before_digest_with_required_markers() {
        let failed = VerificationResult::failing(
            vec![VerificationError {
                kind: VerificationErrorKind::Build,
                summary: "typescript compile failed: 2 errors".to_string(),
            }],
            5,
        );
        let message = build_attempt_message("Fix the bug", 2, Some(&failed));
        assert!(message.starts_with("Fix the bug"));
        assert!(message.contains("PREVIOUS ATTEMPT 1 FAILED VERIFICATION:"));
        assert!(message.contains("TYPESCRIPT COMPILE FAILED: 2 ERRORS"));
        assert!(message.ends_with("Fix the issues above and complete the original task."));
        assert!(message.find("Fix the bug").unwrap() < message.find("---").unwrap());
    }
}
