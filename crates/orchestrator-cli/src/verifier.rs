//! Default `Verifier`: runs the configured build/test/lint shell commands
//! against the host workspace — outside the sandbox, since the container
//! from the attempt that just finished is already torn down by the time
//! the retry orchestrator calls this.

use std::path::Path;
use std::time::Instant;

use orchestrator_core::error::RetryError;
use orchestrator_core::retry::Verifier;
use orchestrator_core::summarizer::{extract_build_errors, extract_lint_issues, extract_test_failures};
use orchestrator_core::{VerificationError, VerificationErrorKind, VerificationResult};
use tokio::process::Command;

pub struct ShellVerifier {
    pub build_cmd: Option<String>,
    pub test_cmd: Option<String>,
    pub lint_cmd: Option<String>,
}

impl ShellVerifier {
    pub fn is_configured(&self) -> bool {
        self.build_cmd.is_some() || self.test_cmd.is_some() || self.lint_cmd.is_some()
    }

    async fn run_step(
        &self,
        workspace: &Path,
        shell_cmd: &str,
        kind: VerificationErrorKind,
        extract: impl Fn(&str) -> String,
    ) -> Result<Option<VerificationError>, RetryError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(shell_cmd)
            .current_dir(workspace)
            .output()
            .await
            .map_err(|e| RetryError::VerifierFailed(e.to_string()))?;

        if output.status.success() {
            return Ok(None);
        }
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(Some(VerificationError {
            kind,
            summary: extract(&combined),
        }))
    }
}

#[async_trait::async_trait]
impl Verifier for ShellVerifier {
    async fn verify(&self, workspace: &Path) -> Result<VerificationResult, RetryError> {
        let started = Instant::now();
        let mut errors = Vec::new();

        if let Some(cmd) = &self.build_cmd {
            if let Some(e) = self.run_step(workspace, cmd, VerificationErrorKind::Build, extract_build_errors).await? {
                errors.push(e);
                // A failed build makes test/lint output meaningless.
                return Ok(VerificationResult::failing(errors, started.elapsed().as_millis() as u64));
            }
        }
        if let Some(cmd) = &self.test_cmd {
            if let Some(e) = self.run_step(workspace, cmd, VerificationErrorKind::Test, extract_test_failures).await? {
                errors.push(e);
            }
        }
        if let Some(cmd) = &self.lint_cmd {
            if let Some(e) = self.run_step(workspace, cmd, VerificationErrorKind::Lint, extract_lint_issues).await? {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(VerificationResult::passing(started.elapsed().as_millis() as u64))
        } else {
            Ok(VerificationResult::failing(errors, started.elapsed().as_millis() as u64))
        }
    }
}
