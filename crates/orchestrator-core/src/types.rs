//! Shared data model for the orchestrator: the records that cross
//! component boundaries. Nothing here owns behavior beyond small
//! constructors and the invariants a `From`/`Default` impl can enforce
//! for free.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Input to the container manager.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub image: String,
    pub workspace_dir: PathBuf,
    pub memory_mib: u64,
    pub cpu_count: u32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: "agent-sandbox:latest".to_string(),
            workspace_dir: PathBuf::new(),
            memory_mib: 512,
            cpu_count: 1,
        }
    }
}

impl ContainerConfig {
    pub fn new(workspace_dir: PathBuf) -> Self {
        Self {
            workspace_dir,
            ..Default::default()
        }
    }

    pub fn memory_bytes(&self) -> i64 {
        (self.memory_mib * 1_048_576) as i64
    }

    pub fn nano_cpus(&self) -> i64 {
        self.cpu_count as i64 * 1_000_000_000
    }
}

/// Input to the session supervisor.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub workspace_dir: PathBuf,
    pub image: Option<String>,
    pub model: Option<String>,
    pub turn_limit: u32,
    pub timeout_ms: u64,
}

impl SessionConfig {
    pub fn new(workspace_dir: PathBuf) -> Self {
        Self {
            workspace_dir,
            image: None,
            model: None,
            turn_limit: 10,
            timeout_ms: 300_000,
        }
    }

    /// `1 <= turn_limit <= 100`, `30_000 <= timeout_ms <= 3_600_000`.
    pub fn is_valid(&self) -> bool {
        (1..=100).contains(&self.turn_limit) && (30_000..=3_600_000).contains(&self.timeout_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn container_config(&self) -> ContainerConfig {
        let mut cfg = ContainerConfig::new(self.workspace_dir.clone());
        if let Some(image) = &self.image {
            cfg.image = image.clone();
        }
        cfg
    }
}

/// A statically declared tool capability.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// Raw result of a container `exec`. Never surfaced directly to the LLM.
#[derive(Debug, Clone, Default)]
pub struct ToolResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the runtime reported no exit code at all (distinct from
    /// an observed `0`); formatting call sites that need a concrete number
    /// fall back to `0` at that single site, per the exec contract.
    pub exit_code: Option<i64>,
}

impl ToolResult {
    pub fn exit_code_or_zero(&self) -> i64 {
        self.exit_code.unwrap_or(0)
    }

    pub fn is_success(&self) -> bool {
        self.exit_code_or_zero() == 0
    }
}

/// Terminal classification of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Success,
    Failed,
    Timeout,
    TurnLimit,
}

/// Output of the session supervisor.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResult {
    pub session_id: uuid::Uuid,
    pub status: SessionStatus,
    pub tool_call_count: u64,
    pub duration_ms: u64,
    pub final_response: String,
    pub error: Option<String>,
}

impl SessionResult {
    pub fn success(session_id: uuid::Uuid, tool_call_count: u64, duration_ms: u64, final_response: String) -> Self {
        Self {
            session_id,
            status: SessionStatus::Success,
            tool_call_count,
            duration_ms,
            final_response,
            error: None,
        }
    }

    pub fn failure(
        session_id: uuid::Uuid,
        status: SessionStatus,
        tool_call_count: u64,
        duration_ms: u64,
        error: String,
    ) -> Self {
        debug_assert_ne!(status, SessionStatus::Success, "use SessionResult::success for the success case");
        Self {
            session_id,
            status,
            tool_call_count,
            duration_ms,
            final_response: String::new(),
            error: Some(error),
        }
    }
}

/// One verifier-reported error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationError {
    pub kind: VerificationErrorKind,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationErrorKind {
    Build,
    Test,
    Lint,
    Custom,
}

impl VerificationErrorKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            VerificationErrorKind::Build => "BUILD",
            VerificationErrorKind::Test => "TEST",
            VerificationErrorKind::Lint => "LINT",
            VerificationErrorKind::Custom => "CUSTOM",
        }
    }
}

/// Output of a verifier callback.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VerificationResult {
    pub passed: bool,
    pub errors: Vec<VerificationError>,
    pub duration_ms: u64,
}

impl VerificationResult {
    pub fn passing(duration_ms: u64) -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
            duration_ms,
        }
    }

    pub fn failing(errors: Vec<VerificationError>, duration_ms: u64) -> Self {
        debug_assert!(!errors.is_empty(), "a failing result must carry at least one error");
        Self {
            passed: false,
            errors,
            duration_ms,
        }
    }
}

/// Input to the retry orchestrator.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl RetryConfig {
    pub fn is_valid(&self) -> bool {
        (1..=10).contains(&self.max_retries)
    }
}

/// Terminal classification of a full retry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryFinalStatus {
    Success,
    Failed,
    Timeout,
    TurnLimit,
    MaxRetriesExhausted,
}

impl From<SessionStatus> for RetryFinalStatus {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Success => RetryFinalStatus::Success,
            SessionStatus::Failed => RetryFinalStatus::Failed,
            SessionStatus::Timeout => RetryFinalStatus::Timeout,
            SessionStatus::TurnLimit => RetryFinalStatus::TurnLimit,
        }
    }
}

/// Output of the retry orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct RetryResult {
    pub final_status: RetryFinalStatus,
    pub attempts: u32,
    pub session_results: Vec<SessionResult>,
    pub verification_results: Vec<VerificationResult>,
    pub error: Option<String>,
}

impl RetryResult {
    pub fn new() -> Self {
        Self {
            final_status: RetryFinalStatus::Failed,
            attempts: 0,
            session_results: Vec::new(),
            verification_results: Vec::new(),
            error: None,
        }
    }
}

impl Default for RetryResult {
    fn default() -> Self {
        Self::new()
    }
}
