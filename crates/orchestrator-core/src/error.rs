//! Domain error enums for every boundary in the core. Each is a
//! `thiserror` enum with constructor helpers, used in place of ad hoc
//! `anyhow::Error` everywhere inside the core.

use thiserror::Error;

/// Produced by the path/flag/command validators or by tool-argument
/// checks. Surfaced to the LLM as a plain string starting with `Error:`;
/// never propagated past the tool dispatcher boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("path contains a NUL byte")]
    NulByte,
    #[error("path escapes workspace: {path}")]
    Escapes { path: String },
    #[error("path touches a blocked location ({reason}): {path}")]
    Blocked { path: String, reason: String },
    #[error("flag not allowed for this operation: {flag}")]
    FlagNotAllowed { flag: String },
    #[error("command not in allowlist: {command}")]
    CommandNotAllowed { command: String },
    #[error("{message}")]
    Other { message: String },
}

impl ValidationError {
    pub fn escapes(path: impl Into<String>) -> Self {
        Self::Escapes { path: path.into() }
    }

    pub fn blocked(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Blocked {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn flag_not_allowed(flag: impl Into<String>) -> Self {
        Self::FlagNotAllowed { flag: flag.into() }
    }

    pub fn command_not_allowed(command: impl Into<String>) -> Self {
        Self::CommandNotAllowed {
            command: command.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Raised inside the container manager.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container runtime unreachable at {socket}: {source}; is the daemon running? try `docker ps`-equivalent diagnostics")]
    HealthCheckFailed {
        socket: String,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("workspace directory does not exist: {0}")]
    WorkspaceMissing(std::path::PathBuf),
    #[error("invalid container state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("exec timed out after {0}ms")]
    ExecTimeout(u64),
    #[error("container runtime error: {0}")]
    Runtime(#[from] bollard::errors::Error),
    #[error("{0}")]
    ConnectFailed(String),
}

/// Raised inside a tool handler. Caught at the dispatcher boundary and
/// turned into an `is_error = true` tool-result string; never unwinds
/// through the agentic loop.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("container error: {0}")]
    Container(#[from] ContainerError),
    #[error("found {count} times on lines {lines}")]
    MultipleMatches { count: usize, lines: String },
    #[error("old_str not found in file")]
    NoMatch,
    #[error("file already exists: {0}")]
    FileExists(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl ToolError {
    /// Render exactly as the tool layer hands back to the LLM: a plain
    /// string, never an exception. Tools catch their own errors.
    pub fn to_tool_result_string(&self) -> String {
        format!("Error: {self}")
    }
}

/// Raised by the agentic loop driver and the session supervisor.
/// Distinguished by type, never by message substring.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("turn limit exceeded ({max_iterations} iterations)")]
    TurnLimit { max_iterations: u32 },
    #[error("reached max_tokens before end_turn")]
    MaxTokens,
    #[error("unexpected stop reason: {0}")]
    UnexpectedStopReason(String),
    #[error("LLM transport error after retries: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    /// Catch-all fatal condition: container runtime failure, LLM transport
    /// failure after retries, or a verifier crash. Mapped to
    /// `status = failed` with this string as the result's `error` field.
    #[error("{0}")]
    Fatal(String),
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("verifier panicked or returned an error: {0}")]
    VerifierFailed(String),
}
