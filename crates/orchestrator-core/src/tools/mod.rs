//! The six allowlisted tools and their dispatcher. A `(name, input-map)`
//! pair becomes a `ToolCall` tagged variant, and the dispatcher is a pure
//! function from `ToolCall` to a result string. Every handler catches its
//! own errors and encodes them as `Error: ...` strings — nothing here
//! unwinds through the agentic loop.

mod edit_file;
mod git_operation;
mod grep;
mod read_file;

pub use edit_file::{EditFileArgs, EditFileCommand};
pub use git_operation::{GitOperation, GitOperationArgs};
pub use grep::GrepArgs;
pub use read_file::ReadFileArgs;

use std::path::PathBuf;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::container::ContainerRuntime;
use crate::error::ToolError;
use crate::types::Tool;
use crate::validator::{resolve_command, validate_find_args, validate_path};

/// Named per DESIGN.md's Open Question decision #3: this constant used to
/// be hard-coded separately in `bash_command` and `git_operation`.
pub const TOOL_EXEC_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BashCommandArgs {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListFilesArgs {
    pub path: Option<String>,
}

/// One call to one of the six tools, already parsed from the LLM's raw
/// JSON arguments into a typed payload.
#[derive(Debug, Clone)]
pub enum ToolCall {
    ReadFile(ReadFileArgs),
    EditFile(EditFileArgs),
    GitOperation(GitOperationArgs),
    Grep(GrepArgs),
    BashCommand(BashCommandArgs),
    ListFiles(ListFilesArgs),
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ReadFile(_) => "read_file",
            ToolCall::EditFile(_) => "edit_file",
            ToolCall::GitOperation(_) => "git_operation",
            ToolCall::Grep(_) => "grep",
            ToolCall::BashCommand(_) => "bash_command",
            ToolCall::ListFiles(_) => "list_files",
        }
    }
}

/// The static tool schema table, generated once and never mutated at
/// runtime.
pub fn tool_table() -> Vec<Tool> {
    vec![
        Tool {
            name: "read_file",
            description: "Read a file from the workspace.",
            parameters: schemars::schema_for!(ReadFileArgs).into(),
        },
        Tool {
            name: "edit_file",
            description: "Edit or create a file in the workspace.",
            parameters: schemars::schema_for!(EditFileArgs).into(),
        },
        Tool {
            name: "git_operation",
            description: "Run a git status/diff/add/commit against the workspace.",
            parameters: schemars::schema_for!(GitOperationArgs).into(),
        },
        Tool {
            name: "grep",
            description: "Search the workspace with ripgrep.",
            parameters: schemars::schema_for!(GrepArgs).into(),
        },
        Tool {
            name: "bash_command",
            description: "Run an allowlisted read-only command inside the sandbox.",
            parameters: schemars::schema_for!(BashCommandArgs).into(),
        },
        Tool {
            name: "list_files",
            description: "List the contents of a directory in the workspace.",
            parameters: schemars::schema_for!(ListFilesArgs).into(),
        },
    ]
}

/// Parse a raw `(name, json input)` pair from the LLM into a typed
/// `ToolCall`. A parse failure is reported back to the LLM as an
/// `is_error` tool result by the agentic loop driver, never unwound.
pub fn parse_tool_call(name: &str, input: serde_json::Value) -> Result<ToolCall, String> {
    fn parse<T: serde::de::DeserializeOwned>(input: serde_json::Value) -> Result<T, String> {
        serde_json::from_value(input).map_err(|e| e.to_string())
    }
    match name {
        "read_file" => Ok(ToolCall::ReadFile(parse(input)?)),
        "edit_file" => Ok(ToolCall::EditFile(parse(input)?)),
        "git_operation" => Ok(ToolCall::GitOperation(parse(input)?)),
        "grep" => Ok(ToolCall::Grep(parse(input)?)),
        "bash_command" => Ok(ToolCall::BashCommand(parse(input)?)),
        "list_files" => Ok(ToolCall::ListFiles(parse(input)?)),
        other => Err(format!("unknown tool: {other}")),
    }
}

/// The dispatcher: a pure function from `(ToolCall)` to a result string.
/// The single wrapper that converts `Result<String, ToolError>` into the
/// tool-result string at the dispatcher edge (REDESIGN FLAGS note).
pub async fn dispatch(
    call: ToolCall,
    workspace: &PathBuf,
    runtime: &mut dyn ContainerRuntime,
) -> String {
    let result = match call {
        ToolCall::ReadFile(args) => read_file::call(args, workspace, runtime).await,
        ToolCall::EditFile(args) => edit_file::call(args, workspace, runtime).await,
        ToolCall::GitOperation(args) => git_operation::call_with_timeout(args, workspace).await,
        ToolCall::Grep(args) => grep::call(args, workspace, runtime).await,
        ToolCall::BashCommand(args) => bash_command(args, workspace, runtime).await,
        ToolCall::ListFiles(args) => list_files(args, workspace, runtime).await,
    };
    match result {
        Ok(s) => s,
        Err(e) => e.to_tool_result_string(),
    }
}

async fn bash_command(
    args: BashCommandArgs,
    workspace: &PathBuf,
    runtime: &mut dyn ContainerRuntime,
) -> Result<String, ToolError> {
    let binary = resolve_command(&args.command)?;
    validate_find_args(&args.command, &args.args.iter().map(String::as_str).collect::<Vec<_>>())?;

    let mut cmd = vec![binary.to_string()];
    for arg in &args.args {
        if arg.starts_with('-') {
            // Already denylist-checked above for `find`; other commands
            // have no flag allowlist so flags pass through unvalidated,
            // non-flag arguments are always path-validated below.
        } else {
            let validated = validate_path(arg, workspace)?;
            cmd.push(validated.to_string_lossy().into_owned());
            continue;
        }
        cmd.push(arg.clone());
    }

    let result = runtime.exec(&cmd, TOOL_EXEC_TIMEOUT).await?;
    if result.stdout.is_empty() && result.stderr.is_empty() {
        Ok(format!("(exit code: {})", result.exit_code_or_zero()))
    } else {
        Ok(format!("{}{}", result.stdout, result.stderr))
    }
}

async fn list_files(
    args: ListFilesArgs,
    workspace: &PathBuf,
    runtime: &mut dyn ContainerRuntime,
) -> Result<String, ToolError> {
    let path_input = args.path.as_deref().unwrap_or(".");
    let validated = validate_path(path_input, workspace)?;
    let result = runtime
        .exec(
            &["/bin/ls".to_string(), "-la".to_string(), validated.to_string_lossy().into_owned()],
            TOOL_EXEC_TIMEOUT,
        )
        .await?;
    if result.is_success() {
        Ok(result.stdout)
    } else {
        Ok(format!("Error listing files: {}", result.stderr))
    }
}
