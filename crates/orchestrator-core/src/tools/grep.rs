use std::path::PathBuf;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::container::ContainerRuntime;
use crate::error::ToolError;
use crate::validator::validate_path;

use super::TOOL_EXEC_TIMEOUT;

const MAX_CONTEXT_LINES: u32 = 50;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GrepArgs {
    pub pattern: String,
    pub path: Option<String>,
    #[serde(default)]
    pub case_insensitive: bool,
    pub context_lines: Option<u32>,
}

/// Builds `/usr/bin/rg --color never --no-heading --with-filename
/// --line-number [-i] [-C n] -- pattern path` and maps the exit code:
/// 0 -> stdout, 1 -> "(no matches found)", >=2 -> `Error: ...`.
pub async fn call(
    args: GrepArgs,
    workspace: &PathBuf,
    runtime: &mut dyn ContainerRuntime,
) -> Result<String, ToolError> {
    let path_input = args.path.as_deref().unwrap_or(".");
    let validated = validate_path(path_input, workspace)?;

    let mut cmd = vec![
        "/usr/bin/rg".to_string(),
        "--color".to_string(),
        "never".to_string(),
        "--no-heading".to_string(),
        "--with-filename".to_string(),
        "--line-number".to_string(),
    ];
    if args.case_insensitive {
        cmd.push("-i".to_string());
    }
    if let Some(context) = args.context_lines {
        cmd.push("-C".to_string());
        cmd.push(context.min(MAX_CONTEXT_LINES).to_string());
    }
    cmd.push("--".to_string());
    cmd.push(args.pattern);
    cmd.push(validated.to_string_lossy().into_owned());

    let result = runtime.exec(&cmd, TOOL_EXEC_TIMEOUT).await?;
    match result.exit_code_or_zero() {
        0 => Ok(result.stdout),
        1 => Ok("(no matches found)".to_string()),
        _ => Ok(format!("Error: {}", result.stderr)),
    }
}
