//! `git_operation`. Executes on the host (not inside the container) so it
//! can write to the `.git/` directory owned by the host user. Supports
//! four operations: status, diff, add, commit.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::ToolError;
use crate::validator::{validate_commit_flags, validate_diff_flags, validate_path};

/// Fixed absolute path to the `git` binary the sandbox image provides;
/// never resolved via `PATH`, matching the rest of the tool layer's
/// allowlisted-binary contract.
const GIT_BINARY: &str = "/usr/bin/git";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GitOperation {
    Status,
    Diff,
    Add,
    Commit,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GitOperationArgs {
    pub operation: GitOperation,
    #[serde(default)]
    pub args: Vec<String>,
}

pub async fn call(args: GitOperationArgs, workspace: &PathBuf) -> Result<String, ToolError> {
    let argv = match args.operation {
        GitOperation::Status => vec!["status".to_string(), "--porcelain".to_string()],
        GitOperation::Diff => build_diff_argv(&args.args, workspace)?,
        GitOperation::Add => build_add_argv(&args.args, workspace)?,
        GitOperation::Commit => build_commit_argv(&args.args, workspace)?,
    };

    let workspace = workspace.clone();
    let output = tokio::task::spawn_blocking(move || {
        Command::new(GIT_BINARY).arg("-C").arg(&workspace).args(&argv).output()
    })
    .await
    .map_err(|e| ToolError::Other(format!("git task join error: {e}")))?
    .map_err(ToolError::Io)?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Ok(format!(
            "Error: {}",
            String::from_utf8_lossy(&output.stderr)
        ))
    }
}

/// Wraps [`call`] with a 30s host-process timeout.
pub async fn call_with_timeout(
    args: GitOperationArgs,
    workspace: &PathBuf,
) -> Result<String, ToolError> {
    match tokio::time::timeout(Duration::from_millis(30_000), call(args, workspace)).await {
        Ok(result) => result,
        Err(_) => Err(ToolError::Other("git operation timed out after 30000ms".to_string())),
    }
}

fn build_diff_argv(raw_args: &[String], workspace: &PathBuf) -> Result<Vec<String>, ToolError> {
    let mut argv = vec!["diff".to_string()];
    let flags: Vec<&str> = raw_args.iter().filter(|a| a.starts_with('-')).map(String::as_str).collect();
    validate_diff_flags(&flags)?;
    for arg in raw_args {
        if arg.starts_with('-') {
            argv.push(arg.clone());
        } else {
            let validated = validate_path(arg, workspace)?;
            argv.push(validated.to_string_lossy().into_owned());
        }
    }
    Ok(argv)
}

fn build_add_argv(raw_args: &[String], workspace: &PathBuf) -> Result<Vec<String>, ToolError> {
    if raw_args.is_empty() {
        return Err(ToolError::Other("git add requires at least one path".to_string()));
    }
    let mut argv = vec!["add".to_string()];
    for arg in raw_args {
        let validated = validate_path(arg, workspace)?;
        argv.push(validated.to_string_lossy().into_owned());
    }
    Ok(argv)
}

/// `--no-verify` is always prepended — non-negotiable, since it prevents
/// arbitrary code execution via Git hooks.
fn build_commit_argv(raw_args: &[String], workspace: &PathBuf) -> Result<Vec<String>, ToolError> {
    let mut argv = vec!["commit".to_string(), "--no-verify".to_string()];
    let mut i = 0;
    while i < raw_args.len() {
        let arg = &raw_args[i];
        if arg == "-m" || arg == "--message" {
            validate_commit_flags(&[arg.as_str()])?;
            let value = raw_args
                .get(i + 1)
                .ok_or_else(|| ToolError::Other(format!("{arg} requires a value")))?;
            argv.push(arg.clone());
            argv.push(value.clone());
            i += 2;
        } else if arg.starts_with('-') {
            return Err(crate::error::ValidationError::flag_not_allowed(arg.clone()).into());
        } else {
            let validated = validate_path(arg, workspace)?;
            argv.push(validated.to_string_lossy().into_owned());
            i += 1;
        }
    }
    Ok(argv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn commit_argv_always_prepends_no_verify() {
        let ws = tempdir().unwrap();
        let argv = build_commit_argv(&["-m".to_string(), "fix bug".to_string()], &ws.path().to_path_buf()).unwrap();
        assert_eq!(argv[0], "commit");
        assert_eq!(argv[1], "--no-verify");
        assert!(argv.contains(&"-m".to_string()));
        assert!(argv.contains(&"fix bug".to_string()));
    }

    #[test]
    fn commit_argv_rejects_disallowed_flags() {
        let ws = tempdir().unwrap();
        let err = build_commit_argv(&["--amend".to_string()], &ws.path().to_path_buf());
        assert!(err.is_err());
    }

    #[test]
    fn add_argv_requires_at_least_one_path() {
        let ws = tempdir().unwrap();
        assert!(build_add_argv(&[], &ws.path().to_path_buf()).is_err());
    }

    #[test]
    fn diff_argv_rejects_unknown_flag() {
        let ws = tempdir().unwrap();
        let err = build_diff_argv(&["--force".to_string()], &ws.path().to_path_buf());
        assert!(err.is_err());
    }
}
