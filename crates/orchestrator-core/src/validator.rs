//! Pure path/flag/command validators. Stateless, synchronous, no I/O
//! beyond `canonicalize`. Implements four ordered path checks plus two
//! fixed flag allowlists.

use std::path::{Path, PathBuf};

use crate::error::ValidationError;

/// Substrings that may never appear in the workspace-relative path, checked
/// after containment. Order matters only for the error message produced;
/// both are checked regardless.
const BLOCKED_RELATIVE_PREFIXES: &[(&str, &str)] = &[
    (".git/hooks", "prevents arbitrary code execution via Git hooks"),
    ("node_modules/.bin", "prevents running arbitrary scripts the repo shipped"),
];

/// Canonicalize `input` against `workspace` and apply the four ordered
/// checks below, short-circuiting on the first failure.
pub fn validate_path(input: &str, workspace: &Path) -> Result<PathBuf, ValidationError> {
    // 1. NUL byte.
    if input.as_bytes().contains(&0) {
        return Err(ValidationError::NulByte);
    }

    // 2. Canonicalize input resolved against workspace.
    let candidate = workspace.join(input);
    let canonical_workspace = workspace
        .canonicalize()
        .map_err(|_| ValidationError::other(format!("workspace does not exist: {}", workspace.display())))?;
    let canonical_candidate = canonicalize_best_effort(&candidate);

    // 3. Must equal workspace or be workspace-prefixed.
    if canonical_candidate != canonical_workspace
        && !canonical_candidate.starts_with(&canonical_workspace)
    {
        return Err(ValidationError::escapes(canonical_candidate.display().to_string()));
    }

    // 4. Relative-path denylist.
    let relative = canonical_candidate
        .strip_prefix(&canonical_workspace)
        .unwrap_or_else(|_| Path::new(""));
    let relative_str = relative.to_string_lossy().replace('\\', "/");
    for (blocked, reason) in BLOCKED_RELATIVE_PREFIXES {
        if relative_str.starts_with(blocked) || relative_str.contains(blocked) {
            return Err(ValidationError::blocked(relative_str.clone(), reason.to_string()));
        }
    }

    Ok(canonical_candidate)
}

/// `Path::canonicalize` fails for paths that don't exist yet (e.g. a
/// `create` target). Fall back to canonicalizing the parent directory and
/// re-appending the file name.
fn canonicalize_best_effort(path: &Path) -> PathBuf {
    if let Ok(canon) = path.canonicalize() {
        return canon;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(canon_parent) => canon_parent.join(name),
            Err(_) => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

const DIFF_FLAG_ALLOWLIST: &[&str] = &[
    "--cached",
    "--staged",
    "--stat",
    "--name-only",
    "--name-status",
    "--shortstat",
    "--numstat",
    "--no-color",
];

const COMMIT_FLAG_ALLOWLIST: &[&str] = &["-m", "--message"];

/// `git diff` flags must all be in the fixed allowlist.
pub fn validate_diff_flags(flags: &[&str]) -> Result<(), ValidationError> {
    for flag in flags {
        if !DIFF_FLAG_ALLOWLIST.contains(flag) {
            return Err(ValidationError::flag_not_allowed(*flag));
        }
    }
    Ok(())
}

/// `git commit` flags must all be in the fixed allowlist (besides the
/// always-prepended `--no-verify`, which the caller adds separately).
pub fn validate_commit_flags(flags: &[&str]) -> Result<(), ValidationError> {
    for flag in flags {
        if !COMMIT_FLAG_ALLOWLIST.contains(flag) {
            return Err(ValidationError::flag_not_allowed(*flag));
        }
    }
    Ok(())
}

/// Command-name allowlist for the `bash_command` tool, mapped to the fixed
/// absolute binary paths the sandbox image is guaranteed to provide.
const COMMAND_ALLOWLIST: &[(&str, &str)] = &[
    ("cat", "/bin/cat"),
    ("head", "/usr/bin/head"),
    ("tail", "/usr/bin/tail"),
    ("find", "/usr/bin/find"),
    ("wc", "/usr/bin/wc"),
];

/// Flags that are never permitted when the command is `find`: they let the
/// LLM run or delete arbitrary things via `find`'s own exec primitives.
const FIND_FLAG_DENYLIST: &[&str] = &["-exec", "-execdir", "-delete", "-ok", "-okdir"];

/// Map a command name to its fixed absolute binary path, or reject it.
pub fn resolve_command(command: &str) -> Result<&'static str, ValidationError> {
    COMMAND_ALLOWLIST
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, path)| *path)
        .ok_or_else(|| ValidationError::command_not_allowed(command))
}

/// Reject denylisted `find` flags. A no-op for every other command.
pub fn validate_find_args(command: &str, args: &[&str]) -> Result<(), ValidationError> {
    if command != "find" {
        return Ok(());
    }
    for arg in args {
        if FIND_FLAG_DENYLIST.contains(arg) {
            return Err(ValidationError::flag_not_allowed(*arg));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn workspace() -> tempfile::TempDir {
        tempdir().unwrap()
    }

    #[test]
    fn accepts_plain_relative_path() {
        let ws = workspace();
        std::fs::write(ws.path().join("file.txt"), "hi").unwrap();
        let result = validate_path("file.txt", ws.path()).unwrap();
        assert_eq!(result, ws.path().canonicalize().unwrap().join("file.txt"));
    }

    #[test]
    fn accepts_workspace_root_itself() {
        let ws = workspace();
        let result = validate_path(".", ws.path()).unwrap();
        assert_eq!(result, ws.path().canonicalize().unwrap());
    }

    #[test]
    fn rejects_nul_byte() {
        let ws = workspace();
        let err = validate_path("foo\0bar", ws.path()).unwrap_err();
        assert!(matches!(err, ValidationError::NulByte));
    }

    #[test]
    fn rejects_parent_traversal_escape() {
        let ws = workspace();
        let err = validate_path("../../etc/passwd", ws.path()).unwrap_err();
        assert!(matches!(err, ValidationError::Escapes { .. }));
    }

    #[test]
    fn rejects_git_hooks() {
        let ws = workspace();
        std::fs::create_dir_all(ws.path().join(".git/hooks")).unwrap();
        std::fs::write(ws.path().join(".git/hooks/pre-commit"), "#!/bin/sh").unwrap();
        let err = validate_path(".git/hooks/pre-commit", ws.path()).unwrap_err();
        assert!(matches!(err, ValidationError::Blocked { .. }));
    }

    #[test]
    fn rejects_node_modules_bin() {
        let ws = workspace();
        std::fs::create_dir_all(ws.path().join("node_modules/.bin")).unwrap();
        std::fs::write(ws.path().join("node_modules/.bin/tsc"), "x").unwrap();
        let err = validate_path("node_modules/.bin/tsc", ws.path()).unwrap_err();
        assert!(matches!(err, ValidationError::Blocked { .. }));
    }

    #[test]
    fn accepts_not_yet_existing_write_target() {
        let ws = workspace();
        let result = validate_path("new_file.txt", ws.path()).unwrap();
        assert_eq!(result, ws.path().canonicalize().unwrap().join("new_file.txt"));
    }

    #[test]
    fn diff_flags_allowlist() {
        assert!(validate_diff_flags(&["--cached", "--stat"]).is_ok());
        assert!(validate_diff_flags(&["--force"]).is_err());
    }

    #[test]
    fn commit_flags_allowlist() {
        assert!(validate_commit_flags(&["-m"]).is_ok());
        assert!(validate_commit_flags(&["--amend"]).is_err());
    }

    #[test]
    fn resolves_known_commands() {
        assert_eq!(resolve_command("cat").unwrap(), "/bin/cat");
        assert!(resolve_command("rm").is_err());
    }

    #[test]
    fn find_denylist_blocks_exec_family() {
        assert!(validate_find_args("find", &[".", "-exec", "rm", "{}", ";"]).is_err());
        assert!(validate_find_args("find", &[".", "-name", "*.rs"]).is_ok());
        assert!(validate_find_args("cat", &["-exec"]).is_ok());
    }
}
