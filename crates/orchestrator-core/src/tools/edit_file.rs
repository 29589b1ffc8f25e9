//! `edit_file`: `str_replace` and `create`. Reads race the container's
//! `cat` (the container's rootfs is read-only) while writes happen on the
//! host filesystem, atomically, at mode `0o644` so the container user (a
//! different UID) can read the file back via the bind mount.
//!
//! Exact-match only: no fuzzy whitespace-normalized fallback. This driver
//! talks to a cloud model, so ambiguity is reported back to the LLM (with
//! 1-based line numbers) rather than guessed at.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::Deserialize;

use crate::container::ContainerRuntime;
use crate::error::ToolError;
use crate::validator::validate_path;

use super::TOOL_EXEC_TIMEOUT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EditFileCommand {
    StrReplace,
    Create,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EditFileArgs {
    pub command: EditFileCommand,
    pub path: String,
    pub old_str: Option<String>,
    pub new_str: Option<String>,
    pub content: Option<String>,
}

const FILE_MODE: u32 = 0o644;

pub async fn call(
    args: EditFileArgs,
    workspace: &PathBuf,
    runtime: &mut dyn ContainerRuntime,
) -> Result<String, ToolError> {
    let validated = validate_path(&args.path, workspace)?;
    match args.command {
        EditFileCommand::StrReplace => str_replace(&validated, args, runtime).await,
        EditFileCommand::Create => create(&validated, args),
    }
}

async fn str_replace(
    validated_path: &Path,
    args: EditFileArgs,
    runtime: &mut dyn ContainerRuntime,
) -> Result<String, ToolError> {
    let old_str = args
        .old_str
        .ok_or_else(|| ToolError::Other("str_replace requires old_str".to_string()))?;
    let new_str = args
        .new_str
        .ok_or_else(|| ToolError::Other("str_replace requires new_str".to_string()))?;

    let read = runtime
        .exec(
            &["/bin/cat".to_string(), validated_path.to_string_lossy().into_owned()],
            TOOL_EXEC_TIMEOUT,
        )
        .await?;
    if !read.is_success() {
        return Err(ToolError::Other(format!("Error reading file: {}", read.stderr)));
    }
    let content = read.stdout;

    let offsets = find_all(&content, &old_str);
    match offsets.len() {
        0 => Err(ToolError::NoMatch),
        1 => {
            let offset = offsets[0];
            let mut new_content = String::with_capacity(content.len() - old_str.len() + new_str.len());
            new_content.push_str(&content[..offset]);
            new_content.push_str(&new_str);
            new_content.push_str(&content[offset + old_str.len()..]);
            write_atomic(validated_path, &new_content)?;
            Ok(format!(
                "Replaced 1 occurrence in {} ({} -> {} bytes)",
                validated_path.display(),
                content.len(),
                new_content.len()
            ))
        }
        n => {
            let lines = matching_line_numbers(&content, &offsets);
            Err(ToolError::MultipleMatches {
                count: n,
                lines: lines.join(", "),
            })
        }
    }
}

fn create(validated_path: &Path, args: EditFileArgs) -> Result<String, ToolError> {
    let content = args
        .content
        .ok_or_else(|| ToolError::Other("create requires content".to_string()))?;

    match std::fs::metadata(validated_path) {
        Ok(_) => return Err(ToolError::FileExists(validated_path.display().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ToolError::Io(e)),
    }

    write_atomic(validated_path, &content)?;
    Ok(format!("Created {} ({} bytes)", validated_path.display(), content.len()))
}

/// Write to a temp file on the same filesystem, then rename, for an
/// atomic write. Mode `0o644` so the container's bind-mounted read can
/// see it.
fn write_atomic(path: &Path, content: &str) -> Result<(), ToolError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(FILE_MODE))?;
    tmp.persist(path).map_err(|e| ToolError::Io(e.error))?;
    Ok(())
}

/// Non-overlapping byte offsets of every occurrence of `needle` in
/// `haystack`, full-string (multi-line aware), not per-line.
fn find_all(haystack: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    let mut offsets = Vec::new();
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let absolute = start + pos;
        offsets.push(absolute);
        start = absolute + needle.len();
    }
    offsets
}

/// 1-based line number containing each byte offset, for the "found N
/// times on lines ..." disambiguation message.
fn matching_line_numbers(content: &str, offsets: &[usize]) -> Vec<String> {
    offsets
        .iter()
        .map(|&offset| {
            let line = content[..offset].matches('\n').count() + 1;
            line.to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_all_counts_non_overlapping_occurrences() {
        assert_eq!(find_all("foo\nbar\nfoo\nbaz", "foo"), vec![0, 8]);
        assert_eq!(find_all("aaaa", "aa"), vec![0, 2]);
        assert_eq!(find_all("abc", "z"), Vec::<usize>::new());
    }

    #[test]
    fn matching_line_numbers_is_one_based() {
        let content = "foo\nbar\nfoo\nbaz";
        let offsets = find_all(content, "foo");
        assert_eq!(matching_line_numbers(content, &offsets), vec!["1", "3"]);
    }
}
