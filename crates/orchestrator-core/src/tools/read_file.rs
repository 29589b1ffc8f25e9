use std::path::PathBuf;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::container::ContainerRuntime;
use crate::error::ToolError;
use crate::validator::validate_path;

use super::TOOL_EXEC_TIMEOUT;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    pub path: String,
}

/// `read_file(path)` — validate, `exec(["/bin/cat", path])`, map a
/// non-zero exit to an `Error reading file: ...` string.
pub async fn call(
    args: ReadFileArgs,
    workspace: &PathBuf,
    runtime: &mut dyn ContainerRuntime,
) -> Result<String, ToolError> {
    let validated = validate_path(&args.path, workspace)?;
    let result = runtime
        .exec(
            &["/bin/cat".to_string(), validated.to_string_lossy().into_owned()],
            TOOL_EXEC_TIMEOUT,
        )
        .await?;
    if result.is_success() {
        Ok(result.stdout)
    } else {
        Ok(format!("Error reading file: {}", result.stderr))
    }
}
