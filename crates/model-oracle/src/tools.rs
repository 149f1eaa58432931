//! Project-source tools the model may call during a correction session.
//!
//! Two read-only tools are offered: listing a directory and reading a file,
//! both relative to the unpacked project source. Every path is resolved and
//! must stay inside that root. Failures are reported back to the model as
//! text rather than ending the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nixpack_core::SourceLocator;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const LIST_DIRECTORY: &str = "list_directory_contents";
pub const READ_FILE: &str = "read_file_content";

/// Tool output larger than this is cut at a line boundary.
const MAX_OUTPUT_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

fn path_tool(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        tool_type: function_type(),
        function: FunctionDefinition {
            name: name.to_string(),
            description: description.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "relative_path": {
                        "type": "string",
                        "description": "Path relative to the project source root"
                    }
                },
                "required": ["relative_path"]
            }),
        },
    }
}

/// Read-only access to the project source for the model.
#[derive(Clone)]
pub struct ProjectSourceTools {
    locator: Arc<dyn SourceLocator>,
}

impl ProjectSourceTools {
    pub fn new(locator: Arc<dyn SourceLocator>) -> Self {
        Self { locator }
    }

    /// The source root, if a build has produced one yet.
    pub fn root(&self) -> Option<PathBuf> {
        self.locator.source_dir()
    }

    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            path_tool(
                LIST_DIRECTORY,
                "List the files and directories at a path inside the project source. \
                 Start with \".\" to see the top level.",
            ),
            path_tool(
                READ_FILE,
                "Read a text file inside the project source, such as a build manifest \
                 or lock file.",
            ),
        ]
    }

    /// Run one call against `root`. The result is always text for the model.
    pub async fn execute(&self, root: &Path, call: &ToolCall) -> String {
        debug!(tool = %call.function.name, arguments = %call.function.arguments, "tool call");
        let relative = match parse_relative_path(&call.function.arguments) {
            Ok(path) => path,
            Err(message) => return message,
        };
        let result = match call.function.name.as_str() {
            LIST_DIRECTORY => list_directory(root, &relative).await,
            READ_FILE => read_file(root, &relative).await,
            other => Err(format!("Unknown tool: {other}")),
        };
        match result {
            Ok(output) => truncate_output(output),
            Err(message) => message,
        }
    }
}

fn parse_relative_path(arguments: &str) -> Result<String, String> {
    #[derive(Deserialize)]
    struct PathArgs {
        relative_path: String,
    }

    serde_json::from_str::<PathArgs>(arguments)
        .map(|args| args.relative_path)
        .map_err(|e| format!("Invalid arguments: {e}"))
}

/// Resolve `relative` under `root`, refusing anything that lands outside it.
pub async fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, String> {
    let root = tokio::fs::canonicalize(root)
        .await
        .map_err(|e| format!("Project source {} is not available: {e}", root.display()))?;
    let target = tokio::fs::canonicalize(root.join(relative))
        .await
        .map_err(|_| format!("Path not found: {relative}"))?;
    if !target.starts_with(&root) {
        return Err(format!("Path '{relative}' is outside the project source root"));
    }
    Ok(target)
}

async fn list_directory(root: &Path, relative: &str) -> Result<String, String> {
    let dir = resolve_within(root, relative).await?;
    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .map_err(|e| format!("Failed to list '{relative}': {e}"))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| format!("Failed to list '{relative}': {e}"))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        names.push(if is_dir { format!("{name}/") } else { name });
    }
    if names.is_empty() {
        return Ok(format!("'{relative}' is empty"));
    }
    names.sort();
    Ok(names.join("\n"))
}

async fn read_file(root: &Path, relative: &str) -> Result<String, String> {
    let file = resolve_within(root, relative).await?;
    tokio::fs::read_to_string(&file)
        .await
        .map_err(|e| format!("Failed to read '{relative}': {e}"))
}

fn truncate_output(output: String) -> String {
    if output.len() <= MAX_OUTPUT_SIZE {
        return output;
    }
    let mut cut = MAX_OUTPUT_SIZE;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    let cut = output[..cut].rfind('\n').unwrap_or(cut);
    format!("{}\n\n... (truncated)", &output[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tools_for(root: &Path) -> ProjectSourceTools {
        ProjectSourceTools::new(Arc::new(root.to_path_buf()))
    }

    fn call(name: &str, path: &str) -> ToolCall {
        ToolCall::new("call_1", name, serde_json::json!({ "relative_path": path }).to_string())
    }

    #[test]
    fn test_definitions_are_function_tools() {
        let definitions = ProjectSourceTools::definitions();
        let names: Vec<_> = definitions.iter().map(|d| d.function.name.as_str()).collect();
        assert_eq!(names, vec![LIST_DIRECTORY, READ_FILE]);
        let json = serde_json::to_value(&definitions[0]).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["parameters"]["required"][0], "relative_path");
    }

    #[tokio::test]
    async fn test_lists_directory_sorted_with_dir_markers() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let tools = tools_for(dir.path());
        let output = tools.execute(dir.path(), &call(LIST_DIRECTORY, ".")).await;

        assert_eq!(output, "Cargo.toml\nsrc/");
    }

    #[tokio::test]
    async fn test_reads_file_inside_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();

        let tools = tools_for(dir.path());
        let output = tools.execute(dir.path(), &call(READ_FILE, "src/main.rs")).await;

        assert_eq!(output, "fn main() {}\n");
    }

    #[tokio::test]
    async fn test_refuses_paths_outside_root() {
        let outer = tempdir().unwrap();
        std::fs::write(outer.path().join("secret.txt"), "token").unwrap();
        let root = outer.path().join("source");
        std::fs::create_dir(&root).unwrap();

        let tools = tools_for(&root);
        let output = tools.execute(&root, &call(READ_FILE, "../secret.txt")).await;
        assert!(output.contains("outside the project source root"), "{output}");

        let absolute = outer.path().join("secret.txt");
        let output = tools
            .execute(&root, &call(READ_FILE, &absolute.display().to_string()))
            .await;
        assert!(output.contains("outside the project source root"), "{output}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_refuses_symlink_escape() {
        let outer = tempdir().unwrap();
        std::fs::write(outer.path().join("secret.txt"), "token").unwrap();
        let root = outer.path().join("source");
        std::fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(outer.path().join("secret.txt"), root.join("link")).unwrap();

        let tools = tools_for(&root);
        let output = tools.execute(&root, &call(READ_FILE, "link")).await;

        assert!(output.contains("outside the project source root"), "{output}");
    }

    #[tokio::test]
    async fn test_bad_calls_become_messages() {
        let dir = tempdir().unwrap();
        let tools = tools_for(dir.path());

        let missing = tools.execute(dir.path(), &call(READ_FILE, "nope.txt")).await;
        assert_eq!(missing, "Path not found: nope.txt");

        let unknown = tools.execute(dir.path(), &call("run_shell", ".")).await;
        assert_eq!(unknown, "Unknown tool: run_shell");

        let garbled = ToolCall::new("call_2", READ_FILE, "{not json");
        assert!(tools.execute(dir.path(), &garbled).await.starts_with("Invalid arguments"));
    }

    #[test]
    fn test_truncates_long_output_at_line_boundary() {
        let line = "x".repeat(99);
        let long = vec![line.as_str(); 400].join("\n");
        let cut = truncate_output(long);
        assert!(cut.len() < MAX_OUTPUT_SIZE + 32);
        assert!(cut.ends_with("... (truncated)"));
        assert!(cut.lines().filter(|l| l.starts_with('x')).all(|l| l.len() == 99));
    }
}
