use serde::{Deserialize, Serialize};

/// The fixed set of tool names the core understands (spec §6). Anything else
/// is treated as an MCP/plugin tool and passed through `use_mcp_tool` /
/// `access_mcp_resource` rather than matched here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ReadFile,
    ListFiles,
    SearchFiles,
    ExecuteCommand,
    ApplyDiff,
    WriteToFile,
    SearchAndReplace,
    SearchReplace,
    UseMcpTool,
    AccessMcpResource,
    AttemptCompletion,
}

impl ToolName {
    /// Parse a snake_case API name. Returns `None` for MCP/plugin tools.
    #[must_use]
    pub fn from_api_name(s: &str) -> Option<Self> {
        Some(match s {
            "read_file" => Self::ReadFile,
            "list_files" => Self::ListFiles,
            "search_files" => Self::SearchFiles,
            "execute_command" => Self::ExecuteCommand,
            "apply_diff" => Self::ApplyDiff,
            "write_to_file" => Self::WriteToFile,
            "search_and_replace" => Self::SearchAndReplace,
            "search_replace" => Self::SearchReplace,
            "use_mcp_tool" => Self::UseMcpTool,
            "access_mcp_resource" => Self::AccessMcpResource,
            "attempt_completion" => Self::AttemptCompletion,
            _ => return None,
        })
    }

    /// The canonical snake_case API name.
    #[must_use]
    pub fn as_api_name(&self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::ListFiles => "list_files",
            Self::SearchFiles => "search_files",
            Self::ExecuteCommand => "execute_command",
            Self::ApplyDiff => "apply_diff",
            Self::WriteToFile => "write_to_file",
            Self::SearchAndReplace => "search_and_replace",
            Self::SearchReplace => "search_replace",
            Self::UseMcpTool => "use_mcp_tool",
            Self::AccessMcpResource => "access_mcp_resource",
            Self::AttemptCompletion => "attempt_completion",
        }
    }

    /// True for the read-only tools allowed unconditionally in ANALYZE.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::ReadFile
                | Self::ListFiles
                | Self::SearchFiles
                | Self::UseMcpTool
                | Self::AccessMcpResource
        )
    }

    /// True for tools that mutate files on the agent's behalf.
    #[must_use]
    pub fn is_modification(&self) -> bool {
        matches!(
            self,
            Self::ApplyDiff | Self::WriteToFile | Self::SearchAndReplace | Self::SearchReplace
        )
    }
}

/// Legacy camel-case aliases normalised to the canonical snake_case name
/// before dispatch (spec §6). Unknown names pass through unchanged so MCP
/// tool names are never mangled.
#[must_use]
pub fn normalize_tool_name(raw: &str) -> String {
    match raw {
        "readFile" => "read_file",
        "listFiles" => "list_files",
        "searchFiles" => "search_files",
        "executeCommand" => "execute_command",
        "applyDiff" => "apply_diff",
        "writeToFile" => "write_to_file",
        "searchAndReplace" => "search_and_replace",
        "searchReplace" => "search_replace",
        "useMcpTool" => "use_mcp_tool",
        "accessMcpResource" => "access_mcp_resource",
        "attemptCompletion" => "attempt_completion",
        other => other,
    }
    .to_string()
}

/// One proposed tool invocation. `params` is a dynamic string-keyed map
/// (spec §9) rather than a per-tool struct — known keys with semantic
/// meaning are `path`, `file_path`, `args`, `command`, `cwd`, `regex`,
/// `query`, `diff`, `content`, `file_text`, `patch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub params: serde_json::Value,
}

impl ToolCall {
    /// Parse the normalised name into a typed [`ToolName`]. Returns `None`
    /// for MCP/plugin tools.
    #[must_use]
    pub fn tool_name(&self) -> Option<ToolName> {
        ToolName::from_api_name(&normalize_tool_name(&self.name))
    }

    /// Fetch a string-valued param by any of the given keys, first match
    /// wins.
    #[must_use]
    pub fn param_str(&self, keys: &[&str]) -> Option<&str> {
        let obj = self.params.as_object()?;
        for key in keys {
            if let Some(v) = obj.get(*key).and_then(|v| v.as_str()) {
                return Some(v);
            }
        }
        None
    }
}

/// Outcome of actually running a tool, as reported back to the core by the
/// external runner (spec §6: output is an opaque string to the core).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
}

/// The external tool-execution boundary (out of scope — consumed only).
/// Mirrors the shape of `ToolHost` in the teacher's core crate: propose then
/// execute, with the core never doing either itself.
pub trait ToolHost {
    fn execute(&self, call: &ToolCall) -> ToolResult;
}
