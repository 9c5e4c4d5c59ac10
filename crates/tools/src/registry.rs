//! Built-in tool registry: wraps `exec`/`process`/`file_ops` behind the
//! uniform [`Tool`] contract and adds the stub web/http tools whose real
//! implementations are left to external collaborators.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use gw_sandbox::validate::AccessMode;

use crate::file_ops::{self, FileAppendRequest, FileDeleteRequest, FileListRequest, FileMoveRequest, FileReadRequest, FileWriteRequest};
use crate::process::{self, ProcessRequest};
use crate::traits::{Tool, ToolContext, ToolError, ToolResult};
use crate::exec::{self, ExecRequest};

/// Resolve `requested` under `ctx`'s sandbox policy for `mode`, returning
/// a `ToolError::denied` on any rejection. This does not replace the
/// containment check already inside `file_ops::*` — it runs *before* it,
/// adding the stronger symlink/denylist/protected-write checks when the
/// session has sandboxing turned on.
fn gate_path(ctx: &ToolContext, requested: &str, mode: AccessMode) -> Result<(), ToolError> {
    if ctx.sandbox_enabled {
        gw_sandbox::validate_sandboxed_path(&ctx.workspace_root, requested, mode)
            .map(|_| ())
            .map_err(|e| ToolError::denied(e.to_string()))
    } else {
        file_ops::validate_path(&ctx.workspace_root, requested)
            .map(|_| ())
            .map_err(ToolError::denied)
    }
}

fn map_string_err(r: Result<Value, String>) -> ToolResult {
    r.map_err(ToolError::invalid_input)
}

// ── exec ─────────────────────────────────────────────────────────────

pub struct ExecTool;

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }
    fn description(&self) -> &str {
        "Run a shell command. Auto-backgrounds if it doesn't finish within yield_ms."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "background": {"type": "boolean"},
                "yield_ms": {"type": "integer"},
                "timeout_sec": {"type": "integer"},
                "workdir": {"type": "string"},
                "env": {"type": "object"}
            },
            "required": ["command"]
        })
    }
    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let req: ExecRequest = serde_json::from_value(input)
            .map_err(|e| ToolError::invalid_input(e.to_string()))?;
        let resp = exec::exec(&ctx.processes, req).await;
        serde_json::to_value(resp).map_err(|e| ToolError::invalid_input(e.to_string()))
    }
}

pub struct ProcessTool;

#[async_trait]
impl Tool for ProcessTool {
    fn name(&self) -> &str {
        "process"
    }
    fn description(&self) -> &str {
        "Manage background process sessions: list, poll, log, write, kill, clear, remove."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["list", "poll", "log", "write", "kill", "clear", "remove"]},
                "session_id": {"type": "string"},
                "offset": {"type": "integer"},
                "limit": {"type": "integer"},
                "tail_lines": {"type": "integer"},
                "data": {"type": "string"},
                "eof": {"type": "boolean"}
            },
            "required": ["action"]
        })
    }
    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let req: ProcessRequest = serde_json::from_value(input)
            .map_err(|e| ToolError::invalid_input(e.to_string()))?;
        let resp = process::handle_process(&ctx.processes, req).await;
        serde_json::to_value(resp).map_err(|e| ToolError::invalid_input(e.to_string()))
    }
}

// ── file ops ─────────────────────────────────────────────────────────

macro_rules! file_tool {
    ($struct_name:ident, $tool_name:literal, $description:literal, $req:ty, $path_field:ident, $mode:expr, $func:path, $schema:expr) => {
        pub struct $struct_name;

        #[async_trait]
        impl Tool for $struct_name {
            fn name(&self) -> &str {
                $tool_name
            }
            fn description(&self) -> &str {
                $description
            }
            fn parameters_schema(&self) -> Value {
                $schema
            }
            async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
                let req: $req = serde_json::from_value(input)
                    .map_err(|e| ToolError::invalid_input(e.to_string()))?;
                gate_path(ctx, &req.$path_field, $mode)?;
                map_string_err($func(&ctx.workspace_root, req).await)
            }
        }
    };
}

file_tool!(
    FileReadTool,
    "file.read",
    "Read a text file within the workspace, optionally windowed by line offset/limit.",
    FileReadRequest,
    path,
    AccessMode::Read,
    file_ops::file_read,
    json!({"type": "object", "properties": {"path": {"type": "string"}, "offset": {"type": "integer"}, "limit": {"type": "integer"}}, "required": ["path"]})
);

file_tool!(
    FileWriteTool,
    "file.write",
    "Write (overwrite) a text file within the workspace.",
    FileWriteRequest,
    path,
    AccessMode::Write,
    file_ops::file_write,
    json!({"type": "object", "properties": {"path": {"type": "string"}, "content": {"type": "string"}}, "required": ["path", "content"]})
);

file_tool!(
    FileAppendTool,
    "file.append",
    "Append text to a file within the workspace.",
    FileAppendRequest,
    path,
    AccessMode::Write,
    file_ops::file_append,
    json!({"type": "object", "properties": {"path": {"type": "string"}, "content": {"type": "string"}}, "required": ["path", "content"]})
);

file_tool!(
    FileDeleteTool,
    "file.delete",
    "Delete a file or empty directory within the workspace.",
    FileDeleteRequest,
    path,
    AccessMode::Write,
    file_ops::file_delete,
    json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]})
);

file_tool!(
    FileListTool,
    "file.list",
    "List the contents of a directory within the workspace.",
    FileListRequest,
    path,
    AccessMode::Read,
    file_ops::file_list,
    json!({"type": "object", "properties": {"path": {"type": "string"}}})
);

pub struct FileMoveTool;

#[async_trait]
impl Tool for FileMoveTool {
    fn name(&self) -> &str {
        "file.move"
    }
    fn description(&self) -> &str {
        "Move or rename a file within the workspace."
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {"source": {"type": "string"}, "destination": {"type": "string"}}, "required": ["source", "destination"]})
    }
    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let req: FileMoveRequest = serde_json::from_value(input)
            .map_err(|e| ToolError::invalid_input(e.to_string()))?;
        gate_path(ctx, &req.source, AccessMode::Write)?;
        gate_path(ctx, &req.destination, AccessMode::Write)?;
        map_string_err(file_ops::file_move(&ctx.workspace_root, req).await)
    }
}

// ── external-collaborator stubs ─────────────────────────────────────

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web.search"
    }
    fn description(&self) -> &str {
        "Search the web. Not implemented by this gateway — wire up a provider."
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]})
    }
    async fn execute(&self, _ctx: &ToolContext, _input: Value) -> ToolResult {
        Err(ToolError::new(crate::traits::ToolErrorKind::NotFound, "web.search has no backing provider configured"))
    }
}

pub struct HttpRequestTool;

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http.request"
    }
    fn description(&self) -> &str {
        "Make an HTTP request. Not implemented by this gateway — wire up a fetcher."
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {"url": {"type": "string"}, "method": {"type": "string"}}, "required": ["url"]})
    }
    async fn execute(&self, _ctx: &ToolContext, _input: Value) -> ToolResult {
        Err(ToolError::new(crate::traits::ToolErrorKind::NotFound, "http.request has no backing fetcher configured"))
    }
}

// ── registry ─────────────────────────────────────────────────────────

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// The exec/process/file/web/http tool set every gateway instance ships with.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self { tools: HashMap::new() };
        registry.register(Arc::new(ExecTool));
        registry.register(Arc::new(ProcessTool));
        registry.register(Arc::new(FileReadTool));
        registry.register(Arc::new(FileWriteTool));
        registry.register(Arc::new(FileAppendTool));
        registry.register(Arc::new(FileDeleteTool));
        registry.register(Arc::new(FileListTool));
        registry.register(Arc::new(FileMoveTool));
        registry.register(Arc::new(WebSearchTool));
        registry.register(Arc::new(HttpRequestTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_owned(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn definitions(&self) -> Vec<gw_domain::tool::ToolDefinition> {
        self.tools
            .values()
            .map(|t| gw_domain::tool::ToolDefinition {
                name: t.name().to_owned(),
                description: t.description().to_owned(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub async fn dispatch(&self, ctx: &ToolContext, name: &str, input: Value) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(ctx, input).await,
            None => Err(ToolError::new(crate::traits::ToolErrorKind::NotFound, format!("unknown tool '{name}'"))),
        }
    }
}
