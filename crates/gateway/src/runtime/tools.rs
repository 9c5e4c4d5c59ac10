//! Tool dispatch for the runtime — a thin adapter between the agent turn
//! loop and the shared [`gw_tools::ToolRegistry`].

use gw_domain::tool::ToolDefinition;
use gw_tools::{ToolContext, ToolError};
use serde_json::Value;

use crate::state::AppState;

/// Build the set of tool definitions exposed to the LLM for this turn.
pub fn build_tool_definitions(state: &AppState) -> Vec<ToolDefinition> {
    state.tools.definitions()
}

/// Build the tool execution context for a session, honoring its per-session
/// sandbox toggle (falls back to the configured default for unknown sessions).
pub fn tool_context(state: &AppState, session_key: &str) -> ToolContext {
    let sandbox_enabled = state
        .sessions
        .get(session_key)
        .map(|entry| entry.sandbox)
        .unwrap_or(state.config.tools.sandbox.default_enabled);

    ToolContext {
        workspace_root: state.workspace_root.clone(),
        sandbox_enabled,
        processes: state.processes.clone(),
    }
}

/// Dispatch a single tool call by name, returning its JSON result or a
/// typed [`ToolError`].
pub async fn dispatch_tool(
    state: &AppState,
    session_key: &str,
    tool_name: &str,
    arguments: Value,
) -> Result<Value, ToolError> {
    let ctx = tool_context(state, session_key);
    state.tools.dispatch(&ctx, tool_name, arguments).await
}
