use std::path::PathBuf;
use std::sync::Arc;

use gw_domain::bus::EventBus;
use gw_domain::config::Config;
use gw_providers::LlmRouter;
use gw_sessions::{IdentityResolver, LifecycleManager, SessionStore, TranscriptWriter};
use gw_tools::{ProcessManager, ToolRegistry};

use crate::runtime::cancel::CancelMap;
use crate::runtime::commands::CommandRegistry;
use crate::runtime::schedules::ScheduleStore;
use crate::runtime::session_lock::SessionLockMap;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, LLM router
/// - **Session management** — sessions, identity, lifecycle, transcripts, locks
/// - **Runtime** — processes, cancellation, schedules, event bus
/// - **Security** — API bearer token hash, workspace root
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<LlmRouter>,

    // ── Session management ────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub identity: Arc<IdentityResolver>,
    pub lifecycle: Arc<LifecycleManager>,
    pub transcripts: Arc<TranscriptWriter>,
    pub session_locks: Arc<SessionLockMap>,

    // ── Tools & processes ───────────────────────────────────────────────
    pub tools: Arc<ToolRegistry>,
    pub processes: Arc<ProcessManager>,
    pub cancel_map: Arc<CancelMap>,

    // ── Scheduling ───────────────────────────────────────────────────────
    pub schedules: Arc<ScheduleStore>,

    // ── Slash commands ───────────────────────────────────────────────────
    pub commands: Arc<CommandRegistry>,

    // ── Event/command bus ────────────────────────────────────────────────
    pub bus: Arc<EventBus>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,

    /// Workspace root every `file.*`/`exec` tool call is contained to.
    pub workspace_root: PathBuf,
}
