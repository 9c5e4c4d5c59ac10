use serde::Serialize;

/// Structured trace events emitted across all gateway crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        purpose: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_provider: String,
        from_model: String,
        to_provider: String,
        to_model: String,
        reason: String,
    },
    ProviderCooldownEntered {
        provider: String,
        reason: String,
        duration_secs: i64,
        consecutive_failures: u32,
    },
    SessionResolved {
        session_key: String,
        session_id: String,
        is_new: bool,
    },
    SessionReset {
        session_key: String,
        old_session_id: String,
        new_session_id: String,
        reason: String,
    },
    RecordAppended {
        session_id: String,
        kind: String,
    },
    CompactionRun {
        session_id: String,
        turns_compacted: usize,
        summary_chars: usize,
    },
    CheckpointCreated {
        session_id: String,
        summary_chars: usize,
    },
    SandboxDenied {
        tool_name: String,
        path: String,
        reason: String,
    },
    ToolInvoked {
        tool_name: String,
        duration_ms: u64,
        is_error: bool,
    },
    ScheduleFired {
        schedule_id: String,
        kind: String,
    },
    IdentityResolved {
        raw_peer_id: String,
        canonical: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "gw_event");
    }
}
