//! Turn execution loop — the inner orchestrator that streams LLM
//! responses, dispatches tool calls, and extracts media references.
//!
//! Entry point: [`run_turn`] spawns the async loop and returns a channel
//! of [`TurnEvent`]s.

use std::collections::HashMap;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::Instrument;

use gw_domain::capability::Purpose;
use gw_domain::stream::{StreamEvent, Usage};
use gw_domain::tool::{Message, ToolCall, ToolDefinition};
use gw_providers::ChatRequest;
use gw_tools::media;

use crate::state::AppState;

use super::cancel::CancelToken;
use super::commands::CommandRegistry;
use super::compact;
use super::tools;
use super::{
    build_assistant_tool_message, load_raw_transcript, persist_transcript,
    transcript_lines_to_messages, truncate_str,
};

/// Maximum number of tool-call loops before we force-stop.
const MAX_TOOL_LOOPS: usize = 25;

/// A static system preamble describing the agent's role and tool access.
const SYSTEM_PREAMBLE: &str = "You are a personal agent with access to a sandboxed \
toolset (shell execution, file access, background processes). Use tools when they \
help answer the request; otherwise respond directly. When producing a file or image \
the user should see, reference it with a `MEDIA:` marker or an inline \
`{{media:<mime>:'<path>'}}` marker.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnContext — pre-built state for one turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything the tool loop needs, built once before the first LLM call.
struct TurnContext {
    session_id: String,
    messages: Vec<Message>,
    tool_defs: Vec<ToolDefinition>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent — the agent event stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a single agent turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    /// A chunk of the model's extended/interleaved reasoning.
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { text: String },

    /// Incremental text from the assistant.
    #[serde(rename = "text_delta")]
    TextDelta { text: String },

    /// The model is invoking a tool.
    #[serde(rename = "tool_start")]
    ToolStart {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },

    /// Tool execution finished.
    #[serde(rename = "tool_end")]
    ToolEnd {
        call_id: String,
        tool_name: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },

    /// A media reference (file/image) extracted from the assistant's output.
    #[serde(rename = "media_ready")]
    MediaReady {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        mime: Option<String>,
    },

    /// The turn finished, successfully or by cancellation.
    #[serde(rename = "agent_end")]
    AgentEnd {
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        stopped: bool,
        input_tokens: u32,
        output_tokens: u32,
        total_tokens: u32,
    },

    /// The turn failed.
    #[serde(rename = "agent_error")]
    AgentError { message: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single turn.
pub struct TurnInput {
    pub session_key: String,
    pub user_message: String,
    /// Model override (e.g. "openai/gpt-4o"). `None` uses the agent purpose's
    /// configured model chain.
    pub model_override: Option<String>,
    /// Request the model to respond with valid JSON only.
    pub json_mode: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn — the core orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one agent turn: build context, call the LLM, dispatch tools, loop.
///
/// Returns a `run_id` (UUID, for tracing correlation) and a channel
/// receiver of [`TurnEvent`]s — the caller reads events as they arrive for
/// SSE streaming, or drains them for a non-streaming response.
///
/// Registers a cancel token so `POST /v1/sessions/:key/stop` can abort
/// the turn cleanly.
pub fn run_turn(state: AppState, input: TurnInput) -> (uuid::Uuid, mpsc::Receiver<TurnEvent>) {
    let (tx, rx) = mpsc::channel::<TurnEvent>(64);

    let run_id = uuid::Uuid::new_v4();
    let cancel_token = state.cancel_map.register(&input.session_key);
    let session_key = input.session_key.clone();
    let state_ref = state;

    let turn_span = tracing::info_span!(
        "turn",
        %run_id,
        session_key = %session_key,
        "otel.kind" = "SERVER",
    );
    tokio::spawn(tracing::Instrument::instrument(
        async move {
            tracing::debug!("turn started");
            let result =
                run_turn_inner(state_ref.clone(), input, tx.clone(), &cancel_token).await;

            state_ref.cancel_map.remove(&session_key);

            if let Err(e) = result {
                let _ = tx
                    .send(TurnEvent::AgentError {
                        message: e.to_string(),
                    })
                    .await;
            }
        },
        turn_span,
    ));

    (run_id, rx)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Extracted helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle a cancellation event: persist a transcript marker and send a
/// stopped [`TurnEvent::AgentEnd`] to the caller.
async fn handle_cancellation(
    state: &AppState,
    tx: &mpsc::Sender<TurnEvent>,
    session_id: &str,
    partial_content: &str,
    context_msg: &str,
) {
    persist_transcript(
        &state.transcripts,
        session_id,
        "system",
        &format!(
            "[run aborted by user{context_msg}]{}",
            if partial_content.is_empty() {
                String::new()
            } else {
                format!(" partial: {partial_content}")
            }
        ),
        Some(serde_json::json!({ "stopped": true })),
    );
    let _ = tx
        .send(TurnEvent::AgentEnd {
            content: partial_content.to_string(),
            stopped: true,
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
        })
        .await;
}

/// Finalize a successful run: persist the assistant transcript, extract
/// media markers, send `AgentEnd`, and record usage in the session store.
async fn finalize_run_success(
    state: &AppState,
    tx: &mpsc::Sender<TurnEvent>,
    input: &TurnInput,
    session_id: &str,
    text_buf: &str,
    total_usage: &Usage,
) {
    persist_transcript(&state.transcripts, session_id, "assistant", text_buf, None);

    let (cleaned, media_refs) = media::extract_media(text_buf);
    for m in &media_refs {
        let _ = tx
            .send(TurnEvent::MediaReady {
                path: m.path.clone(),
                mime: m.mime.clone(),
            })
            .await;
    }

    let _ = tx
        .send(TurnEvent::AgentEnd {
            content: cleaned,
            stopped: false,
            input_tokens: total_usage.prompt_tokens,
            output_tokens: total_usage.completion_tokens,
            total_tokens: total_usage.total_tokens,
        })
        .await;

    state.sessions.record_usage(
        &input.session_key,
        total_usage.prompt_tokens as u64,
        total_usage.completion_tokens as u64,
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn_inner — the main tool loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn_inner(
    state: AppState,
    input: TurnInput,
    tx: mpsc::Sender<TurnEvent>,
    cancel: &CancelToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // ── Phase 0: Slash commands bypass the LLM entirely ─────────────────
    if let Some((plain, _markdown)) = state
        .commands
        .dispatch(&state, &input.session_key, &input.user_message)
        .await
    {
        let (entry, _is_new) = state.sessions.resolve_or_create(
            &input.session_key,
            gw_sessions::store::SessionOrigin::default(),
            state.config.tools.sandbox.default_enabled,
        );
        persist_transcript(&state.transcripts, &entry.session_id, "user", &input.user_message, None);
        persist_transcript(&state.transcripts, &entry.session_id, "assistant", &plain, None);
        let _ = tx
            .send(TurnEvent::AgentEnd {
                content: plain,
                stopped: false,
                input_tokens: 0,
                output_tokens: 0,
                total_tokens: 0,
            })
            .await;
        return Ok(());
    }

    // ── Phase 1: Build the turn context (session, messages, tool defs) ──
    let ctx = prepare_turn_context(&state, &input).await?;
    let TurnContext {
        session_id,
        mut messages,
        tool_defs,
    } = ctx;

    // ── Phase 2: Tool loop ───────────────────────────────────────────────
    let mut total_usage = Usage {
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
    };

    for loop_idx in 0..MAX_TOOL_LOOPS {
        tracing::debug!(loop_idx, "tool loop iteration");

        if cancel.is_cancelled() {
            persist_transcript(
                &state.transcripts,
                &session_id,
                "system",
                "[run aborted by user]",
                Some(serde_json::json!({ "stopped": true })),
            );
            let _ = tx
                .send(TurnEvent::AgentEnd {
                    content: String::new(),
                    stopped: true,
                    input_tokens: 0,
                    output_tokens: 0,
                    total_tokens: 0,
                })
                .await;
            return Ok(());
        }

        let req = ChatRequest {
            messages: messages.clone(),
            tools: tool_defs.clone(),
            temperature: Some(0.2),
            max_tokens: None,
            json_mode: input.json_mode,
            model: input.model_override.clone(),
        };

        let llm_call_span = tracing::info_span!(
            "llm.call",
            "otel.kind" = "CLIENT",
            model = req.model.as_deref().unwrap_or("default"),
            input_tokens = tracing::field::Empty,
            output_tokens = tracing::field::Empty,
        );
        let _llm_guard = llm_call_span.enter();

        let mut stream = state
            .llm
            .chat_stream_for_purpose(Purpose::Agent, req)
            .await?;

        let mut text_buf = String::new();
        let mut pending_tool_calls: Vec<ToolCall> = Vec::new();
        let mut turn_usage: Option<Usage> = None;
        let mut was_cancelled = false;

        // call_id -> (name, args_json)
        let mut tc_bufs: HashMap<String, (String, String)> = HashMap::new();

        while let Some(event_result) = stream.next().await {
            if cancel.is_cancelled() {
                was_cancelled = true;
                break;
            }

            let event = event_result?;
            match event {
                StreamEvent::ThinkingDelta { text } => {
                    let _ = tx.send(TurnEvent::ThinkingDelta { text }).await;
                }
                StreamEvent::Token { text } => {
                    let _ = tx
                        .send(TurnEvent::TextDelta { text: text.clone() })
                        .await;
                    text_buf.push_str(&text);
                }
                StreamEvent::ToolCallStarted {
                    call_id,
                    tool_name,
                } => {
                    tc_bufs.insert(call_id, (tool_name, String::new()));
                }
                StreamEvent::ToolCallDelta { call_id, delta } => {
                    if let Some((_, args)) = tc_bufs.get_mut(&call_id) {
                        args.push_str(&delta);
                    }
                }
                StreamEvent::ToolCallFinished {
                    call_id,
                    tool_name,
                    arguments,
                } => {
                    pending_tool_calls.push(ToolCall {
                        call_id: call_id.clone(),
                        tool_name,
                        arguments,
                    });
                    tc_bufs.remove(&call_id);
                }
                StreamEvent::Done {
                    usage,
                    finish_reason: _,
                } => {
                    turn_usage = usage;
                }
                StreamEvent::Error { message } => {
                    let _ = tx.send(TurnEvent::AgentError { message }).await;
                    return Ok(());
                }
            }
        }

        if let Some(u) = &turn_usage {
            llm_call_span.record("input_tokens", u.prompt_tokens);
            llm_call_span.record("output_tokens", u.completion_tokens);
        }
        drop(_llm_guard);

        if was_cancelled {
            handle_cancellation(&state, &tx, &session_id, &text_buf, "").await;
            return Ok(());
        }

        // Assemble tool calls that came through start/delta but never got a
        // ToolCallFinished (some providers only emit start+delta).
        for (call_id, (name, args_str)) in tc_bufs.drain() {
            let arguments = if args_str.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                match serde_json::from_str(&args_str) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(
                            call_id = %call_id,
                            tool = %name,
                            error = %e,
                            "tool call arguments are not valid JSON; defaulting to empty object"
                        );
                        Value::Object(Default::default())
                    }
                }
            };
            pending_tool_calls.push(ToolCall {
                call_id,
                tool_name: name,
                arguments,
            });
        }

        if let Some(u) = &turn_usage {
            total_usage.prompt_tokens += u.prompt_tokens;
            total_usage.completion_tokens += u.completion_tokens;
            total_usage.total_tokens += u.total_tokens;
        }

        if pending_tool_calls.is_empty() {
            finalize_run_success(&state, &tx, &input, &session_id, &text_buf, &total_usage).await;
            return Ok(());
        }

        // ── Tool dispatch ──────────────────────────────────────────
        messages.push(build_assistant_tool_message(&text_buf, &pending_tool_calls));

        let tc_json = serde_json::to_string(&pending_tool_calls).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to serialize tool calls for transcript");
            String::new()
        });
        persist_transcript(
            &state.transcripts,
            &session_id,
            "assistant",
            &text_buf,
            Some(serde_json::json!({ "tool_calls": tc_json })),
        );

        for tc in &pending_tool_calls {
            if cancel.is_cancelled() {
                handle_cancellation(&state, &tx, &session_id, &text_buf, " during tool dispatch")
                    .await;
                return Ok(());
            }
            let _ = tx
                .send(TurnEvent::ToolStart {
                    call_id: tc.call_id.clone(),
                    tool_name: tc.tool_name.clone(),
                    arguments: tc.arguments.clone(),
                })
                .await;
        }

        if cancel.is_cancelled() {
            handle_cancellation(&state, &tx, &session_id, &text_buf, " during tool dispatch")
                .await;
            return Ok(());
        }

        // Dispatch all tools concurrently — latency is max(tool latencies)
        // instead of sum(tool latencies). join_all preserves original order
        // so result/event sequencing stays deterministic.
        let tool_futures: Vec<_> = pending_tool_calls
            .iter()
            .map(|tc| {
                let tool_span = tracing::info_span!("tool.call", tool_name = %tc.tool_name);
                tools::dispatch_tool(&state, &input.session_key, &tc.tool_name, tc.arguments.clone())
                    .instrument(tool_span)
            })
            .collect();
        let tool_results = futures_util::future::join_all(tool_futures).await;

        for (tc, result) in pending_tool_calls.iter().zip(tool_results) {
            let (content, is_error) = match result {
                Ok(v) => (
                    v.as_str().map(str::to_owned).unwrap_or_else(|| v.to_string()),
                    false,
                ),
                Err(e) => (e.to_string(), true),
            };

            let _ = tx
                .send(TurnEvent::ToolEnd {
                    call_id: tc.call_id.clone(),
                    tool_name: tc.tool_name.clone(),
                    content: content.clone(),
                    is_error,
                })
                .await;

            messages.push(Message::tool_result(&tc.call_id, &content));

            persist_transcript(
                &state.transcripts,
                &session_id,
                "tool",
                &content,
                Some(serde_json::json!({
                    "call_id": tc.call_id,
                    "tool_name": tc.tool_name,
                    "is_error": is_error,
                })),
            );
        }

        if loop_idx == MAX_TOOL_LOOPS - 1 {
            let _ = tx
                .send(TurnEvent::AgentError {
                    message: format!("tool loop limit reached ({MAX_TOOL_LOOPS} iterations)"),
                })
                .await;
        }
    }

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Phase 1 helper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Phase 1: resolve/create the session, load and compact the transcript,
/// assemble messages, and persist the user turn.
async fn prepare_turn_context(
    state: &AppState,
    input: &TurnInput,
) -> Result<TurnContext, Box<dyn std::error::Error + Send + Sync>> {
    let (entry, _is_new) = state.sessions.resolve_or_create(
        &input.session_key,
        gw_sessions::store::SessionOrigin::default(),
        state.config.tools.sandbox.default_enabled,
    );
    let session_id = entry.session_id;

    let mut all_lines = load_raw_transcript(&state.transcripts, &session_id);
    let mut boundary = compact::compaction_boundary(&all_lines);

    if compact::should_compact(&all_lines, &state.config.compaction) {
        if let Some(summarizer) = compact::resolve_compaction_provider(state) {
            match compact::run_compaction(
                summarizer.as_ref(),
                &state.transcripts,
                &session_id,
                &all_lines,
                &state.config.compaction,
            )
            .await
            {
                Ok(_summary) => {
                    all_lines = load_raw_transcript(&state.transcripts, &session_id);
                    boundary = compact::compaction_boundary(&all_lines);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "auto-compaction failed, continuing with full history");
                }
            }
        } else {
            tracing::warn!("no provider available for compaction, skipping");
        }
    }

    let history = transcript_lines_to_messages(&all_lines[boundary..]);
    let tool_defs = tools::build_tool_definitions(state);

    let mut messages = Vec::new();
    messages.push(Message::system(SYSTEM_PREAMBLE));
    messages.extend(history);
    messages.push(Message::user(&input.user_message));

    persist_transcript(
        &state.transcripts,
        &session_id,
        "user",
        &input.user_message,
        None,
    );

    Ok(TurnContext {
        session_id,
        messages,
        tool_defs,
    })
}
