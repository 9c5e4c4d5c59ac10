//! Slash-command dispatcher.
//!
//! Short-circuits the turn loop for direct control commands (`/status`,
//! `/compact`, ...) instead of sending them to the model. Handlers are
//! registered in a `HashMap<&'static str, Arc<dyn CommandHandler>>` built
//! once at startup, the same registration idiom the tool registry uses.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::state::AppState;

use super::compact;

/// A command's output: `(plain, markdown)`.
pub type CommandOutput = (String, String);

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, state: &AppState, session_key: &str, args: &[String]) -> CommandOutput;
}

/// Registry of built-in slash commands.
pub struct CommandRegistry {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn with_builtins() -> Self {
        let mut handlers: HashMap<&'static str, Arc<dyn CommandHandler>> = HashMap::new();
        handlers.insert("/status", Arc::new(StatusCommand));
        handlers.insert("/compact", Arc::new(CompactCommand));
        handlers.insert("/clear", Arc::new(ClearCommand));
        handlers.insert("/cleartool", Arc::new(ClearToolCommand));
        handlers.insert("/help", Arc::new(HelpCommand));
        handlers.insert("/heartbeat", Arc::new(HeartbeatCommand));
        handlers.insert("/hass", Arc::new(HassCommand));
        handlers.insert("/llm", Arc::new(LlmCommand));
        handlers.insert("/embeddings", Arc::new(EmbeddingsCommand));
        handlers.insert("/skills", Arc::new(SkillsCommand));
        Self { handlers }
    }

    /// Parse `input` as `/command [args...]` and run its handler.
    ///
    /// Returns `None` when `input` isn't a recognized slash command, so the
    /// caller can fall back to the normal agent turn.
    pub async fn dispatch(
        &self,
        state: &AppState,
        session_key: &str,
        input: &str,
    ) -> Option<CommandOutput> {
        let input = input.trim();
        if !input.starts_with('/') {
            return None;
        }

        let mut parts = input.split_whitespace();
        let name = parts.next()?;
        let args: Vec<String> = parts.map(str::to_owned).collect();

        let handler = self.handlers.get(name)?.clone();
        Some(handler.handle(state, session_key, &args).await)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct StatusCommand;

#[async_trait]
impl CommandHandler for StatusCommand {
    async fn handle(&self, state: &AppState, session_key: &str, _args: &[String]) -> CommandOutput {
        let session = state.sessions.get(session_key);
        let provider_count = state.llm.registry().len();
        let schedule_count = state.schedules.list().await.len();

        let plain = match &session {
            Some(s) => format!(
                "session {session_key} — {} turn(s), {} tokens total | {provider_count} provider(s), {schedule_count} schedule(s)",
                s.input_tokens + s.output_tokens,
                s.total_tokens,
            ),
            None => format!(
                "session {session_key} — not yet created | {provider_count} provider(s), {schedule_count} schedule(s)"
            ),
        };
        let markdown = format!("**Status**\n\n{plain}");
        (plain, markdown)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /compact
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct CompactCommand;

#[async_trait]
impl CommandHandler for CompactCommand {
    async fn handle(&self, state: &AppState, session_key: &str, _args: &[String]) -> CommandOutput {
        let Some(entry) = state.sessions.get(session_key) else {
            let msg = "no session to compact yet".to_string();
            return (msg.clone(), msg);
        };

        let Some(provider) = compact::resolve_compaction_provider(state) else {
            let msg = "no LLM provider available for compaction".to_string();
            return (msg.clone(), msg);
        };

        let lines = state.transcripts.read(&entry.session_id).unwrap_or_default();
        match compact::run_compaction(
            provider.as_ref(),
            &state.transcripts,
            &entry.session_id,
            &lines,
            &state.config.compaction,
        )
        .await
        {
            Ok(summary) => (
                format!("compacted: {summary}"),
                format!("**Compacted**\n\n{summary}"),
            ),
            Err(e) => {
                let msg = format!("compaction failed: {e}");
                (msg.clone(), msg)
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /clear
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ClearCommand;

#[async_trait]
impl CommandHandler for ClearCommand {
    async fn handle(&self, state: &AppState, session_key: &str, _args: &[String]) -> CommandOutput {
        match state.sessions.reset_session(session_key, "cleared via /clear") {
            Some(_) => {
                let msg = "session cleared".to_string();
                (msg.clone(), msg)
            }
            None => {
                let msg = "no session to clear yet".to_string();
                (msg.clone(), msg)
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /cleartool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ClearToolCommand;

#[async_trait]
impl CommandHandler for ClearToolCommand {
    async fn handle(&self, state: &AppState, _session_key: &str, _args: &[String]) -> CommandOutput {
        state.processes.cleanup_stale();
        let msg = "stale background process sessions cleared".to_string();
        (msg.clone(), msg)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /help
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct HelpCommand;

const HELP_TEXT: &str = "/status              session + provider + schedule summary
/compact              force transcript compaction now
/clear                reset this session's history
/cleartool            clear stale background process sessions
/heartbeat            list enabled schedules and next run times
/hass                 Home Assistant integration status
/llm status|reset     LLM provider readiness
/embeddings status|rebuild   embeddings provider readiness
/skills               list available skills
/help                 this message";

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn handle(&self, _state: &AppState, _session_key: &str, _args: &[String]) -> CommandOutput {
        (
            HELP_TEXT.to_string(),
            format!("**Commands**\n\n```\n{HELP_TEXT}\n```"),
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /heartbeat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct HeartbeatCommand;

#[async_trait]
impl CommandHandler for HeartbeatCommand {
    async fn handle(&self, state: &AppState, _session_key: &str, _args: &[String]) -> CommandOutput {
        let schedules = state.schedules.list().await;
        let enabled: Vec<_> = schedules.iter().filter(|s| s.enabled).collect();

        if enabled.is_empty() {
            let msg = "no enabled schedules".to_string();
            return (msg.clone(), msg);
        }

        let mut plain = String::new();
        let mut markdown = String::from("**Schedules**\n\n");
        for s in &enabled {
            let next = s
                .next_run_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unscheduled".to_string());
            plain.push_str(&format!("{} ({}) — next: {next}\n", s.name, s.cron));
            markdown.push_str(&format!("- `{}` ({}) — next: {next}\n", s.name, s.cron));
        }
        (plain.trim_end().to_string(), markdown)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /hass
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct HassCommand;

#[async_trait]
impl CommandHandler for HassCommand {
    async fn handle(&self, _state: &AppState, _session_key: &str, _args: &[String]) -> CommandOutput {
        let msg = "Home Assistant integration is not configured in this deployment".to_string();
        (msg.clone(), msg)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /llm status|reset
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct LlmCommand;

#[async_trait]
impl CommandHandler for LlmCommand {
    async fn handle(&self, state: &AppState, _session_key: &str, args: &[String]) -> CommandOutput {
        match args.first().map(String::as_str) {
            Some("reset") => {
                let msg =
                    "provider cooldowns recover automatically; manual reset is not supported"
                        .to_string();
                (msg.clone(), msg)
            }
            _ => {
                let registry = state.llm.registry();
                let providers = registry.list_providers();
                let errors = registry.init_errors();
                let plain = format!(
                    "{} provider(s) ready: {} | {} init error(s)",
                    providers.len(),
                    providers.join(", "),
                    errors.len(),
                );
                let mut markdown = format!("**LLM providers**\n\n- ready: {}\n", providers.join(", "));
                for e in errors {
                    markdown.push_str(&format!("- error [{}] {}: {}\n", e.provider_id, e.kind, e.error));
                }
                (plain, markdown)
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /embeddings status|rebuild
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct EmbeddingsCommand;

#[async_trait]
impl CommandHandler for EmbeddingsCommand {
    async fn handle(&self, state: &AppState, _session_key: &str, args: &[String]) -> CommandOutput {
        match args.first().map(String::as_str) {
            Some("rebuild") => {
                let msg = "no embeddings index is maintained in this deployment".to_string();
                (msg.clone(), msg)
            }
            _ => {
                let purposes = state.llm.registry().list_purposes();
                let configured = purposes.contains_key("embeddings");
                let msg = if configured {
                    "embeddings purpose is configured".to_string()
                } else {
                    "no provider configured for the embeddings purpose".to_string()
                };
                (msg.clone(), msg)
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /skills
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct SkillsCommand;

#[async_trait]
impl CommandHandler for SkillsCommand {
    async fn handle(&self, _state: &AppState, _session_key: &str, _args: &[String]) -> CommandOutput {
        let msg = "no skill registry is configured in this deployment".to_string();
        (msg.clone(), msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_all_builtins() {
        let registry = CommandRegistry::with_builtins();
        for name in [
            "/status",
            "/compact",
            "/clear",
            "/cleartool",
            "/help",
            "/heartbeat",
            "/hass",
            "/llm",
            "/embeddings",
            "/skills",
        ] {
            assert!(registry.handlers.contains_key(name), "missing handler for {name}");
        }
    }
}
