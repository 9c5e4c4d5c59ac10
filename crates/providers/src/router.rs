//! Capability-driven LLM router.
//!
//! The router selects providers and models based on purpose requirements
//! (tools, JSON mode, streaming) and handles automatic fallback when the
//! primary model fails with a timeout or 5xx error. Providers that fail
//! repeatedly are parked in a cooldown table and skipped until it expires.

use crate::registry::ProviderRegistry;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use gw_domain::capability::{LlmCapabilities, Purpose, ToolSupport};
use gw_domain::config::{LlmConfig, PurposeConfig};
use gw_domain::cooldown::CooldownState;
use gw_domain::error::{Error, Result};
use gw_domain::stream::{BoxStream, StreamEvent};
use gw_domain::trace::TraceEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cooldown table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tracks per-provider consecutive failures. A provider in cooldown is
/// skipped by the router until its cooldown window expires, the same
/// doubling-with-cap algebra the schedule runner and supervisor use.
#[derive(Default)]
pub struct CooldownTable {
    states: RwLock<HashMap<String, CooldownState>>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cooling(&self, provider_id: &str) -> bool {
        self.states
            .read()
            .get(provider_id)
            .map(|s| s.is_cooling(chrono::Utc::now()))
            .unwrap_or(false)
    }

    fn record_failure(&self, provider_id: &str) -> (chrono::Duration, u32) {
        let mut states = self.states.write();
        let state = states.entry(provider_id.to_string()).or_default();
        let duration = state.record_failure(chrono::Utc::now());
        (duration, state.consecutive_failures)
    }

    fn record_success(&self, provider_id: &str) {
        let mut states = self.states.write();
        if let Some(state) = states.get_mut(provider_id) {
            state.record_success();
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A capability-driven router that selects providers per purpose and
/// handles fallback on transient failures.
pub struct LlmRouter {
    registry: ProviderRegistry,
    purpose_configs: HashMap<String, PurposeConfig>,
    cooldowns: CooldownTable,
    default_timeout_ms: u64,
}

impl LlmRouter {
    /// Construct the router from the full LLM config.
    pub fn from_config(llm_config: &LlmConfig) -> Result<Self> {
        let registry = ProviderRegistry::from_config(llm_config)?;
        let purpose_configs: HashMap<String, PurposeConfig> = llm_config.purposes.clone();

        Ok(Self {
            registry,
            purpose_configs,
            cooldowns: CooldownTable::new(),
            default_timeout_ms: llm_config.default_timeout_ms,
        })
    }

    /// Build from an already-constructed registry (useful for testing).
    pub fn new(
        registry: ProviderRegistry,
        purpose_configs: HashMap<String, PurposeConfig>,
        default_timeout_ms: u64,
    ) -> Self {
        Self {
            registry,
            purpose_configs,
            cooldowns: CooldownTable::new(),
            default_timeout_ms,
        }
    }

    /// Get a reference to the underlying registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    // ── Public routing API ─────────────────────────────────────────

    /// Send a chat request for a given purpose. The router:
    ///
    /// 1. Resolves the primary model from the purpose config.
    /// 2. Validates that the provider satisfies the required capabilities
    ///    and isn't currently in cooldown.
    /// 3. Sends the request.
    /// 4. On timeout or provider error, records a cooldown failure and
    ///    falls back to the next configured fallback model.
    /// 5. Emits `TraceEvent::LlmRequest`, `TraceEvent::LlmFallback`, and
    ///    `TraceEvent::ProviderCooldownEntered`.
    pub async fn chat_for_purpose(
        &self,
        purpose: Purpose,
        mut req: ChatRequest,
    ) -> Result<ChatResponse> {
        let purpose_str = purpose.as_str().to_string();
        let purpose_cfg = self
            .purpose_configs
            .get(&purpose_str)
            .ok_or_else(|| Error::Config(format!("no purpose config for '{}'", purpose_str)))?;

        // Attempt primary model.
        let (provider_id, model_name) = resolve_model(&purpose_cfg.model);
        if self.cooldowns.is_cooling(provider_id) {
            tracing::warn!(provider = %provider_id, "primary provider is cooling down, trying fallbacks");
        } else if let Some(provider) = self.registry.get(provider_id) {
            if Self::check_capabilities(provider.capabilities(), purpose_cfg) {
                req.model = Some(model_name.to_string());

                let start = Instant::now();
                let result = self.try_chat(&provider, &req).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match &result {
                    Ok(resp) => {
                        self.cooldowns.record_success(provider_id);
                        TraceEvent::LlmRequest {
                            provider: provider_id.to_string(),
                            model: model_name.to_string(),
                            purpose: purpose_str.clone(),
                            streaming: false,
                            duration_ms,
                            prompt_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens),
                            completion_tokens: resp.usage.as_ref().map(|u| u.completion_tokens),
                        }
                        .emit();
                        return result;
                    }
                    Err(e) if Self::is_retriable(e) => {
                        self.enter_cooldown(provider_id, &e.to_string());
                        tracing::warn!(
                            provider = %provider_id,
                            model = %model_name,
                            error = %e,
                            "primary model failed, trying fallbacks"
                        );
                    }
                    Err(_) => {
                        // Non-retriable error: emit trace and return immediately.
                        TraceEvent::LlmRequest {
                            provider: provider_id.to_string(),
                            model: model_name.to_string(),
                            purpose: purpose_str.clone(),
                            streaming: false,
                            duration_ms,
                            prompt_tokens: None,
                            completion_tokens: None,
                        }
                        .emit();
                        return result;
                    }
                }
            } else {
                tracing::warn!(
                    provider = %provider_id,
                    model = %model_name,
                    "primary model does not satisfy required capabilities, trying fallbacks"
                );
            }
        } else {
            tracing::warn!(
                provider = %provider_id,
                "primary provider not found in registry, trying fallbacks"
            );
        }

        // Attempt fallbacks.
        for (idx, fallback) in purpose_cfg.fallbacks.iter().enumerate() {
            let (fb_provider_id, fb_model_name) = resolve_model(&fallback.model);
            if self.cooldowns.is_cooling(fb_provider_id) {
                tracing::warn!(provider = %fb_provider_id, "fallback provider is cooling down, skipping");
                continue;
            }
            let fb_provider = match self.registry.get(fb_provider_id) {
                Some(p) => p,
                None => {
                    tracing::warn!(
                        provider = %fb_provider_id,
                        "fallback provider not found, skipping"
                    );
                    continue;
                }
            };

            // Check fallback capabilities.
            let cap = fb_provider.capabilities();
            if fallback.require_tools && cap.supports_tools == ToolSupport::None {
                tracing::warn!(
                    provider = %fb_provider_id,
                    "fallback does not support tools, skipping"
                );
                continue;
            }
            if fallback.require_json && !cap.supports_json_mode {
                tracing::warn!(
                    provider = %fb_provider_id,
                    "fallback does not support JSON mode, skipping"
                );
                continue;
            }

            TraceEvent::LlmFallback {
                from_provider: provider_id.to_string(),
                from_model: model_name.to_string(),
                to_provider: fb_provider_id.to_string(),
                to_model: fb_model_name.to_string(),
                reason: "primary model failed or unavailable".to_string(),
            }
            .emit();

            req.model = Some(fb_model_name.to_string());
            let start = Instant::now();
            let result = self.try_chat(&fb_provider, &req).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(resp) => {
                    self.cooldowns.record_success(fb_provider_id);
                    TraceEvent::LlmRequest {
                        provider: fb_provider_id.to_string(),
                        model: fb_model_name.to_string(),
                        purpose: purpose_str.clone(),
                        streaming: false,
                        duration_ms,
                        prompt_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens),
                        completion_tokens: resp.usage.as_ref().map(|u| u.completion_tokens),
                    }
                    .emit();
                    return result;
                }
                Err(e) if Self::is_retriable(e) => {
                    self.enter_cooldown(fb_provider_id, &e.to_string());
                    tracing::warn!(
                        provider = %fb_provider_id,
                        model = %fb_model_name,
                        error = %e,
                        fallback_index = %idx,
                        "fallback model failed, trying next"
                    );
                    continue;
                }
                Err(_) => {
                    TraceEvent::LlmRequest {
                        provider: fb_provider_id.to_string(),
                        model: fb_model_name.to_string(),
                        purpose: purpose_str.clone(),
                        streaming: false,
                        duration_ms,
                        prompt_tokens: None,
                        completion_tokens: None,
                    }
                    .emit();
                    return result;
                }
            }
        }

        Err(Error::Provider {
            provider: "router".into(),
            message: format!(
                "all models for purpose '{}' failed or were unavailable",
                purpose_str
            ),
        })
    }

    /// Stream a chat request for a given purpose.
    ///
    /// Unlike [`Self::chat_for_purpose`], there is no mid-stream fallback —
    /// once the first chunk is flowing we're committed to that provider.
    /// Fallback only applies to the initial request: if the primary model
    /// is cooling down, lacks capabilities, or fails to open a stream, the
    /// next configured fallback is tried before giving up.
    pub async fn chat_stream_for_purpose(
        &self,
        purpose: Purpose,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let purpose_str = purpose.as_str().to_string();
        let purpose_cfg = self
            .purpose_configs
            .get(&purpose_str)
            .ok_or_else(|| Error::Config(format!("no purpose config for '{}'", purpose_str)))?;

        let mut candidates: Vec<(&str, &str, bool, bool)> = Vec::new();
        let (provider_id, model_name) = resolve_model(&purpose_cfg.model);
        candidates.push((
            provider_id,
            model_name,
            purpose_cfg.require_tools,
            purpose_cfg.require_json,
        ));
        for fb in &purpose_cfg.fallbacks {
            let (p, m) = resolve_model(&fb.model);
            candidates.push((p, m, fb.require_tools, fb.require_json));
        }

        let mut last_err = None;
        for (pid, model, require_tools, require_json) in candidates {
            if self.cooldowns.is_cooling(pid) {
                tracing::warn!(provider = %pid, "provider is cooling down, skipping");
                continue;
            }
            let provider = match self.registry.get(pid) {
                Some(p) => p,
                None => {
                    tracing::warn!(provider = %pid, "provider not found in registry, skipping");
                    continue;
                }
            };
            let cap = provider.capabilities();
            if require_tools && cap.supports_tools == ToolSupport::None {
                continue;
            }
            if require_json && !cap.supports_json_mode {
                continue;
            }
            if !cap.supports_streaming {
                continue;
            }

            if pid != provider_id {
                TraceEvent::LlmFallback {
                    from_provider: provider_id.to_string(),
                    from_model: model_name.to_string(),
                    to_provider: pid.to_string(),
                    to_model: model.to_string(),
                    reason: "primary stream provider unavailable".to_string(),
                }
                .emit();
            }

            let mut stream_req = req.clone();
            stream_req.model = Some(model.to_string());
            match provider.chat_stream(stream_req).await {
                Ok(stream) => {
                    self.cooldowns.record_success(pid);
                    TraceEvent::LlmRequest {
                        provider: pid.to_string(),
                        model: model.to_string(),
                        purpose: purpose_str.clone(),
                        streaming: true,
                        duration_ms: 0,
                        prompt_tokens: None,
                        completion_tokens: None,
                    }
                    .emit();
                    return Ok(stream);
                }
                Err(e) => {
                    if Self::is_retriable(&e) {
                        self.enter_cooldown(pid, &e.to_string());
                    }
                    tracing::warn!(provider = %pid, model = %model, error = %e, "stream open failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Provider {
            provider: "router".into(),
            message: format!(
                "all models for purpose '{}' failed or were unavailable",
                purpose_str
            ),
        }))
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn enter_cooldown(&self, provider_id: &str, reason: &str) {
        let (duration, failures) = self.cooldowns.record_failure(provider_id);
        TraceEvent::ProviderCooldownEntered {
            provider: provider_id.to_string(),
            reason: reason.to_string(),
            duration_secs: duration.num_seconds(),
            consecutive_failures: failures,
        }
        .emit();
    }

    /// Send a chat request with a timeout wrapper.
    async fn try_chat(
        &self,
        provider: &Arc<dyn LlmProvider>,
        req: &ChatRequest,
    ) -> Result<ChatResponse> {
        let timeout = std::time::Duration::from_millis(self.default_timeout_ms);
        match tokio::time::timeout(timeout, provider.chat(req.clone())).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "provider '{}' timed out after {}ms",
                provider.provider_id(),
                self.default_timeout_ms
            ))),
        }
    }

    /// Check whether a provider's capabilities satisfy a purpose config's requirements.
    fn check_capabilities(cap: &LlmCapabilities, purpose_cfg: &PurposeConfig) -> bool {
        if purpose_cfg.require_tools && cap.supports_tools == ToolSupport::None {
            return false;
        }
        if purpose_cfg.require_json && !cap.supports_json_mode {
            return false;
        }
        if purpose_cfg.require_streaming && !cap.supports_streaming {
            return false;
        }
        true
    }

    /// Determine if an error is retriable (timeout, transport error, or a
    /// 5xx-like provider response).
    fn is_retriable(err: &Error) -> bool {
        match err {
            Error::Timeout(_) => true,
            Error::Http(_) => true,
            Error::Provider { message, .. } => {
                // Treat 5xx as retriable.
                message.contains("HTTP 5")
                    || message.contains("HTTP 502")
                    || message.contains("HTTP 503")
                    || message.contains("HTTP 504")
                    || message.contains("HTTP 500")
                    || message.contains("HTTP 529")
            }
            _ => false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Split a `"provider_id/model_name"` string into its two components.
///
/// If there is no `/`, the entire string is treated as the provider id
/// and an empty model name is returned (the provider's default will be used).
pub fn resolve_model(model_str: &str) -> (&str, &str) {
    match model_str.split_once('/') {
        Some((provider, model)) => (provider, model),
        None => (model_str, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_model_splits_on_slash() {
        assert_eq!(resolve_model("anthropic/claude-sonnet-4-5"), ("anthropic", "claude-sonnet-4-5"));
    }

    #[test]
    fn resolve_model_without_slash_has_empty_model() {
        assert_eq!(resolve_model("anthropic"), ("anthropic", ""));
    }

    #[test]
    fn cooldown_table_tracks_failures_and_recovers() {
        let table = CooldownTable::new();
        assert!(!table.is_cooling("p1"));
        table.record_failure("p1");
        assert!(table.is_cooling("p1"));
        table.record_success("p1");
        assert!(!table.is_cooling("p1"));
    }
}
