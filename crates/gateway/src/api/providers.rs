//! LLM provider registry introspection — what's configured, what's healthy.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET /v1/models — list registered provider IDs and purpose → model map.
pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.llm.registry();
    Json(serde_json::json!({
        "providers": registry.list_providers(),
        "purposes": registry.list_purposes(),
    }))
}

/// GET /v1/models/readiness — health probe for LLM connectivity.
///
/// Reports whether at least one provider initialized successfully and
/// surfaces any per-provider init failures (secrets masked).
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.llm.registry();
    let init_errors: Vec<serde_json::Value> = registry
        .init_errors()
        .iter()
        .map(|e| {
            serde_json::json!({
                "provider_id": e.provider_id,
                "kind": e.kind,
                "error": e.error,
            })
        })
        .collect();

    Json(serde_json::json!({
        "ready": !registry.is_empty(),
        "provider_count": registry.len(),
        "providers": registry.list_providers(),
        "init_errors": init_errors,
    }))
}
