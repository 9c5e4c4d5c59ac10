//! Schedule (cron job) CRUD endpoints.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::runtime::schedules::model::{MissedPolicy, Schedule};
use crate::runtime::schedules::validation::{validate_cron, validate_timezone};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateScheduleBody {
    pub name: String,
    pub cron: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub session_key: String,
    pub prompt: String,
    #[serde(default)]
    pub missed_policy: MissedPolicy,
    #[serde(default)]
    pub timeout_ms: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_enabled() -> bool {
    true
}

/// POST /v1/schedules
pub async fn create_schedule(
    State(state): State<AppState>,
    Json(body): Json<CreateScheduleBody>,
) -> impl IntoResponse {
    if state.schedules.name_exists(&body.name, None).await {
        return (
            axum::http::StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "a schedule with this name already exists" })),
        )
            .into_response();
    }

    if let Err(e) = validate_cron(&body.cron) {
        return (axum::http::StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": e })))
            .into_response();
    }
    if let Err(e) = validate_timezone(&body.timezone) {
        return (axum::http::StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": e })))
            .into_response();
    }

    let now = chrono::Utc::now();
    let schedule = Schedule {
        id: Uuid::new_v4(),
        name: body.name,
        cron: body.cron,
        timezone: body.timezone,
        enabled: body.enabled,
        session_key: body.session_key,
        prompt: body.prompt,
        created_at: now,
        updated_at: now,
        last_run_at: None,
        next_run_at: None,
        missed_policy: body.missed_policy,
        timeout_ms: body.timeout_ms,
        max_catchup_runs: 5,
        last_error: None,
        last_error_at: None,
        consecutive_failures: 0,
        cooldown_until: None,
        total_input_tokens: 0,
        total_output_tokens: 0,
        total_runs: 0,
    };

    let created = state.schedules.insert(schedule).await;
    Json(serde_json::json!(created)).into_response()
}

/// GET /v1/schedules
pub async fn list_schedules(State(state): State<AppState>) -> impl IntoResponse {
    let schedules = state.schedules.list().await;
    Json(serde_json::json!({
        "schedules": schedules,
        "count": schedules.len(),
    }))
}

/// GET /v1/schedules/:id
pub async fn get_schedule(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.schedules.get(&id).await {
        Some(schedule) => Json(serde_json::json!(schedule)).into_response(),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "schedule not found" })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleBody {
    pub name: Option<String>,
    pub cron: Option<String>,
    pub timezone: Option<String>,
    pub enabled: Option<bool>,
    pub session_key: Option<String>,
    pub prompt: Option<String>,
    pub missed_policy: Option<MissedPolicy>,
    pub timeout_ms: Option<u64>,
}

/// PUT /v1/schedules/:id
pub async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateScheduleBody>,
) -> impl IntoResponse {
    let updated = state
        .schedules
        .update(&id, |s| {
            if let Some(name) = body.name {
                s.name = name;
            }
            if let Some(cron) = body.cron {
                s.cron = cron;
            }
            if let Some(timezone) = body.timezone {
                s.timezone = timezone;
            }
            if let Some(enabled) = body.enabled {
                s.enabled = enabled;
            }
            if let Some(session_key) = body.session_key {
                s.session_key = session_key;
            }
            if let Some(prompt) = body.prompt {
                s.prompt = prompt;
            }
            if let Some(missed_policy) = body.missed_policy {
                s.missed_policy = missed_policy;
            }
            if let Some(timeout_ms) = body.timeout_ms {
                s.timeout_ms = timeout_ms;
            }
        })
        .await;

    match updated {
        Some(schedule) => Json(serde_json::json!(schedule)).into_response(),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "schedule not found" })),
        )
            .into_response(),
    }
}

/// DELETE /v1/schedules/:id
pub async fn delete_schedule(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    if state.schedules.delete(&id).await {
        Json(serde_json::json!({ "deleted": true })).into_response()
    } else {
        (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "schedule not found" })),
        )
            .into_response()
    }
}

/// POST /v1/schedules/:id/reset-errors
pub async fn reset_schedule_errors(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if state.schedules.reset_errors(&id).await {
        Json(serde_json::json!({ "reset": true })).into_response()
    } else {
        (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "schedule not found" })),
        )
            .into_response()
    }
}
