/// HTTP Server Module
///
/// Control surface for the bot: install or stop the daily schedule, inspect
/// the action log, and trigger one-off reply or post passes.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::action_log::{ActionKind, ActionLog};
use crate::executor::TaskExecutor;
use crate::scheduler::{ScheduleSlot, Scheduler};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub executor: Arc<TaskExecutor>,
    pub log: Arc<ActionLog>,
    /// Bearer secret for mutating endpoints; open when `None`
    pub control_api_secret: Option<String>,
    /// Slots used when a schedule request does not list its own
    pub default_schedule: Vec<ScheduleSlot>,
    pub max_replies_per_pass: usize,
    pub max_posts_per_pass: usize,
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub keywords: Vec<String>,
    pub topics: Vec<String>,
    #[serde(default)]
    pub slots: Option<Vec<ScheduleSlot>>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub keywords: Vec<String>,
    pub max_replies: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub topics: Vec<String>,
    pub max_posts: Option<usize>,
}

/// Create and configure the HTTP server router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/schedule", post(schedule_endpoint))
        .route("/status", get(status_endpoint))
        .route("/logs", get(logs_endpoint))
        .route("/clear_logs", post(clear_logs_endpoint))
        .route("/stop", post(stop_endpoint))
        .route("/reply", post(reply_endpoint))
        .route("/post", post(post_endpoint))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

fn error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({
            "status": "error",
            "error": message.into()
        })),
    )
}

/// Check the bearer secret, if one is configured
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let Some(secret) = &state.control_api_secret else {
        return Ok(());
    };

    let token = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(token) if token == secret.as_str() => Ok(()),
        _ => Err(error(StatusCode::UNAUTHORIZED, "missing or invalid bearer token")),
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Engagement bot is live!",
        "endpoints": {
            "schedule": "POST /schedule - Schedule reply and post tasks",
            "status": "GET /status - Scheduler state and action log",
            "logs": "GET /logs - Reply and post logs",
            "clear_logs": "POST /clear_logs - Clear all logs",
            "stop": "POST /stop - Stop the bot and clear scheduled tasks",
            "reply": "POST /reply - Run a reply pass now",
            "post": "POST /post - Run a post pass now"
        },
        "status": "Ready to schedule tasks"
    }))
}

/// Health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "x_engagement_bot",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn schedule_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ScheduleRequest>,
) -> ApiResult {
    authorize(&state, &headers)?;

    let slots = request.slots.unwrap_or_else(|| state.default_schedule.clone());

    match state
        .scheduler
        .install(request.keywords, request.topics, &slots)
        .await
    {
        Ok(status) => Ok(Json(json!({
            "status": "success",
            "message": format!(
                "Bot scheduled for {} tasks; stops automatically after {}",
                status.schedule.len(),
                status.quota
            ),
            "schedule": status
        }))),
        Err(e) => {
            log::warn!("Rejected schedule request: {}", e);
            Err(error(StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}

async fn status_endpoint(State(state): State<AppState>) -> ApiResult {
    let status = state.scheduler.status().await;
    serde_json::to_value(status)
        .map(Json)
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Reply and post logs with the task counter
async fn logs_endpoint(State(state): State<AppState>) -> Json<Value> {
    let schedule = state.scheduler.state().await;
    let reply_log = state.log.entries_of(ActionKind::Reply).await;
    let post_log = state.log.entries_of(ActionKind::Post).await;

    Json(json!({
        "reply_log": reply_log,
        "post_log": post_log,
        "task_counter": schedule.completed_task_count,
        "total_tasks": schedule.task_quota,
        "is_completed": schedule.task_quota > 0
            && schedule.completed_task_count >= schedule.task_quota
    }))
}

async fn clear_logs_endpoint(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    authorize(&state, &headers)?;

    match state.scheduler.clear_log().await {
        Ok(()) => Ok(Json(json!({ "message": "Logs cleared successfully" }))),
        Err(e) => {
            log::error!("Error clearing logs: {:#}", e);
            Err(error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error clearing logs: {:#}", e),
            ))
        }
    }
}

async fn stop_endpoint(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    authorize(&state, &headers)?;

    let was_running = state.scheduler.stop().await;
    Ok(Json(json!({
        "message": "Bot stopped successfully",
        "was_running": was_running
    })))
}

async fn reply_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ReplyRequest>,
) -> ApiResult {
    authorize(&state, &headers)?;
    if request.keywords.iter().all(|k| k.trim().is_empty()) {
        return Err(error(StatusCode::BAD_REQUEST, "Keywords are required."));
    }

    log::info!("Reply pass triggered via HTTP endpoint");

    let limit = request.max_replies.unwrap_or(state.max_replies_per_pass);
    let executor = state.executor.clone();
    let reports = run_each(&request.keywords, |keyword| {
        let executor = executor.clone();
        async move { executor.run_reply_task(&keyword, limit).await }
    })
    .await;

    let replied: usize = reports.iter().map(|r| r.entries.len()).sum();
    Ok(Json(json!({
        "message": format!("Completed. {} tweets replied with AI-generated comments.", replied),
        "passes": reports
    })))
}

async fn post_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PostRequest>,
) -> ApiResult {
    authorize(&state, &headers)?;
    if request.topics.iter().all(|t| t.trim().is_empty()) {
        return Err(error(StatusCode::BAD_REQUEST, "Topics are required."));
    }

    log::info!("Post pass triggered via HTTP endpoint");

    let limit = request.max_posts.unwrap_or(state.max_posts_per_pass);
    let executor = state.executor.clone();
    let reports = run_each(&request.topics, |topic| {
        let executor = executor.clone();
        async move { executor.run_post_task(&topic, limit).await }
    })
    .await;

    let posted: usize = reports.iter().map(|r| r.entries.len()).sum();
    Ok(Json(json!({
        "message": format!("Posted {} tweets.", posted),
        "passes": reports
    })))
}

/// Run one pass per non-blank subject, in order
async fn run_each<F, Fut, T>(subjects: &[String], mut run: F) -> Vec<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = T>,
{
    let mut out = Vec::new();
    for subject in subjects.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        out.push(run(subject.to_string()).await);
    }
    out
}

/// Start the HTTP server; returns when `shutdown` resolves
pub async fn start_server(
    state: AppState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .context("Failed to bind HTTP server")?;

    log::info!("HTTP server listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    Ok(())
}
