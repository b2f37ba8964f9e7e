//! HTTP surface: health, chat and snapshot inspection, sharing the port with `/ws`.

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent_engine::history::SessionHistory;
use crate::agent_engine::{AgentLoop, StepRecord, ToolExecutor};
use crate::llm::types::ChatMessage;
use crate::server::{ws, AppState};

const NO_PROVIDER: &str = "⚠️ No language model is configured on the server. Add a provider under \
[llm.providers] in config.toml and set its NAVPLANE_<PROVIDER>_API_KEY.";
const NO_PEER: &str = "⚠️ No application connected. Make sure:\n\
1. Your app is running with a NavPlane peer session\n\
2. The peer points at this server's /ws endpoint\n\n\
Restart your app and try again.";
const MODEL_ERROR: &str = "❌ Sorry, I encountered an error. Please try again.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    fn notice(message: &str) -> Self {
        Self {
            message: message.to_string(),
            steps: Vec::new(),
            error: None,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::handler))
        .route("/api/chat", post(chat))
        .route("/api/ui-state", get(ui_state))
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "websocket": state.hub.status(),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

async fn ui_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.tools.get_ui_state())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "Not found" })))
}

async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    if request.messages.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "No messages provided" })),
        )
            .into_response();
    }

    let (provider, call) = match state.providers.call_config_for_role("tools") {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::warn!(error = %e, "chat requested without a usable provider");
            return Json(ChatResponse::notice(NO_PROVIDER)).into_response();
        }
    };

    if !state.hub.status().connected {
        return Json(ChatResponse::notice(NO_PEER)).into_response();
    }

    tracing::info!(
        session = request.session_id.as_deref().unwrap_or("anonymous"),
        messages = request.messages.len(),
        "chat request"
    );

    let transcript: Vec<ChatMessage> = request
        .messages
        .into_iter()
        .filter_map(|m| match m.role.as_str() {
            "user" => Some(ChatMessage::user(m.content)),
            "assistant" => Some(ChatMessage::assistant(m.content)),
            other => {
                tracing::debug!(role = other, "dropping chat message with unsupported role");
                None
            }
        })
        .collect();

    let executor: std::sync::Arc<dyn ToolExecutor> = state.tools.clone();
    let mut agent = AgentLoop::new(provider, call, executor)
        .with_tools(state.tool_defs.as_ref().clone())
        .with_max_iterations(state.agent.max_iterations);
    if state.agent.record_history {
        let history = match request.session_id {
            Some(id) => SessionHistory::with_id(id),
            None => SessionHistory::new(),
        };
        agent = agent.with_history(history);
    }

    match agent.run_turn(transcript).await {
        Ok(report) => Json(ChatResponse {
            message: report.message,
            steps: report.steps,
            error: None,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "chat turn failed");
            Json(ChatResponse {
                message: MODEL_ERROR.to_string(),
                steps: Vec::new(),
                error: Some(e.to_string()),
            })
            .into_response()
        }
    }
}
