//! SMSPilot webhook server.
//!
//! `POST /sms` turns a carrier webhook into one command and answers with
//! exactly one reply. The rest is operator surface: dashboard, log JSON,
//! health and a manual trigger that bypasses the carrier.

pub mod dashboard;
pub mod error;
pub mod logging;

use axum::extract::rejection::FormRejection;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use smspilot_core::config::ReplyMode;
use smspilot_core::db::LogStats;
use smspilot_core::sms::{twiml_empty, twiml_message, SmsSender};
use smspilot_core::{Command, Pipeline, PipelineOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::InboundError;

const DEFAULT_LOG_LIMIT: i64 = 50;
const MAX_LOG_LIMIT: i64 = 500;

pub struct AppState {
    pub pipeline: Pipeline,
    pub sms: Option<Arc<dyn SmsSender>>,
    pub reply_mode: ReplyMode,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard_page))
        .route("/sms", post(sms_webhook))
        .route("/logs", get(logs))
        .route("/health", get(health))
        .route("/trigger", post(trigger))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn required<'a>(fields: &'a HashMap<String, String>, name: &'static str) -> Result<&'a str, InboundError> {
    fields
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or(InboundError::MissingField(name))
}

async fn sms_webhook(
    State(state): State<Arc<AppState>>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Result<Response, InboundError> {
    let Form(fields) = form.map_err(|e| InboundError::Malformed(e.body_text()))?;
    // an empty Body is a command; a missing one is not
    let body = fields.get("Body").ok_or(InboundError::MissingField("Body"))?;
    let from = required(&fields, "From")?;
    let to = required(&fields, "To")?;

    let command = Command::new(body, from, to);
    tracing::info!(command_id = %command.id, "sms received ({} chars)", command.text.chars().count());

    let outcome = state.pipeline.handle(command).await;
    let document = deliver(&state, &outcome).await;
    Ok(([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], document).into_response())
}

/// Send the reply and return the webhook's TwiML. Falls back to an inline
/// reply when the REST send is impossible, so the sender always gets one.
async fn deliver(state: &AppState, outcome: &PipelineOutcome) -> String {
    if state.reply_mode == ReplyMode::Twiml {
        return twiml_message(&outcome.reply);
    }

    let Some(sms) = &state.sms else {
        tracing::warn!("reply mode is rest but SMS is not configured, replying inline");
        return twiml_message(&outcome.reply);
    };

    match sms.send(&outcome.command.sender, &outcome.reply).await {
        Ok(sid) => {
            tracing::info!(command_id = %outcome.command.id, %sid, "reply sent");
            twiml_empty()
        }
        Err(e) => {
            tracing::warn!(command_id = %outcome.command.id, "reply send failed, replying inline: {:#}", e);
            twiml_message(&outcome.reply)
        }
    }
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<i64>,
}

async fn logs(State(state): State<Arc<AppState>>, Query(query): Query<LogsQuery>) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    let Some(log) = state.pipeline.log() else {
        return Json(json!({ "logs": [], "stats": LogStats::default() })).into_response();
    };

    match (log.recent(limit).await, log.stats().await) {
        (Ok(entries), Ok(stats)) => Json(json!({ "logs": entries, "stats": stats })).into_response(),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("failed to read execution log: {:#}", e);
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "execution log unavailable" })),
            )
                .into_response()
        }
    }
}

async fn dashboard_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let (stats, entries) = match state.pipeline.log() {
        Some(log) => (
            log.stats().await.unwrap_or_default(),
            log.recent(DEFAULT_LOG_LIMIT).await.unwrap_or_default(),
        ),
        None => (LogStats::default(), Vec::new()),
    };
    Html(dashboard::render(&stats, &entries))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "tiers": state.pipeline.tier_order(),
        "reply_mode": state.reply_mode,
        "execution_log": state.pipeline.log().is_some(),
        "sms": state.sms.is_some(),
    }))
}

#[derive(Debug, Deserialize)]
struct TriggerRequest {
    message: String,
    #[serde(default)]
    from: Option<String>,
}

async fn trigger(State(state): State<Arc<AppState>>, Json(request): Json<TriggerRequest>) -> Json<Value> {
    let from = request.from.as_deref().unwrap_or("manual");
    let outcome = state
        .pipeline
        .handle(Command::new(&request.message, from, "trigger"))
        .await;

    Json(json!({
        "intent": outcome.intent,
        "summary": outcome.dispatch.summary,
        "reply": outcome.reply,
        "attempts": outcome.dispatch.attempts,
    }))
}
