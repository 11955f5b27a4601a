use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};

use spar_core::events::DebateEvent;
use spar_core::persona::{PersonaRole, FOLLOWUP_MODEL, SUMMARY_MODEL};
use spar_core::request::DebateRequest;
use spar_engine::multiplexer::GenerationMultiplexer;
use spar_engine::planner::{plan, DebatePlan};
use spar_llm::provider::CompletionRequest;
use spar_search::provider::SearchConfig;

use crate::channel::{ChannelError, EventChannel};
use crate::server::AppState;

const SESSION_CHANNEL_CAPACITY: usize = 256;

const SUMMARIZE_INSTRUCTIONS: &str = "You are a concise summarizer. Given a tax analysis response, provide a 1-2 sentence TL;DR that captures the core stance and key takeaway. Be direct and punchy. No fluff.";

const FOLLOWUP_INSTRUCTIONS: &str = r#"You are a Singapore tax expert assistant. The user has highlighted a specific passage from a tax analysis and wants clarification.

Be concise and direct - aim for 2-4 sentences unless the question requires more detail. Focus specifically on what was asked about the highlighted text."#;

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn server_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response()
}

/// POST /api/debate: validate, then stream the whole session as framed
/// events. Validation failures are the only non-streamed outcome.
#[instrument(skip(state, request), fields(topic = %request.topic))]
pub async fn debate(
    State(state): State<AppState>,
    Json(request): Json<DebateRequest>,
) -> Response {
    let plan = match plan(&request) {
        Ok(plan) => plan,
        Err(e) => return bad_request(&e.to_string()),
    };

    let (channel, rx) = EventChannel::new();
    tokio::spawn(drive_session(state, request, plan, channel));

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}

/// The per-session driver: optional search phase, then the multiplexer.
/// Sole writer of the event channel.
async fn drive_session(
    state: AppState,
    request: DebateRequest,
    plan: DebatePlan,
    mut channel: EventChannel,
) {
    let cancel = CancellationToken::new();

    let mut context = String::new();
    if request.enable_web_search {
        if channel.send(&DebateEvent::Searching).await.is_err() {
            return;
        }
        let config = SearchConfig::from_request(&request);
        let outcome = state.search.fetch_context(&request.topic, &config).await;
        if !outcome.is_empty() {
            let sources = DebateEvent::Sources {
                sources: outcome.sources,
            };
            if channel.send(&sources).await.is_err() {
                return;
            }
        }
        context = outcome.context;
    }

    let (events_tx, mut events_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
    let multiplexer = GenerationMultiplexer::new(Arc::clone(&state.provider));
    let topic = request.topic.clone();
    let mux_cancel = cancel.clone();
    let mux = tokio::spawn(async move {
        multiplexer
            .drive(&plan, &topic, &context, &events_tx, &mux_cancel)
            .await
    });

    while let Some(event) = events_rx.recv().await {
        match channel.send(&event).await {
            Ok(()) => {}
            Err(ChannelError::Disconnected) => {
                warn!("client disconnected mid-session, cancelling tasks");
                cancel.cancel();
                break;
            }
            Err(e) => {
                error!(error = %e, "event channel invariant broken");
                cancel.cancel();
                break;
            }
        }
    }

    match mux.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "session ended early"),
        Err(e) => error!(error = %e, "multiplexer task panicked"),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeRequest {
    #[serde(default)]
    content: String,
    #[serde(default)]
    persona_id: Option<PersonaRole>,
}

/// POST /api/summarize: one short non-streamed completion per call.
#[instrument(skip(state, request))]
pub async fn summarize(
    State(state): State<AppState>,
    Json(request): Json<SummarizeRequest>,
) -> Response {
    if request.content.is_empty() {
        return bad_request("Content is required");
    }

    let completion = CompletionRequest {
        model: SUMMARY_MODEL.to_string(),
        instructions: SUMMARIZE_INSTRUCTIONS.to_string(),
        input: request.content,
    };
    match state.provider.complete(&completion).await {
        Ok(summary) => Json(json!({
            "personaId": request.persona_id,
            "summary": summary,
        }))
        .into_response(),
        Err(e) => {
            warn!(kind = e.kind(), "summarize failed");
            server_error("Failed to summarize")
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowupRequest {
    #[serde(default)]
    highlighted_text: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    persona_context: Option<String>,
}

/// POST /api/followup: answer a question about a highlighted passage.
#[instrument(skip(state, request))]
pub async fn followup(
    State(state): State<AppState>,
    Json(request): Json<FollowupRequest>,
) -> Response {
    if request.highlighted_text.is_empty() || request.question.is_empty() {
        return bad_request("Highlighted text and question are required");
    }

    let mut instructions = FOLLOWUP_INSTRUCTIONS.to_string();
    if let Some(persona) = &request.persona_context {
        instructions.push_str(&format!(
            "\n\nContext about the source: This was from \"{persona}\" persona's analysis."
        ));
    }

    let completion = CompletionRequest {
        model: FOLLOWUP_MODEL.to_string(),
        instructions,
        input: format!(
            "HIGHLIGHTED TEXT:\n\"{}\"\n\nUSER'S QUESTION:\n{}",
            request.highlighted_text, request.question
        ),
    };
    match state.provider.complete(&completion).await {
        Ok(answer) => Json(json!({ "answer": answer })).into_response(),
        Err(e) => {
            warn!(kind = e.kind(), "followup failed");
            server_error("Failed to get answer")
        }
    }
}
