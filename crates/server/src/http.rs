//! HTTP Endpoints
//!
//! The call-initiation boundary, the media WebSocket upgrade and a
//! health check. The call-initiation handler carries no conversational
//! logic: it only answers with the directive telling the telephony
//! gateway which streaming endpoint to connect to.

use axum::{
    extract::{ws::WebSocketUpgrade, Form, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bridge;
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let ws_path = state.settings.server.ws_path.clone();
    Router::new()
        .route("/call", post(incoming_call))
        .route(&ws_path, get(media_stream))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Inbound-call notification from the telephony provider.
#[derive(Debug, Deserialize)]
struct CallNotification {
    #[serde(rename = "From")]
    from: Option<String>,
    #[serde(rename = "CallSid")]
    call_sid: Option<String>,
}

/// Answer an inbound-call notification with the stream-connect
/// directive.
async fn incoming_call(
    State(state): State<AppState>,
    Form(notification): Form<CallNotification>,
) -> impl IntoResponse {
    let server = &state.settings.server;
    let ws_url = format!("wss://{}{}", server.public_host, server.ws_path);

    tracing::info!(
        call = notification.call_sid.as_deref().unwrap_or("unknown"),
        "inbound call, directing gateway to {ws_url}"
    );

    let caller_param = notification
        .from
        .as_deref()
        .map(|from| {
            format!(
                "\n      <Parameter name=\"caller\" value=\"{}\" />",
                xml_escape(from)
            )
        })
        .unwrap_or_default();

    let body = format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<Response>\n",
            "  <Connect>\n",
            "    <Stream url=\"{}\">{}\n",
            "    </Stream>\n",
            "  </Connect>\n",
            "</Response>\n"
        ),
        xml_escape(&ws_url),
        caller_param
    );

    ([(header::CONTENT_TYPE, "application/xml")], body)
}

/// WebSocket upgrade for the telephony audio stream.
async fn media_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| bridge::handle_stream(socket, state))
}

/// Health check
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "active_calls": state.active_calls(),
    }))
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
