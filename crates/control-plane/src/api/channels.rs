// Realtime channel HTTP routes (SSE)
// Live status updates for dashboards; messages are not stored or replayed

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::{
    stream::{self, Stream},
    StreamExt,
};
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::broadcast::BroadcastHub;

// ============================================
// App State and Routes
// ============================================

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
}

impl AppState {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self { hub }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/channels/:channel/sse", get(stream_sse))
        .with_state(state)
}

// ============================================
// HTTP Handlers
// ============================================

/// GET /v1/channels/{channel}/sse - Stream status updates (SSE)
///
/// The first event is `connected`. Each following event is named after the
/// dotted status event (e.g. `loan.status.changed`) and carries the public
/// payload as JSON. Dropping the connection unsubscribes.
#[utoipa::path(
    get,
    path = "/v1/channels/{channel}/sse",
    params(("channel" = String, Path, description = "Channel name: loans or transactions")),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 404, description = "Unknown channel")
    ),
    tag = "channels"
)]
pub async fn stream_sse(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    if !BroadcastHub::is_known_channel(&channel) {
        return Err(StatusCode::NOT_FOUND);
    }

    let receiver = state.hub.subscribe(&channel);
    tracing::info!(channel = %channel, "Dashboard subscribed");

    let connected = stream::once(async {
        Ok(SseEvent::default()
            .event("connected")
            .data(r#"{"status":"connected"}"#))
    });

    // SSE format: event: <dotted type>, data: <payload JSON>, id: <event UUID>
    let lagging_channel = channel.clone();
    let updates = BroadcastStream::new(receiver).filter_map(move |item| {
        let channel = lagging_channel.clone();
        async move {
            match item {
                Ok(message) => match serde_json::to_string(&message.payload) {
                    Ok(json) => Some(Ok(SseEvent::default()
                        .event(&message.event)
                        .data(json)
                        .id(message.id.to_string()))),
                    Err(e) => {
                        tracing::error!("Failed to serialize broadcast payload: {}", e);
                        None
                    }
                },
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %channel, skipped, "Subscriber lagged, messages dropped");
                    None
                }
            }
        }
    });

    Ok(Sse::new(connected.chain(updates)).keep_alive(KeepAlive::default()))
}
