//! Server-Sent Events for load and send progress
//!
//! One stream per repository. Progress events arrive as integer-as-text
//! data (cumulative insert count for loads, percent for sends); terminal
//! events carry the full JSON payload, then the stream closes.

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::AppState;
use datamap_common::events::DataMapEvent;

/// GET /events/{baselookup} - progress stream for one repository
///
/// Streams events:
/// - LoadProgress (cumulative inserted count, as text)
/// - SendProgress (percent, as text)
/// - LoadCompleted / LoadFailed / SendCompleted / SendFailed (JSON, then close)
pub async fn progress_stream(
    State(state): State<AppState>,
    Path(baselookup): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(repository = %baselookup, "SSE client connected to progress events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                // Heartbeat every 15 seconds
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                Ok(event) = rx.recv() => {
                    if event.repository() != baselookup {
                        continue;
                    }

                    let event_type = event.event_type();
                    match &event {
                        DataMapEvent::LoadProgress { count_inserted, .. } => {
                            yield Ok(Event::default()
                                .event(event_type)
                                .data(count_inserted.to_string()));
                        }
                        DataMapEvent::SendProgress { progress_percent, .. } => {
                            yield Ok(Event::default()
                                .event(event_type)
                                .data(progress_percent.to_string()));
                        }
                        _ => {
                            match serde_json::to_string(&event) {
                                Ok(json) => {
                                    debug!(repository = %baselookup, event = event_type,
                                        "SSE: terminal event");
                                    yield Ok(Event::default().event(event_type).data(json));
                                }
                                Err(e) => {
                                    warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                                }
                            }
                            if event.is_terminal() {
                                info!(repository = %baselookup, "SSE: run finished, closing stream");
                                break;
                            }
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

/// Build SSE routes
pub fn sse_routes() -> Router<AppState> {
    Router::new().route("/events/:baselookup", get(progress_stream))
}
