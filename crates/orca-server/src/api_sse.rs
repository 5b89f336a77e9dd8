//! SSE stream of room state changes.

use crate::AppState;
use axum::{
    extract::{Extension, Query},
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
};
use futures_util::Stream;
use serde::Deserialize;
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStreamQuery {
    /// Only forward events for this room.
    pub room_id: Option<String>,
}

/// Handler for `GET /events/rooms`.
///
/// Streams [`orca_types::RoomEvent`]s after they are committed. Each SSE event
/// is named after the event's `type` tag.
pub async fn get_room_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<RoomStreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.room_events_tx.subscribe();
    let room_filter = query.room_id.filter(|id| !id.is_empty());

    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) => {
            if room_filter
                .as_deref()
                .is_some_and(|room_id| room_id != event.room_id())
            {
                return None;
            }
            match serde_json::to_value(&event) {
                Ok(data) => {
                    let name = data["type"].as_str().unwrap_or("room_event").to_string();
                    Some(Ok(Event::default().event(name).data(data.to_string())))
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize room event");
                    None
                }
            }
        }
        Err(lagged) => {
            tracing::warn!(
                error = %lagged,
                "room SSE stream lagged; events were dropped for this subscriber"
            );
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
