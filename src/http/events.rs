use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use ulid::Ulid;

use super::dto::EventView;
use super::error::ApiResult;
use super::extract::AppPath;
use super::state::AppState;

/// GET /rooms/{id}/events: committed changes to one room as server-sent events.
pub async fn room_events(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    state.engine.get_room(id).await?;
    let rx = state.engine.notify.subscribe(id);

    let stream = futures::stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let view = EventView::from(&event);
                    match SseEvent::default().event(view.kind).json_data(&view) {
                        Ok(sse) => return Some((Ok(sse), rx)),
                        Err(e) => tracing::warn!(room = %id, "dropping unserializable event: {e}"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(room = %id, "subscriber lagged, skipped {skipped} events");
                }
                // Room deleted or server shutting down
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
