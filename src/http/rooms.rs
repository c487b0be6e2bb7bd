use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use ulid::Ulid;

use super::dto::*;
use super::error::ApiResult;
use super::extract::{AppJson, AppPath, AppQuery};
use super::state::AppState;

/// POST /rooms
pub async fn create(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateRoomRequest>,
) -> ApiResult<impl IntoResponse> {
    let room = state.engine.create_room(req.into()).await?;
    Ok((StatusCode::CREATED, Json(RoomView::from(&room))))
}

/// GET /rooms
pub async fn list(State(state): State<AppState>) -> Json<Vec<RoomView>> {
    let rooms = state.engine.list_rooms().await;
    Json(rooms.iter().map(RoomView::from).collect())
}

/// GET /rooms/{id}
pub async fn get(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
) -> ApiResult<Json<RoomView>> {
    let room = state.engine.get_room(id).await?;
    Ok(Json(RoomView::from(&room)))
}

/// PUT /rooms/{id}
pub async fn update(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
    AppJson(req): AppJson<UpdateRoomRequest>,
) -> ApiResult<Json<RoomView>> {
    let room = state.engine.update_room(id, req.into()).await?;
    Ok(Json(RoomView::from(&room)))
}

/// DELETE /rooms/{id}, a soft delete.
pub async fn delete(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
) -> ApiResult<StatusCode> {
    state.engine.delete_room(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /rooms/available?checkIn&checkOut&partySize
pub async fn available(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<AvailableRoomsQuery>,
) -> ApiResult<Json<Vec<RoomView>>> {
    let (check_in, check_out) = parse_stay(&query.check_in, &query.check_out)?;
    let rooms = state
        .engine
        .available_rooms(check_in, check_out, query.party_size.unwrap_or(1))
        .await?;
    Ok(Json(rooms.iter().map(RoomView::from).collect()))
}

/// GET /rooms/{id}/availability?from&to
pub async fn availability(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
    AppQuery(query): AppQuery<WindowQuery>,
) -> ApiResult<Json<Vec<SpanView>>> {
    let free = state.engine.room_availability(id, query.span()?).await?;
    Ok(Json(free.iter().map(SpanView::from).collect()))
}
