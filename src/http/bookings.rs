use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use ulid::Ulid;

use super::dto::*;
use super::error::{ApiError, ApiResult};
use super::extract::{Actor, AppJson, AppPath, AppQuery, optional_body};
use super::state::AppState;
use crate::engine::{AuditInfo, ReservationFilter, now_ms};
use crate::model::{Reservation, Span};

/// Render a booking with its room expanded. The room may be soft-deleted.
async fn expanded(state: &AppState, reservation: &Reservation) -> BookingView {
    let room = state.engine.room_record(reservation.room_id).await;
    BookingView::with_room(reservation, room.as_ref())
}

/// POST /bookings
pub async fn create(
    State(state): State<AppState>,
    Actor(actor): Actor,
    AppJson(req): AppJson<CreateBookingRequest>,
) -> ApiResult<impl IntoResponse> {
    let audit = AuditInfo::new(actor);
    let reservation = state.engine.create_reservation(req.into_new()?, &audit).await?;
    Ok((StatusCode::CREATED, Json(expanded(&state, &reservation).await)))
}

/// GET /bookings?roomId&status&from&to&guest
pub async fn list(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ListBookingsQuery>,
) -> ApiResult<Json<Vec<BookingView>>> {
    let window = match (&query.from, &query.to) {
        (Some(from), Some(to)) => {
            let from = parse_timestamp("from", from)?;
            let to = parse_timestamp("to", to)?;
            Some(Span::try_new(from, to).ok_or_else(|| {
                ApiError::BadRequest("from must be before to".into())
            })?)
        }
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "from and to must be given together".into(),
            ));
        }
    };
    let filter = ReservationFilter {
        room_id: query.room_id,
        status: query.status,
        window,
        guest: query.guest.filter(|g| !g.trim().is_empty()),
    };
    let reservations = state.engine.list_reservations(&filter).await?;
    Ok(Json(reservations.iter().map(BookingView::from).collect()))
}

/// GET /bookings/{id}
pub async fn get(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
) -> ApiResult<Json<BookingView>> {
    let reservation = state.engine.get_reservation(id).await?;
    Ok(Json(expanded(&state, &reservation).await))
}

/// PUT /bookings/{id}
pub async fn update(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
    Actor(actor): Actor,
    AppJson(req): AppJson<UpdateBookingRequest>,
) -> ApiResult<Json<BookingView>> {
    let audit = AuditInfo::new(actor);
    let reservation = state
        .engine
        .update_reservation(id, req.into_patch()?, &audit)
        .await?;
    Ok(Json(expanded(&state, &reservation).await))
}

/// POST /bookings/check: the admission check alone, nothing is written.
pub async fn check(
    State(state): State<AppState>,
    AppJson(req): AppJson<CheckRequest>,
) -> ApiResult<Json<CheckResponse>> {
    let (check_in, check_out) = parse_stay(&req.check_in, &req.check_out)?;
    let conflict = state
        .engine
        .check_conflict(req.room_id, check_in, check_out, req.exclude_booking_id)
        .await?;
    Ok(Json(CheckResponse {
        conflict: conflict.as_ref().map(BookingView::from),
    }))
}

fn action_context(actor: String, body: &Bytes) -> ApiResult<(AuditInfo, Option<i64>)> {
    let req: ActionRequest = optional_body(body)?;
    let at = req
        .at
        .as_deref()
        .map(|v| parse_timestamp("at", v))
        .transpose()?;
    Ok((AuditInfo::new(actor).with_note(req.note), at))
}

/// POST /bookings/{id}/confirm
pub async fn confirm(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
    Actor(actor): Actor,
    body: Bytes,
) -> ApiResult<Json<BookingView>> {
    let (audit, _) = action_context(actor, &body)?;
    let reservation = state.engine.confirm(id, &audit).await?;
    Ok(Json(expanded(&state, &reservation).await))
}

/// POST /bookings/{id}/check-in
pub async fn check_in(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
    Actor(actor): Actor,
    body: Bytes,
) -> ApiResult<Json<BookingView>> {
    let (audit, at) = action_context(actor, &body)?;
    let reservation = state
        .engine
        .check_in(id, at.unwrap_or_else(now_ms), &audit)
        .await?;
    Ok(Json(expanded(&state, &reservation).await))
}

/// POST /bookings/{id}/check-out
pub async fn check_out(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
    Actor(actor): Actor,
    body: Bytes,
) -> ApiResult<Json<BookingView>> {
    let (audit, at) = action_context(actor, &body)?;
    let reservation = state
        .engine
        .check_out(id, at.unwrap_or_else(now_ms), &audit)
        .await?;
    Ok(Json(expanded(&state, &reservation).await))
}

/// POST /bookings/{id}/cancel
pub async fn cancel(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
    Actor(actor): Actor,
    body: Bytes,
) -> ApiResult<Json<BookingView>> {
    let (audit, _) = action_context(actor, &body)?;
    let reservation = state.engine.cancel(id, &audit).await?;
    Ok(Json(expanded(&state, &reservation).await))
}

/// POST /bookings/{id}/extend
pub async fn extend(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
    Actor(actor): Actor,
    AppJson(req): AppJson<ExtendRequest>,
) -> ApiResult<Json<BookingView>> {
    let check_out = parse_timestamp("checkOut", &req.check_out)?;
    let audit = AuditInfo::new(actor).with_note(req.note);
    let reservation = state.engine.extend(id, check_out, &audit).await?;
    Ok(Json(expanded(&state, &reservation).await))
}

/// GET /bookings/{id}/logs
pub async fn logs(
    State(state): State<AppState>,
    AppPath(id): AppPath<Ulid>,
) -> ApiResult<Json<Vec<LogEntryView>>> {
    let log = state.engine.reservation_log(id)?;
    Ok(Json(log.iter().map(LogEntryView::from).collect()))
}
