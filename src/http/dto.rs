//! JSON shapes of the HTTP API. Field names are camelCase and instants are
//! ISO-8601; the engine works in Unix milliseconds throughout.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::error::ApiError;
use crate::engine::{NewReservation, NewRoom, OverlapReport, ReservationPatch, RoomPatch};
use crate::model::*;

/// Accepts RFC 3339 (`2030-01-01T15:00:00Z`) or a bare date meaning midnight UTC.
pub fn parse_timestamp(field: &str, value: &str) -> Result<Ms, ApiError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(midnight.and_utc().timestamp_millis());
    }
    Err(ApiError::BadRequest(format!(
        "{field} must be an ISO-8601 date or timestamp"
    )))
}

/// `checkIn` and `checkOut` parsed and ordered.
pub fn parse_stay(check_in: &str, check_out: &str) -> Result<(Ms, Ms), ApiError> {
    let start = parse_timestamp("checkIn", check_in)?;
    let end = parse_timestamp("checkOut", check_out)?;
    if start >= end {
        return Err(ApiError::BadRequest("checkIn must be before checkOut".into()));
    }
    Ok((start, end))
}

pub fn to_datetime(ms: Ms) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// ── Requests ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub number: String,
    pub room_type: Option<String>,
    pub capacity: u32,
    pub rate_per_night: i64,
    pub location: Option<String>,
}

impl From<CreateRoomRequest> for NewRoom {
    fn from(req: CreateRoomRequest) -> Self {
        NewRoom {
            number: req.number,
            room_type: req.room_type,
            capacity: req.capacity,
            rate_per_night: req.rate_per_night,
            location: req.location,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoomRequest {
    pub number: Option<String>,
    pub room_type: Option<String>,
    pub capacity: Option<u32>,
    pub rate_per_night: Option<i64>,
    pub location: Option<String>,
}

impl From<UpdateRoomRequest> for RoomPatch {
    fn from(req: UpdateRoomRequest) -> Self {
        RoomPatch {
            number: req.number,
            room_type: req.room_type,
            capacity: req.capacity,
            rate_per_night: req.rate_per_night,
            location: req.location,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuestDto {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<GuestDto> for Guest {
    fn from(g: GuestDto) -> Self {
        Guest {
            name: g.name,
            email: g.email,
            phone: g.phone,
        }
    }
}

impl From<&Guest> for GuestDto {
    fn from(g: &Guest) -> Self {
        GuestDto {
            name: g.name.clone(),
            email: g.email.clone(),
            phone: g.phone.clone(),
        }
    }
}

fn default_party_size() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub room_id: Ulid,
    pub check_in: String,
    pub check_out: String,
    pub guest: GuestDto,
    #[serde(default = "default_party_size")]
    pub party_size: u32,
    pub status: Option<ReservationStatus>,
    pub note: Option<String>,
}

impl CreateBookingRequest {
    pub fn into_new(self) -> Result<NewReservation, ApiError> {
        let (check_in, check_out) = parse_stay(&self.check_in, &self.check_out)?;
        Ok(NewReservation {
            room_id: self.room_id,
            guest: self.guest.into(),
            party_size: self.party_size,
            check_in,
            check_out,
            status: self.status,
            note: self.note,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingRequest {
    pub room_id: Option<Ulid>,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub guest: Option<GuestDto>,
    pub party_size: Option<u32>,
    pub note: Option<String>,
}

impl UpdateBookingRequest {
    pub fn into_patch(self) -> Result<ReservationPatch, ApiError> {
        let check_in = self
            .check_in
            .as_deref()
            .map(|v| parse_timestamp("checkIn", v))
            .transpose()?;
        let check_out = self
            .check_out
            .as_deref()
            .map(|v| parse_timestamp("checkOut", v))
            .transpose()?;
        if let (Some(start), Some(end)) = (check_in, check_out)
            && start >= end
        {
            return Err(ApiError::BadRequest("checkIn must be before checkOut".into()));
        }
        Ok(ReservationPatch {
            room_id: self.room_id,
            check_in,
            check_out,
            guest: self.guest.map(Guest::from),
            party_size: self.party_size,
            note: self.note,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub room_id: Ulid,
    pub check_in: String,
    pub check_out: String,
    /// The booking being edited, ignored by the check.
    pub exclude_booking_id: Option<Ulid>,
}

/// Optional body of the status action endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub note: Option<String>,
    /// Instant of check-in or check-out; defaults to now.
    pub at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendRequest {
    pub check_out: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBookingsQuery {
    pub room_id: Option<Ulid>,
    pub status: Option<ReservationStatus>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub guest: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableRoomsQuery {
    pub check_in: String,
    pub check_out: String,
    pub party_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub from: String,
    pub to: String,
}

impl WindowQuery {
    pub fn span(&self) -> Result<Span, ApiError> {
        let from = parse_timestamp("from", &self.from)?;
        let to = parse_timestamp("to", &self.to)?;
        Span::try_new(from, to).ok_or_else(|| ApiError::BadRequest("from must be before to".into()))
    }
}

// ── Responses ────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: Ulid,
    pub number: String,
    pub room_type: Option<String>,
    pub capacity: u32,
    pub rate_per_night: i64,
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<&Room> for RoomView {
    fn from(room: &Room) -> Self {
        RoomView {
            id: room.id,
            number: room.number.clone(),
            room_type: room.room_type.clone(),
            capacity: room.capacity,
            rate_per_night: room.rate_per_night,
            location: room.location.clone(),
            deleted_at: room.deleted_at.map(to_datetime),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: Ulid,
    pub room_id: Ulid,
    /// The booked room, present on single-booking responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomView>,
    pub guest: GuestDto,
    pub party_size: u32,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub nights: i64,
    pub status: ReservationStatus,
    pub total_price: i64,
    pub note: Option<String>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingView {
    pub fn with_room(reservation: &Reservation, room: Option<&Room>) -> Self {
        BookingView {
            id: reservation.id,
            room_id: reservation.room_id,
            room: room.map(RoomView::from),
            guest: GuestDto::from(&reservation.guest),
            party_size: reservation.party_size,
            check_in: to_datetime(reservation.span.start),
            check_out: to_datetime(reservation.span.end),
            nights: reservation.span.nights(),
            status: reservation.status,
            total_price: reservation.total_price,
            note: reservation.note.clone(),
            checked_in_at: reservation.checked_in_at.map(to_datetime),
            checked_out_at: reservation.checked_out_at.map(to_datetime),
            created_at: to_datetime(reservation.created_at),
            updated_at: to_datetime(reservation.updated_at),
        }
    }
}

impl From<&Reservation> for BookingView {
    fn from(reservation: &Reservation) -> Self {
        BookingView::with_room(reservation, None)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryView {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub action: StayAction,
    pub from: Option<ReservationStatus>,
    pub to: ReservationStatus,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

impl From<&LogEntry> for LogEntryView {
    fn from(e: &LogEntry) -> Self {
        LogEntryView {
            id: e.id,
            booking_id: e.reservation_id,
            action: e.action,
            from: e.from,
            to: e.to,
            actor: e.actor.clone(),
            at: to_datetime(e.at),
            note: e.note.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SpanView {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl From<&Span> for SpanView {
    fn from(span: &Span) -> Self {
        SpanView {
            from: to_datetime(span.start),
            to: to_datetime(span.end),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub conflict: Option<BookingView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapView {
    pub room_id: Ulid,
    pub first_booking_id: Ulid,
    pub second_booking_id: Ulid,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl From<&OverlapReport> for OverlapView {
    fn from(r: &OverlapReport) -> Self {
        OverlapView {
            room_id: r.room_id,
            first_booking_id: r.first,
            second_booking_id: r.second,
            from: to_datetime(r.overlap.start),
            to: to_datetime(r.overlap.end),
        }
    }
}

/// A committed change as pushed to room subscribers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<Ulid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_room_id: Option<Ulid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<LogEntryView>,
}

impl From<&Event> for EventView {
    fn from(event: &Event) -> Self {
        let mut view = EventView {
            kind: event.kind(),
            room: None,
            room_id: None,
            previous_room_id: None,
            booking: None,
            entry: None,
        };
        match event {
            Event::RoomCreated { room } | Event::RoomUpdated { room } => {
                view.room_id = Some(room.id);
                view.room = Some(room.into());
            }
            Event::RoomDeleted { id, .. } => view.room_id = Some(*id),
            Event::ReservationCreated { reservation, entry } => {
                view.room_id = Some(reservation.room_id);
                view.booking = Some(reservation.into());
                view.entry = Some(entry.into());
            }
            Event::ReservationChanged {
                previous_room_id,
                reservation,
                entry,
            } => {
                view.room_id = Some(reservation.room_id);
                if *previous_room_id != reservation.room_id {
                    view.previous_room_id = Some(*previous_room_id);
                }
                view.booking = Some(reservation.into());
                view.entry = Some(entry.into());
            }
            Event::ReservationRestored { reservation, .. } => {
                view.room_id = Some(reservation.room_id);
                view.booking = Some(reservation.into());
            }
        }
        view
    }
}
