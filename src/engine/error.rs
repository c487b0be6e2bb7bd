use ulid::Ulid;

use crate::model::{Ms, ReservationStatus, StayAction};

#[derive(Debug)]
pub enum EngineError {
    RoomNotFound(Ulid),
    ReservationNotFound(Ulid),
    AlreadyExists(Ulid),
    DuplicateRoomNumber(String),
    /// Admission rejected: the room already holds this reservation for an overlapping interval.
    Conflict(Ulid),
    InvalidSpan {
        start: Ms,
        end: Ms,
    },
    InvalidTransition {
        id: Ulid,
        status: ReservationStatus,
        action: StayAction,
    },
    PartyTooLarge {
        party_size: u32,
        capacity: u32,
    },
    Invalid(&'static str),
    RoomHasActiveReservations(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::ReservationNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::DuplicateRoomNumber(number) => {
                write!(f, "room number {number} is already in use")
            }
            EngineError::Conflict(_) => write!(f, "room already booked for this interval"),
            EngineError::InvalidSpan { start, end } => {
                write!(f, "check-in must be before check-out (got [{start}, {end}))")
            }
            EngineError::InvalidTransition { id, status, action } => {
                write!(f, "booking {id} is {status}; cannot apply {}", action.as_str())
            }
            EngineError::PartyTooLarge {
                party_size,
                capacity,
            } => write!(f, "party of {party_size} exceeds room capacity {capacity}"),
            EngineError::Invalid(msg) => write!(f, "invalid request: {msg}"),
            EngineError::RoomHasActiveReservations(id) => {
                write!(f, "cannot delete room {id}: it has pending or confirmed bookings")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
