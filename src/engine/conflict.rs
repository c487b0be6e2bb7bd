use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_STAY_MS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// Build a stay from caller-supplied bounds, rejecting inverted or out-of-range intervals.
pub(crate) fn stay_span(check_in: Ms, check_out: Ms) -> Result<Span, EngineError> {
    let span = Span::try_new(check_in, check_out).ok_or(EngineError::InvalidSpan {
        start: check_in,
        end: check_out,
    })?;
    validate_span(&span)?;
    Ok(span)
}

/// The admission check: the earliest non-cancelled reservation on this room
/// whose stay overlaps `span`, ignoring `exclude` (the reservation being changed).
pub fn find_conflict<'a>(
    rs: &'a RoomState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Reservation> {
    rs.overlapping(span)
        .find(|r| r.status.occupies_room() && Some(r.id) != exclude)
}

pub(crate) fn check_no_conflict(
    rs: &RoomState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(rs, span, exclude) {
        Some(existing) => {
            metrics::counter!(crate::observability::ADMISSION_CONFLICTS_TOTAL).increment(1);
            tracing::debug!(
                room = %rs.room.id,
                existing = %existing.id,
                "admission rejected: [{}, {}) overlaps [{}, {})",
                span.start,
                span.end,
                existing.span.start,
                existing.span.end
            );
            Err(EngineError::Conflict(existing.id))
        }
        None => Ok(()),
    }
}

pub(crate) fn check_party_size(room: &Room, party_size: u32) -> Result<(), EngineError> {
    if party_size == 0 {
        return Err(EngineError::Invalid("party size must be at least 1"));
    }
    if party_size > room.capacity {
        return Err(EngineError::PartyTooLarge {
            party_size,
            capacity: room.capacity,
        });
    }
    Ok(())
}

pub(crate) fn price_for(room: &Room, span: &Span) -> i64 {
    span.nights().saturating_mul(room.rate_per_night)
}
