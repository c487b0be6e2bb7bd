use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::free_spans;
use super::conflict::{find_conflict, stay_span};
use super::{Engine, EngineError};

/// Filters for listing reservations. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    pub room_id: Option<Ulid>,
    pub status: Option<ReservationStatus>,
    /// Keep reservations whose stay overlaps this window.
    pub window: Option<Span>,
    /// Case-insensitive substring of the guest's name or email.
    pub guest: Option<String>,
}

impl ReservationFilter {
    fn matches(&self, r: &Reservation) -> bool {
        if self.status.is_some_and(|s| s != r.status) {
            return false;
        }
        if self.window.is_some_and(|w| !w.overlaps(&r.span)) {
            return false;
        }
        if let Some(needle) = &self.guest {
            let needle = needle.to_lowercase();
            let in_name = r.guest.name.to_lowercase().contains(&needle);
            let in_email = r
                .guest
                .email
                .as_ref()
                .is_some_and(|e| e.to_lowercase().contains(&needle));
            if !in_name && !in_email {
                return false;
            }
        }
        true
    }
}

/// Two non-cancelled stays on one room that overlap. Admission control
/// should make this impossible; the auditor reports any that slip through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapReport {
    pub room_id: Ulid,
    pub first: Ulid,
    pub second: Ulid,
    pub overlap: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub rooms: usize,
    pub reservations: usize,
}

fn check_window(window: &Span) -> Result<(), EngineError> {
    if window.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

impl Engine {
    /// Dry-run admission: the reservation that would block `[check_in, check_out)`
    /// on this room, if any. Nothing is written.
    pub async fn check_conflict(
        &self,
        room_id: Ulid,
        check_in: Ms,
        check_out: Ms,
        exclude: Option<Ulid>,
    ) -> Result<Option<Reservation>, EngineError> {
        let span = stay_span(check_in, check_out)?;
        let rs = self
            .room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        if guard.room.is_deleted() {
            return Err(EngineError::RoomNotFound(room_id));
        }
        Ok(find_conflict(&guard, &span, exclude).cloned())
    }

    pub async fn get_room(&self, id: Ulid) -> Result<Room, EngineError> {
        match self.room_record(id).await {
            Some(room) if !room.is_deleted() => Ok(room),
            _ => Err(EngineError::RoomNotFound(id)),
        }
    }

    /// A room by id even after soft deletion; bookings keep pointing at it.
    pub async fn room_record(&self, id: Ulid) -> Option<Room> {
        let rs = self.room_state(&id)?;
        let guard = rs.read().await;
        Some(guard.room.clone())
    }

    /// Live rooms ordered by room number.
    pub async fn list_rooms(&self) -> Vec<Room> {
        let states: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut rooms = Vec::with_capacity(states.len());
        for rs in states {
            let guard = rs.read().await;
            if !guard.room.is_deleted() {
                rooms.push(guard.room.clone());
            }
        }
        rooms.sort_by(|a, b| a.number.cmp(&b.number));
        rooms
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        // A move may land between the index lookup and the read; retry like writes do.
        for _ in 0..8 {
            let room_id = self
                .room_for_reservation(&id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            let rs = self
                .room_state(&room_id)
                .ok_or(EngineError::RoomNotFound(room_id))?;
            let guard = rs.read().await;
            if let Some(r) = guard.reservation(id) {
                return Ok(r.clone());
            }
        }
        Err(EngineError::ReservationNotFound(id))
    }

    /// Reservations matching `filter`, ordered by check-in.
    pub async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, EngineError> {
        if let Some(window) = &filter.window {
            check_window(window)?;
        }
        let states: Vec<_> = match filter.room_id {
            Some(room_id) => vec![
                self.room_state(&room_id)
                    .ok_or(EngineError::RoomNotFound(room_id))?,
            ],
            None => self.rooms.iter().map(|e| e.value().clone()).collect(),
        };

        let mut out = Vec::new();
        for rs in states {
            let guard = rs.read().await;
            out.extend(guard.reservations.iter().filter(|r| filter.matches(r)).cloned());
        }
        out.sort_by(|a, b| a.span.start.cmp(&b.span.start).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    /// The audit trail of a reservation, oldest first.
    pub fn reservation_log(&self, id: Ulid) -> Result<Vec<LogEntry>, EngineError> {
        if self.room_for_reservation(&id).is_none() {
            return Err(EngineError::ReservationNotFound(id));
        }
        Ok(self
            .logs
            .get(&id)
            .map(|l| l.value().clone())
            .unwrap_or_default())
    }

    /// Free sub-intervals of `window` on one room.
    pub async fn room_availability(
        &self,
        room_id: Ulid,
        window: Span,
    ) -> Result<Vec<Span>, EngineError> {
        check_window(&window)?;
        let rs = self
            .room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        if guard.room.is_deleted() {
            return Err(EngineError::RoomNotFound(room_id));
        }
        Ok(free_spans(&guard, &window))
    }

    /// Live rooms that fit the party and are free for the whole stay.
    pub async fn available_rooms(
        &self,
        check_in: Ms,
        check_out: Ms,
        party_size: u32,
    ) -> Result<Vec<Room>, EngineError> {
        let span = stay_span(check_in, check_out)?;
        let states: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut rooms = Vec::new();
        for rs in states {
            let guard = rs.read().await;
            if guard.room.is_deleted() || guard.room.capacity < party_size {
                continue;
            }
            if find_conflict(&guard, &span, None).is_none() {
                rooms.push(guard.room.clone());
            }
        }
        rooms.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(rooms)
    }

    /// Scan every room for overlapping non-cancelled stays. Every overlapping
    /// pair is reported once, earlier start first.
    pub async fn audit_overlaps(&self) -> Vec<OverlapReport> {
        let states: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut reports = Vec::new();
        for rs in states {
            let guard = rs.read().await;
            // Reservations are kept in start order. `open` holds the earlier
            // stays still running at the current start.
            let mut open: Vec<&Reservation> = Vec::new();
            for r in guard.reservations.iter().filter(|r| r.status.occupies_room()) {
                open.retain(|prev| prev.span.end > r.span.start);
                for prev in &open {
                    reports.push(OverlapReport {
                        room_id: guard.room.id,
                        first: prev.id,
                        second: r.id,
                        overlap: Span::new(r.span.start, r.span.end.min(prev.span.end)),
                    });
                }
                open.push(r);
            }
        }
        reports
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            rooms: self.rooms.len(),
            reservations: self.reservation_to_room.len(),
        }
    }
}
