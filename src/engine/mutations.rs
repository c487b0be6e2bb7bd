use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, check_party_size, now_ms, price_for, stay_span};
use super::{Engine, EngineError, WalCommand};

#[derive(Debug, Clone)]
pub struct NewRoom {
    pub number: String,
    pub room_type: Option<String>,
    pub capacity: u32,
    pub rate_per_night: i64,
    pub location: Option<String>,
}

/// Fields left `None` are unchanged.
#[derive(Debug, Clone, Default)]
pub struct RoomPatch {
    pub number: Option<String>,
    pub room_type: Option<String>,
    pub capacity: Option<u32>,
    pub rate_per_night: Option<i64>,
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub room_id: Ulid,
    pub guest: Guest,
    pub party_size: u32,
    pub check_in: Ms,
    pub check_out: Ms,
    /// Initial status; `Pending` when absent. Only `Pending` and `Confirmed` are accepted.
    pub status: Option<ReservationStatus>,
    pub note: Option<String>,
}

/// Fields left `None` are unchanged. Setting `room_id` moves the guest.
#[derive(Debug, Clone, Default)]
pub struct ReservationPatch {
    pub room_id: Option<Ulid>,
    pub check_in: Option<Ms>,
    pub check_out: Option<Ms>,
    pub guest: Option<Guest>,
    pub party_size: Option<u32>,
    pub note: Option<String>,
}

/// Who made a change and why; becomes the audit log entry.
#[derive(Debug, Clone)]
pub struct AuditInfo {
    pub actor: String,
    pub note: Option<String>,
}

impl AuditInfo {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            note: None,
        }
    }

    pub fn system() -> Self {
        Self::new("system")
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.actor.is_empty() {
            return Err(EngineError::Invalid("actor must not be empty"));
        }
        if self.actor.len() > MAX_ACTOR_LEN {
            return Err(EngineError::LimitExceeded("actor too long"));
        }
        check_note(&self.note)
    }

    fn entry(
        &self,
        reservation_id: Ulid,
        action: StayAction,
        from: Option<ReservationStatus>,
        to: ReservationStatus,
        at: Ms,
    ) -> LogEntry {
        LogEntry {
            id: Ulid::new(),
            reservation_id,
            action,
            from,
            to,
            actor: self.actor.clone(),
            at,
            note: self.note.clone(),
        }
    }
}

fn check_note(note: &Option<String>) -> Result<(), EngineError> {
    if note.as_ref().is_some_and(|n| n.len() > MAX_NOTE_LEN) {
        return Err(EngineError::LimitExceeded("note too long"));
    }
    Ok(())
}

fn check_guest(guest: &Guest) -> Result<(), EngineError> {
    if guest.name.trim().is_empty() {
        return Err(EngineError::Invalid("guest name must not be empty"));
    }
    let too_long = |s: &Option<String>| s.as_ref().is_some_and(|s| s.len() > MAX_NAME_LEN);
    if guest.name.len() > MAX_NAME_LEN || too_long(&guest.email) || too_long(&guest.phone) {
        return Err(EngineError::LimitExceeded("guest field too long"));
    }
    Ok(())
}

fn check_room_fields(number: &str, capacity: u32, rate_per_night: i64) -> Result<(), EngineError> {
    if number.trim().is_empty() {
        return Err(EngineError::Invalid("room number must not be empty"));
    }
    if number.len() > MAX_ROOM_NUMBER_LEN {
        return Err(EngineError::LimitExceeded("room number too long"));
    }
    if capacity == 0 {
        return Err(EngineError::Invalid("room capacity must be at least 1"));
    }
    if rate_per_night < 0 {
        return Err(EngineError::Invalid("rate per night must not be negative"));
    }
    Ok(())
}

fn check_optional_name(value: &Option<String>) -> Result<(), EngineError> {
    if value.as_ref().is_some_and(|v| v.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("room field too long"));
    }
    Ok(())
}

impl Engine {
    /// Reject `number` if a live room other than `except` already uses it.
    /// Caller holds `room_admin`, so numbers cannot change underneath.
    async fn check_number_free(&self, number: &str, except: Option<Ulid>) -> Result<(), EngineError> {
        let states: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        for rs in states {
            let guard = rs.read().await;
            if !guard.room.is_deleted() && guard.room.number == number && Some(guard.room.id) != except {
                return Err(EngineError::DuplicateRoomNumber(number.to_string()));
            }
        }
        Ok(())
    }

    pub async fn create_room(&self, new: NewRoom) -> Result<Room, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let _admin = self.room_admin.lock().await;

        if self.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        check_room_fields(&new.number, new.capacity, new.rate_per_night)?;
        check_optional_name(&new.room_type)?;
        check_optional_name(&new.location)?;
        self.check_number_free(&new.number, None).await?;

        let room = Room {
            id: Ulid::new(),
            number: new.number,
            room_type: new.room_type,
            capacity: new.capacity,
            rate_per_night: new.rate_per_night,
            location: new.location,
            deleted_at: None,
        };
        if self.rooms.contains_key(&room.id) {
            return Err(EngineError::AlreadyExists(room.id));
        }

        let event = Event::RoomCreated { room: room.clone() };
        self.wal_append(&event).await?;
        self.rooms
            .insert(room.id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
        self.notify.send(room.id, &event);
        tracing::info!(room = %room.id, number = %room.number, "room created");
        Ok(room)
    }

    pub async fn update_room(&self, id: Ulid, patch: RoomPatch) -> Result<Room, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let _admin = self.room_admin.lock().await;

        let rs = self.room_state(&id).ok_or(EngineError::RoomNotFound(id))?;
        if let Some(number) = &patch.number {
            self.check_number_free(number, Some(id)).await?;
        }

        let mut guard = rs.write().await;
        if guard.room.is_deleted() {
            return Err(EngineError::RoomNotFound(id));
        }
        let mut room = guard.room.clone();
        if let Some(number) = patch.number {
            room.number = number;
        }
        if let Some(room_type) = patch.room_type {
            room.room_type = Some(room_type);
        }
        if let Some(capacity) = patch.capacity {
            room.capacity = capacity;
        }
        if let Some(rate) = patch.rate_per_night {
            room.rate_per_night = rate;
        }
        if let Some(location) = patch.location {
            room.location = Some(location);
        }
        check_room_fields(&room.number, room.capacity, room.rate_per_night)?;
        check_optional_name(&room.room_type)?;
        check_optional_name(&room.location)?;
        if let Some(largest) = guard.largest_active_party()
            && largest > room.capacity
        {
            return Err(EngineError::PartyTooLarge {
                party_size: largest,
                capacity: room.capacity,
            });
        }

        let event = Event::RoomUpdated { room: room.clone() };
        self.commit(&mut [&mut *guard], &event).await?;
        Ok(room)
    }

    /// Soft delete. Rooms with pending or confirmed bookings are kept.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let _admin = self.room_admin.lock().await;

        let rs = self.room_state(&id).ok_or(EngineError::RoomNotFound(id))?;
        let mut guard = rs.write().await;
        if guard.room.is_deleted() {
            return Err(EngineError::RoomNotFound(id));
        }
        if guard.has_active_reservations() {
            return Err(EngineError::RoomHasActiveReservations(id));
        }

        let event = Event::RoomDeleted { id, at: now_ms() };
        self.commit(&mut [&mut *guard], &event).await?;
        self.notify.remove(&id);
        tracing::info!(room = %id, "room deleted");
        Ok(())
    }

    /// Admit a new reservation. The conflict check, the WAL append and the
    /// apply all happen under the room's write lock.
    pub async fn create_reservation(
        &self,
        new: NewReservation,
        audit: &AuditInfo,
    ) -> Result<Reservation, EngineError> {
        audit.validate()?;
        check_guest(&new.guest)?;
        check_note(&new.note)?;
        let span = stay_span(new.check_in, new.check_out)?;
        let status = match new.status {
            None | Some(ReservationStatus::Pending) => ReservationStatus::Pending,
            Some(ReservationStatus::Confirmed) => ReservationStatus::Confirmed,
            Some(_) => {
                return Err(EngineError::Invalid(
                    "a new booking must be pending or confirmed",
                ));
            }
        };

        let _gate = self.compaction_gate.read().await;
        let rs = self
            .room_state(&new.room_id)
            .ok_or(EngineError::RoomNotFound(new.room_id))?;
        let mut guard = rs.write().await;
        if guard.room.is_deleted() {
            return Err(EngineError::RoomNotFound(new.room_id));
        }
        if guard.active_reservation_count() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }
        check_party_size(&guard.room, new.party_size)?;
        check_no_conflict(&guard, &span, None)?;

        let now = now_ms();
        let reservation = Reservation {
            id: Ulid::new(),
            room_id: new.room_id,
            guest: new.guest,
            party_size: new.party_size,
            span,
            status,
            total_price: price_for(&guard.room, &span),
            note: new.note,
            checked_in_at: None,
            checked_out_at: None,
            created_at: now,
            updated_at: now,
        };
        let entry = audit.entry(reservation.id, StayAction::Created, None, status, now);
        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
            entry,
        };
        self.commit(&mut [&mut *guard], &event).await?;
        tracing::info!(
            booking = %reservation.id,
            room = %reservation.room_id,
            "booking created for [{}, {})",
            span.start,
            span.end
        );
        Ok(reservation)
    }

    /// Edit dates, room, guest, party size or note. The reservation itself is
    /// excluded from the conflict check, so shifting a stay never self-conflicts.
    pub async fn update_reservation(
        &self,
        id: Ulid,
        patch: ReservationPatch,
        audit: &AuditInfo,
    ) -> Result<Reservation, EngineError> {
        audit.validate()?;
        if let Some(guest) = &patch.guest {
            check_guest(guest)?;
        }
        check_note(&patch.note)?;

        let _gate = self.compaction_gate.read().await;
        for _ in 0..8 {
            let from = self
                .room_for_reservation(&id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            let to = patch.room_id.unwrap_or(from);

            if from == to {
                let rs = self.room_state(&from).ok_or(EngineError::RoomNotFound(from))?;
                let mut guard = rs.write_owned().await;
                if guard.reservation(id).is_none() {
                    continue; // moved meanwhile
                }
                return self.apply_update(&mut *guard, None, id, &patch, audit).await;
            }

            let from_rs = self.room_state(&from).ok_or(EngineError::RoomNotFound(from))?;
            let to_rs = self.room_state(&to).ok_or(EngineError::RoomNotFound(to))?;
            // Lock in id order so two opposite moves cannot deadlock.
            let (mut from_guard, mut to_guard) = if from < to {
                let f = from_rs.write_owned().await;
                (f, to_rs.write_owned().await)
            } else {
                let t = to_rs.write_owned().await;
                (from_rs.write_owned().await, t)
            };
            if from_guard.reservation(id).is_none() {
                continue;
            }
            return self
                .apply_update(&mut *from_guard, Some(&mut *to_guard), id, &patch, audit)
                .await;
        }
        Err(EngineError::ReservationNotFound(id))
    }

    async fn apply_update(
        &self,
        from: &mut RoomState,
        to: Option<&mut RoomState>,
        id: Ulid,
        patch: &ReservationPatch,
        audit: &AuditInfo,
    ) -> Result<Reservation, EngineError> {
        let current = from
            .reservation(id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))?;
        let status = current
            .status
            .apply(StayAction::Updated)
            .ok_or(EngineError::InvalidTransition {
                id,
                status: current.status,
                action: StayAction::Updated,
            })?;

        let span = stay_span(
            patch.check_in.unwrap_or(current.span.start),
            patch.check_out.unwrap_or(current.span.end),
        )?;
        if current.checked_in_at.is_some() && (to.is_some() || span.start != current.span.start) {
            return Err(EngineError::Invalid(
                "guest is checked in; only check-out date and guest details can change",
            ));
        }

        let target: &RoomState = match &to {
            Some(t) => &**t,
            None => &*from,
        };
        if target.room.is_deleted() {
            return Err(EngineError::RoomNotFound(target.room.id));
        }
        if to.is_some() && target.active_reservation_count() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }
        let party_size = patch.party_size.unwrap_or(current.party_size);
        check_party_size(&target.room, party_size)?;
        check_no_conflict(target, &span, Some(id))?;

        let now = now_ms();
        let updated = Reservation {
            room_id: target.room.id,
            guest: patch.guest.clone().unwrap_or_else(|| current.guest.clone()),
            party_size,
            span,
            status,
            total_price: price_for(&target.room, &span),
            note: patch.note.clone().or_else(|| current.note.clone()),
            updated_at: now,
            ..current.clone()
        };
        let entry = audit.entry(id, StayAction::Updated, Some(current.status), status, now);
        let event = Event::ReservationChanged {
            previous_room_id: from.room.id,
            reservation: updated.clone(),
            entry,
        };
        match to {
            Some(to) => self.commit(&mut [from, to], &event).await?,
            None => self.commit(&mut [from], &event).await?,
        }
        Ok(updated)
    }

    /// Run one status action under the room's write lock. `adjust` may veto
    /// the action or amend the reservation (dates, timestamps) before commit.
    async fn transition<F>(
        &self,
        id: Ulid,
        action: StayAction,
        audit: &AuditInfo,
        adjust: F,
    ) -> Result<Reservation, EngineError>
    where
        F: FnOnce(&RoomState, &mut Reservation) -> Result<(), EngineError>,
    {
        audit.validate()?;
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = guard
            .reservation(id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))?;
        let invalid = EngineError::InvalidTransition {
            id,
            status: current.status,
            action,
        };
        let Some(status) = current.status.apply(action) else {
            return Err(invalid);
        };

        let now = now_ms();
        let mut next = current.clone();
        next.status = status;
        next.updated_at = now;
        adjust(&*guard, &mut next)?;

        let entry = audit.entry(id, action, Some(current.status), status, now);
        let event = Event::ReservationChanged {
            previous_room_id: guard.room.id,
            reservation: next.clone(),
            entry,
        };
        self.commit(&mut [&mut *guard], &event).await?;
        tracing::info!(booking = %id, "{} -> {status} ({})", current.status, action.as_str());
        Ok(next)
    }

    pub async fn confirm(&self, id: Ulid, audit: &AuditInfo) -> Result<Reservation, EngineError> {
        self.transition(id, StayAction::Confirmed, audit, |_, _| Ok(()))
            .await
    }

    pub async fn check_in(
        &self,
        id: Ulid,
        at: Ms,
        audit: &AuditInfo,
    ) -> Result<Reservation, EngineError> {
        self.transition(id, StayAction::CheckedIn, audit, |_, r| {
            if r.checked_in_at.is_some() {
                return Err(EngineError::InvalidTransition {
                    id,
                    status: r.status,
                    action: StayAction::CheckedIn,
                });
            }
            if !r.span.contains_instant(at) {
                return Err(EngineError::Invalid("check-in time is outside the booked stay"));
            }
            r.checked_in_at = Some(at);
            Ok(())
        })
        .await
    }

    /// Complete a stay. Leaving before the booked check-out releases the
    /// remaining nights: the stay is cut at `at` and re-priced. Check-in lies
    /// inside the stay, so `at` after check-in always leaves a non-empty span.
    pub async fn check_out(
        &self,
        id: Ulid,
        at: Ms,
        audit: &AuditInfo,
    ) -> Result<Reservation, EngineError> {
        self.transition(id, StayAction::CheckedOut, audit, |rs, r| {
            if r.checked_in_at.is_none() {
                return Err(EngineError::InvalidTransition {
                    id,
                    status: r.status,
                    action: StayAction::CheckedOut,
                });
            }
            if r.checked_in_at.is_some_and(|checked_in| at <= checked_in) {
                return Err(EngineError::Invalid("check-out must be after check-in"));
            }
            r.checked_out_at = Some(at);
            if r.span.contains_instant(at) {
                r.span = Span::new(r.span.start, at);
                r.total_price = price_for(&rs.room, &r.span);
            }
            Ok(())
        })
        .await
    }

    /// Cancelled bookings stay on record but stop occupying the room.
    pub async fn cancel(&self, id: Ulid, audit: &AuditInfo) -> Result<Reservation, EngineError> {
        self.transition(id, StayAction::Cancelled, audit, |_, r| {
            if r.checked_in_at.is_some() {
                return Err(EngineError::Invalid(
                    "guest is checked in; check out instead of cancelling",
                ));
            }
            Ok(())
        })
        .await
    }

    /// Push check-out later, admitting the extra nights like a new booking.
    pub async fn extend(
        &self,
        id: Ulid,
        new_check_out: Ms,
        audit: &AuditInfo,
    ) -> Result<Reservation, EngineError> {
        self.transition(id, StayAction::Extended, audit, |rs, r| {
            if new_check_out <= r.span.end {
                return Err(EngineError::Invalid(
                    "new check-out must be after the current check-out",
                ));
            }
            let span = stay_span(r.span.start, new_check_out)?;
            check_no_conflict(rs, &span, Some(id))?;
            r.span = span;
            r.total_price = price_for(&rs.room, &span);
            Ok(())
        })
        .await
    }

    /// Cancel a pending booking nobody confirmed in time. Staleness is
    /// re-checked under the room lock: a stay rescheduled since
    /// `collect_stale_pending` ran is left alone.
    pub async fn expire_pending(
        &self,
        id: Ulid,
        now: Ms,
        grace: Ms,
    ) -> Result<Reservation, EngineError> {
        let audit = AuditInfo::system().with_note(Some("not confirmed before check-in".into()));
        self.transition(id, StayAction::Expired, &audit, |_, r| {
            if r.span.start.saturating_add(grace) > now {
                return Err(EngineError::Invalid("check-in is not yet past the grace period"));
            }
            Ok(())
        })
        .await
    }

    /// Pending bookings whose check-in passed more than `grace` ago.
    pub fn collect_stale_pending(&self, now: Ms, grace: Ms) -> Vec<Ulid> {
        let mut stale = Vec::new();
        for entry in self.rooms.iter() {
            let rs = entry.value().clone();
            if let Ok(guard) = rs.try_read() {
                stale.extend(
                    guard
                        .reservations
                        .iter()
                        .filter(|r| r.status == ReservationStatus::Pending)
                        .filter(|r| r.span.start.saturating_add(grace) <= now)
                        .map(|r| r.id),
                );
            }
        }
        stale
    }

    /// Rewrite the WAL with the minimal event set that restores current state:
    /// every room (deleted ones included) and every reservation with its log.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.write().await;

        let states: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::new();
        let mut reservations = Vec::new();
        for rs in states {
            let guard = rs.read().await;
            events.push(Event::RoomCreated {
                room: guard.room.clone(),
            });
            reservations.extend(guard.reservations.iter().cloned());
        }
        // Rooms first so every restored reservation finds its room on replay.
        for reservation in reservations {
            let log = self
                .logs
                .get(&reservation.id)
                .map(|l| l.value().clone())
                .unwrap_or_default();
            events.push(Event::ReservationRestored { reservation, log });
        }

        let count = events.len();
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
