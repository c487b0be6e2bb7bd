use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for caller-supplied bounds. Empty and inverted spans are rejected.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Nights billed for a stay: any started day counts.
    pub fn nights(&self) -> i64 {
        (self.duration_ms() + DAY_MS - 1) / DAY_MS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }

    /// Whether a reservation in this status occupies its room.
    ///
    /// `Completed` stays still count: they are the occupancy history, and a
    /// checked-out guest's nights are already cut back to the actual stay.
    pub fn occupies_room(self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    /// Status after `action`, or `None` if the action is not allowed from `self`.
    ///
    /// `Created` has no source status and is never a valid transition.
    pub fn apply(self, action: StayAction) -> Option<ReservationStatus> {
        use ReservationStatus::*;
        match (self, action) {
            (Pending | Confirmed, StayAction::Updated | StayAction::Extended) => Some(self),
            (Pending, StayAction::Confirmed) => Some(Confirmed),
            (Confirmed, StayAction::CheckedIn) => Some(Confirmed),
            (Confirmed, StayAction::CheckedOut) => Some(Completed),
            (Pending | Confirmed, StayAction::Cancelled) => Some(Cancelled),
            (Pending, StayAction::Expired) => Some(Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a reservation. Recorded in its audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StayAction {
    Created,
    Updated,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Extended,
    Cancelled,
    /// Pending reservation cancelled by the reaper.
    Expired,
}

impl StayAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Confirmed => "confirmed",
            Self::CheckedIn => "checked_in",
            Self::CheckedOut => "checked_out",
            Self::Extended => "extended",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub number: String,
    pub room_type: Option<String>,
    /// Max guests.
    pub capacity: u32,
    /// Price per night in minor currency units.
    pub rate_per_night: i64,
    pub location: Option<String>,
    pub deleted_at: Option<Ms>,
}

impl Room {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub room_id: Ulid,
    pub guest: Guest,
    pub party_size: u32,
    pub span: Span,
    pub status: ReservationStatus,
    pub total_price: i64,
    pub note: Option<String>,
    pub checked_in_at: Option<Ms>,
    pub checked_out_at: Option<Ms>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// One line of a reservation's append-only audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Ulid,
    pub reservation_id: Ulid,
    pub action: StayAction,
    pub from: Option<ReservationStatus>,
    pub to: ReservationStatus,
    pub actor: String,
    pub at: Ms,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Every reservation ever made for the room, cancelled ones included, sorted by `span.start`.
    pub reservations: Vec<Reservation>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            reservations: Vec::new(),
        }
    }

    /// Insert reservation maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    /// Replace (or insert) a reservation, re-sorting if its start moved.
    pub fn upsert_reservation(&mut self, reservation: Reservation) {
        self.remove_reservation(reservation.id);
        self.insert_reservation(reservation);
    }

    pub fn reservation(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Reservations (any status) whose span overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    fn active(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations
            .iter()
            .filter(|r| matches!(r.status, ReservationStatus::Pending | ReservationStatus::Confirmed))
    }

    pub fn has_active_reservations(&self) -> bool {
        self.active().next().is_some()
    }

    /// Pending and confirmed stays. Terminal ones are history and do not
    /// count toward the per-room cap.
    pub fn active_reservation_count(&self) -> usize {
        self.active().count()
    }

    pub fn largest_active_party(&self) -> Option<u32> {
        self.active().map(|r| r.party_size).max()
    }
}

/// The event types, flat with no nesting. This is the WAL record format and the
/// payload pushed to room subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    RoomCreated {
        room: Room,
    },
    RoomUpdated {
        room: Room,
    },
    RoomDeleted {
        id: Ulid,
        at: Ms,
    },
    ReservationCreated {
        reservation: Reservation,
        entry: LogEntry,
    },
    /// Any change to an existing reservation. `previous_room_id` differs from
    /// `reservation.room_id` when the guest was moved.
    ReservationChanged {
        previous_room_id: Ulid,
        reservation: Reservation,
        entry: LogEntry,
    },
    /// Emitted only by compaction: the reservation as it stands plus its full log.
    ReservationRestored {
        reservation: Reservation,
        log: Vec<LogEntry>,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::RoomCreated { .. } => "room_created",
            Event::RoomUpdated { .. } => "room_updated",
            Event::RoomDeleted { .. } => "room_deleted",
            Event::ReservationCreated { .. } => "reservation_created",
            Event::ReservationChanged { .. } => "reservation_changed",
            Event::ReservationRestored { .. } => "reservation_restored",
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn try_new_rejects_empty_and_inverted() {
        assert!(Span::try_new(100, 100).is_none());
        assert!(Span::try_new(200, 100).is_none());
        assert_eq!(Span::try_new(100, 101), Some(Span::new(100, 101)));
    }

    #[test]
    fn nights_round_up_partial_days() {
        assert_eq!(Span::new(0, DAY_MS).nights(), 1);
        assert_eq!(Span::new(0, 3 * DAY_MS).nights(), 3);
        // 2pm check-in, noon check-out two days later
        let h = DAY_MS / 24;
        assert_eq!(Span::new(14 * h, 2 * DAY_MS + 12 * h).nights(), 2);
        assert_eq!(Span::new(0, 1).nights(), 1);
    }

    #[test]
    fn status_happy_path() {
        let s = ReservationStatus::Pending;
        let s = s.apply(StayAction::Confirmed).unwrap();
        assert_eq!(s, ReservationStatus::Confirmed);
        let s = s.apply(StayAction::CheckedIn).unwrap();
        assert_eq!(s, ReservationStatus::Confirmed);
        let s = s.apply(StayAction::CheckedOut).unwrap();
        assert_eq!(s, ReservationStatus::Completed);
    }

    #[test]
    fn terminal_states_reject_everything() {
        let actions = [
            StayAction::Created,
            StayAction::Updated,
            StayAction::Confirmed,
            StayAction::CheckedIn,
            StayAction::CheckedOut,
            StayAction::Extended,
            StayAction::Cancelled,
            StayAction::Expired,
        ];
        for status in [ReservationStatus::Completed, ReservationStatus::Cancelled] {
            assert!(status.is_terminal());
            for action in actions {
                assert_eq!(status.apply(action), None, "{status} accepted {action:?}");
            }
        }
    }

    #[test]
    fn pending_cannot_check_in_or_out() {
        assert_eq!(ReservationStatus::Pending.apply(StayAction::CheckedIn), None);
        assert_eq!(ReservationStatus::Pending.apply(StayAction::CheckedOut), None);
    }

    #[test]
    fn only_pending_expires() {
        assert_eq!(
            ReservationStatus::Pending.apply(StayAction::Expired),
            Some(ReservationStatus::Cancelled)
        );
        assert_eq!(ReservationStatus::Confirmed.apply(StayAction::Expired), None);
    }

    #[test]
    fn reservation_ordering() {
        let r = room("101");
        let mut rs = RoomState::new(r.clone());
        rs.insert_reservation(reservation(r.id, 300, 400, ReservationStatus::Pending));
        rs.insert_reservation(reservation(r.id, 100, 200, ReservationStatus::Confirmed));
        rs.insert_reservation(reservation(r.id, 200, 300, ReservationStatus::Cancelled));
        assert_eq!(rs.reservations[0].span.start, 100);
        assert_eq!(rs.reservations[1].span.start, 200);
        assert_eq!(rs.reservations[2].span.start, 300);
    }

    #[test]
    fn upsert_moves_reservation_into_order() {
        let r = room("101");
        let mut rs = RoomState::new(r.clone());
        let mut a = reservation(r.id, 100, 200, ReservationStatus::Pending);
        let b = reservation(r.id, 300, 400, ReservationStatus::Pending);
        rs.insert_reservation(a.clone());
        rs.insert_reservation(b.clone());

        a.span = Span::new(500, 600);
        rs.upsert_reservation(a.clone());
        assert_eq!(rs.reservations.len(), 2);
        assert_eq!(rs.reservations[0].id, b.id);
        assert_eq!(rs.reservations[1].id, a.id);
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let r = room("101");
        let mut rs = RoomState::new(r.clone());
        rs.insert_reservation(reservation(r.id, 100, 200, ReservationStatus::Pending));
        assert!(rs.remove_reservation(Ulid::new()).is_none());
        assert_eq!(rs.reservations.len(), 1);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let r = room("101");
        let mut rs = RoomState::new(r.clone());
        rs.insert_reservation(reservation(r.id, 100, 200, ReservationStatus::Confirmed));
        rs.insert_reservation(reservation(r.id, 450, 600, ReservationStatus::Confirmed));
        rs.insert_reservation(reservation(r.id, 1000, 1100, ReservationStatus::Confirmed));

        let hits: Vec<_> = rs.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let r = room("101");
        let mut rs = RoomState::new(r.clone());
        rs.insert_reservation(reservation(r.id, 100, 200, ReservationStatus::Confirmed));
        assert!(rs.overlapping(&Span::new(200, 300)).next().is_none());
        assert!(rs.overlapping(&Span::new(0, 100)).next().is_none());
    }

    #[test]
    fn overlapping_long_stay_spanning_query() {
        let r = room("101");
        let mut rs = RoomState::new(r.clone());
        rs.insert_reservation(reservation(r.id, 0, 10_000, ReservationStatus::Confirmed));
        assert_eq!(rs.overlapping(&Span::new(500, 600)).count(), 1);
    }

    #[test]
    fn active_reservations_ignore_terminal() {
        let r = room("101");
        let mut rs = RoomState::new(r.clone());
        rs.insert_reservation(reservation(r.id, 0, 100, ReservationStatus::Cancelled));
        rs.insert_reservation(reservation(r.id, 100, 200, ReservationStatus::Completed));
        assert!(!rs.has_active_reservations());
        rs.insert_reservation(reservation(r.id, 200, 300, ReservationStatus::Pending));
        assert!(rs.has_active_reservations());
        assert_eq!(rs.active_reservation_count(), 1);
        assert_eq!(rs.largest_active_party(), Some(1));
    }

    #[test]
    fn largest_active_party_skips_history() {
        let r = room("101");
        let mut rs = RoomState::new(r.clone());
        assert_eq!(rs.largest_active_party(), None);
        let mut big = reservation(r.id, 0, 100, ReservationStatus::Cancelled);
        big.party_size = 4;
        rs.insert_reservation(big);
        let mut pair = reservation(r.id, 100, 200, ReservationStatus::Confirmed);
        pair.party_size = 2;
        rs.insert_reservation(pair);
        assert_eq!(rs.active_reservation_count(), 1);
        assert_eq!(rs.largest_active_party(), Some(2));
    }

    #[test]
    fn status_json_is_lowercase() {
        let json = serde_json::to_string(&ReservationStatus::Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");
        let parsed: ReservationStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, ReservationStatus::Cancelled);
    }
}
