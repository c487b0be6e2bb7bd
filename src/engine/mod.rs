mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{merge_overlapping, subtract_intervals};
pub use conflict::{find_conflict, now_ms};
pub use error::EngineError;
pub use mutations::{AuditInfo, NewReservation, NewRoom, ReservationPatch, RoomPatch};
pub use queries::{EngineStats, OverlapReport, ReservationFilter};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                if let Err(e) = &result {
                    tracing::error!("WAL flush failed for batch of {}: {e}", batch.len());
                }
                respond_batch(batch, &result);

                if let Some(cmd) = deferred {
                    handle_non_append(&mut wal, cmd);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// In-memory reservation state for every room, made durable through the WAL.
///
/// Each room sits behind its own `RwLock`. Every admitting write (create,
/// reschedule, extend) holds the room's write lock from the conflict check
/// until the event is durable and applied, so two overlapping requests for
/// the same room can never both pass the check.
pub struct Engine {
    rooms: DashMap<Ulid, SharedRoomState>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → room id
    reservation_to_room: DashMap<Ulid, Ulid>,
    /// Append-only audit trail per reservation.
    logs: DashMap<Ulid, Vec<LogEntry>>,
    /// Mutations hold this shared; compaction holds it exclusively so the
    /// snapshot it writes cannot miss a concurrently acknowledged event.
    compaction_gate: RwLock<()>,
    /// Serializes room create/update/delete so room numbers stay unique.
    room_admin: Mutex<()>,
}

/// Apply an event to one room's state (caller holds the lock).
///
/// A move shows up on both rooms: the old room drops the reservation, the new one gains it.
fn apply_to_room(rs: &mut RoomState, event: &Event) {
    match event {
        Event::RoomUpdated { room } => rs.room = room.clone(),
        Event::RoomDeleted { at, .. } => rs.room.deleted_at = Some(*at),
        Event::ReservationCreated { reservation, .. }
        | Event::ReservationRestored { reservation, .. } => {
            rs.upsert_reservation(reservation.clone());
        }
        Event::ReservationChanged {
            previous_room_id,
            reservation,
            ..
        } => {
            if rs.room.id == reservation.room_id {
                rs.upsert_reservation(reservation.clone());
            } else if rs.room.id == *previous_room_id {
                rs.remove_reservation(reservation.id);
            }
        }
        // RoomCreated is handled at the map level
        Event::RoomCreated { .. } => {}
    }
}

/// Maintain the reservation index and audit logs for an event.
fn index_event(event: &Event, index: &DashMap<Ulid, Ulid>, logs: &DashMap<Ulid, Vec<LogEntry>>) {
    match event {
        Event::ReservationCreated { reservation, entry }
        | Event::ReservationChanged {
            reservation, entry, ..
        } => {
            index.insert(reservation.id, reservation.room_id);
            logs.entry(reservation.id).or_default().push(entry.clone());
        }
        Event::ReservationRestored { reservation, log } => {
            index.insert(reservation.id, reservation.room_id);
            logs.insert(reservation.id, log.clone());
        }
        Event::RoomCreated { .. } | Event::RoomUpdated { .. } | Event::RoomDeleted { .. } => {}
    }
}

/// Rooms an event touches: the owning room, plus the previous room of a move.
fn event_room_ids(event: &Event) -> (Ulid, Option<Ulid>) {
    match event {
        Event::RoomCreated { room } | Event::RoomUpdated { room } => (room.id, None),
        Event::RoomDeleted { id, .. } => (*id, None),
        Event::ReservationCreated { reservation, .. }
        | Event::ReservationRestored { reservation, .. } => (reservation.room_id, None),
        Event::ReservationChanged {
            previous_room_id,
            reservation,
            ..
        } => {
            let moved = (*previous_room_id != reservation.room_id).then_some(*previous_room_id);
            (reservation.room_id, moved)
        }
    }
}

impl Engine {
    /// Replay the WAL at `wal_path` and start the background writer.
    /// Must be called from within a tokio runtime.
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;

        let reservation_to_room = DashMap::new();
        let logs = DashMap::new();

        // Replay into plain owned state first; nothing else can see it yet.
        let mut replayed: HashMap<Ulid, RoomState> = HashMap::new();
        for event in &events {
            match event {
                Event::RoomCreated { room } => {
                    replayed.insert(room.id, RoomState::new(room.clone()));
                }
                other => {
                    let (room_id, previous) = event_room_ids(other);
                    for id in std::iter::once(room_id).chain(previous) {
                        if let Some(rs) = replayed.get_mut(&id) {
                            apply_to_room(rs, other);
                        }
                    }
                    index_event(other, &reservation_to_room, &logs);
                }
            }
        }
        tracing::info!(
            "replayed {} WAL events: {} rooms, {} reservations",
            events.len(),
            replayed.len(),
            reservation_to_room.len()
        );

        let rooms = replayed
            .into_iter()
            .map(|(id, rs)| (id, Arc::new(RwLock::new(rs))))
            .collect();

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            rooms,
            wal_tx,
            notify,
            reservation_to_room,
            logs,
            compaction_gate: RwLock::new(()),
            room_admin: Mutex::new(()),
        })
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Room state by id, including soft-deleted rooms.
    pub(super) fn room_state(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_room.get(reservation_id).map(|e| *e.value())
    }

    /// WAL-append + apply + index + notify. `rooms` are the locked states the
    /// event touches (one, or two for a move).
    pub(super) async fn commit(
        &self,
        rooms: &mut [&mut RoomState],
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        for rs in rooms.iter_mut() {
            apply_to_room(rs, event);
        }
        index_event(event, &self.reservation_to_room, &self.logs);
        if let Event::ReservationCreated { entry, .. } | Event::ReservationChanged { entry, .. } = event {
            metrics::counter!(
                crate::observability::BOOKING_ACTIONS_TOTAL,
                "action" => entry.action.as_str()
            )
            .increment(1);
        }

        let (room_id, previous) = event_room_ids(event);
        self.notify.send(room_id, event);
        if let Some(previous) = previous {
            self.notify.send(previous, event);
        }
        Ok(())
    }

    /// Lookup reservation → room, acquire the room's write lock.
    ///
    /// A concurrent move can relocate the reservation between the lookup and
    /// the lock, so the lookup is retried until the locked room holds it.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<RoomState>, EngineError> {
        for _ in 0..8 {
            let room_id = self
                .room_for_reservation(reservation_id)
                .ok_or(EngineError::ReservationNotFound(*reservation_id))?;
            let rs = self
                .room_state(&room_id)
                .ok_or(EngineError::RoomNotFound(room_id))?;
            let guard = rs.write_owned().await;
            if guard.reservation(*reservation_id).is_some() {
                return Ok(guard);
            }
        }
        Err(EngineError::ReservationNotFound(*reservation_id))
    }
}
