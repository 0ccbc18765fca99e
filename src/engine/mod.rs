mod availability;
mod conflict;
mod error;
mod mutations;
mod policy;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{day_grid, free_within, is_available, merge_overlapping, occupied_within, subtract_intervals};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
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
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
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
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Reservation engine for one property: rooms, bookings and payments in
/// memory, every accepted mutation WAL-logged and broadcast.
pub struct Engine {
    pub rooms: DashMap<Ulid, SharedRoomState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: booking id → room id
    pub(super) booking_to_room: DashMap<Ulid, Ulid>,
}

/// Apply an event directly to a RoomState (no locking — caller holds the lock).
fn apply_to_room(room: &mut RoomState, event: &Event, booking_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::BookingRequested {
            id,
            room_id,
            span,
            user_id,
            guest,
            guests,
            total_cents,
        } => {
            room.insert_booking(Booking {
                id: *id,
                span: *span,
                status: BookingStatus::Pending,
                user_id: *user_id,
                guest: guest.clone(),
                guests: *guests,
                total_cents: *total_cents,
                payment: None,
            });
            booking_map.insert(*id, *room_id);
        }
        Event::PaymentRecorded {
            booking_id,
            payment_id,
            amount_cents,
            method,
            ..
        } => {
            if let Some(b) = room.booking_mut(*booking_id) {
                b.payment = Some(Payment {
                    id: *payment_id,
                    amount_cents: *amount_cents,
                    method: *method,
                    status: PaymentStatus::Pending,
                });
            }
        }
        Event::PaymentCompleted { booking_id, .. } => {
            if let Some(b) = room.booking_mut(*booking_id) {
                if let Some(p) = &mut b.payment {
                    p.status = PaymentStatus::Completed;
                }
                b.status = BookingStatus::Confirmed;
            }
        }
        Event::PaymentFailed { booking_id, .. } => {
            if let Some(b) = room.booking_mut(*booking_id)
                && let Some(p) = &mut b.payment {
                    p.status = PaymentStatus::Failed;
                }
        }
        Event::PaymentRefunded { booking_id, .. } => {
            if let Some(b) = room.booking_mut(*booking_id)
                && let Some(p) = &mut b.payment {
                    p.status = PaymentStatus::Refunded;
                }
        }
        Event::BookingCancelled { booking_id, .. } => {
            if let Some(b) = room.booking_mut(*booking_id) {
                b.status = BookingStatus::Cancelled;
            }
        }
        Event::BookingCompleted { booking_id, .. } => {
            if let Some(b) = room.booking_mut(*booking_id) {
                b.status = BookingStatus::Completed;
            }
        }
        Event::RoomUpdated {
            name,
            capacity,
            rate_cents,
            open,
            ..
        } => {
            room.name = name.clone();
            room.capacity = *capacity;
            room.rate_cents = *rate_cents;
            room.open = *open;
        }
        // RoomCreated/Deleted are handled at the DashMap level, not here
        Event::RoomCreated { .. } | Event::RoomDeleted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            wal_tx,
            notify,
            booking_to_room: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly (no contention). Never use blocking_read/blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::RoomCreated { id, name, capacity, rate_cents, open } => {
                    let room = RoomState::new(*id, name.clone(), *capacity, *rate_cents, *open);
                    engine.rooms.insert(*id, Arc::new(RwLock::new(room)));
                }
                Event::RoomDeleted { id } => {
                    if let Some((_, room)) = engine.rooms.remove(id) {
                        let guard = room.try_read().expect("replay: uncontended read");
                        for b in &guard.bookings {
                            engine.booking_to_room.remove(&b.id);
                        }
                    }
                }
                other => {
                    if let Some(room_id) = event_room_id(other)
                        && let Some(entry) = engine.rooms.get(&room_id) {
                            let room_arc = entry.clone();
                            let mut guard = room_arc.try_write().expect("replay: uncontended write");
                            apply_to_room(&mut guard, other, &engine.booking_to_room);
                        }
                }
            }
        }

        Ok(engine)
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

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        room_id: Ulid,
        room: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(room, event, &self.booking_to_room);
        self.notify.send(room_id, event);
        Ok(())
    }

    /// Lookup booking → room, get room, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .room_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let room = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = room.write_owned().await;
        Ok((room_id, guard))
    }
}

/// Extract the room_id from an event (for non-Create/Delete events).
fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingRequested { room_id, .. }
        | Event::PaymentRecorded { room_id, .. }
        | Event::PaymentCompleted { room_id, .. }
        | Event::PaymentFailed { room_id, .. }
        | Event::PaymentRefunded { room_id, .. }
        | Event::BookingCancelled { room_id, .. }
        | Event::BookingCompleted { room_id, .. } => Some(*room_id),
        Event::RoomUpdated { id, .. } => Some(*id),
        Event::RoomCreated { .. } | Event::RoomDeleted { .. } => None,
    }
}
