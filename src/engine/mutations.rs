use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::auth::Actor;
use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_span};
use super::{policy, Engine, EngineError, WalCommand};

fn validate_room_fields(
    name: &Option<String>,
    capacity: u32,
    rate_cents: i64,
) -> Result<(), EngineError> {
    if let Some(n) = name
        && n.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("room name too long"));
        }
    if capacity == 0 {
        return Err(EngineError::LimitExceeded("room capacity must be at least 1"));
    }
    if rate_cents < 0 {
        return Err(EngineError::LimitExceeded("nightly rate must be non-negative"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_room(
        &self,
        id: Ulid,
        name: Option<String>,
        capacity: u32,
        rate_cents: i64,
        open: bool,
    ) -> Result<(), EngineError> {
        if self.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        validate_room_fields(&name, capacity, rate_cents)?;
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::RoomCreated { id, name: name.clone(), capacity, rate_cents, open };
        self.wal_append(&event).await?;
        let room = RoomState::new(id, name, capacity, rate_cents, open);
        self.rooms.insert(id, Arc::new(RwLock::new(room)));
        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(self.rooms.len() as f64);
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn update_room(
        &self,
        id: Ulid,
        name: Option<String>,
        capacity: u32,
        rate_cents: i64,
        open: bool,
    ) -> Result<(), EngineError> {
        validate_room_fields(&name, capacity, rate_cents)?;
        let room = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = room.write().await;

        let event = Event::RoomUpdated { id, name, capacity, rate_cents, open };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Delete a room. Refused while any booking on it is still pending or
    /// confirmed; cancelled and completed history goes with the room.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let room = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let guard = room.read().await;
        if guard
            .bookings
            .iter()
            .any(|b| !b.is_terminal())
        {
            return Err(EngineError::HasActiveBookings(id));
        }
        let booking_ids: Vec<Ulid> = guard.bookings.iter().map(|b| b.id).collect();
        drop(guard);

        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        self.rooms.remove(&id);
        for bid in booking_ids {
            self.booking_to_room.remove(&bid);
        }
        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(self.rooms.len() as f64);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        Ok(())
    }

    /// Create a booking in `Pending` state after the availability check.
    ///
    /// The conflict check and the insert run under the room's write lock,
    /// so two concurrent requests for the same dates serialize here and
    /// the loser gets `Conflict`.
    #[allow(clippy::too_many_arguments)]
    pub async fn request_booking(
        &self,
        id: Ulid,
        room_id: Ulid,
        span: Span,
        user_id: Option<Ulid>,
        guest: Option<GuestContact>,
        guests: u32,
        total_cents: i64,
    ) -> Result<(), EngineError> {
        validate_span(&span)?;
        if guests == 0 || guests > MAX_GUESTS_PER_BOOKING {
            return Err(EngineError::LimitExceeded("invalid guest count"));
        }
        if total_cents < 0 {
            return Err(EngineError::LimitExceeded("total must be non-negative"));
        }
        if user_id.is_none() {
            match &guest {
                Some(c) if !c.name.is_empty() && !c.email.is_empty() && !c.phone.is_empty() => {}
                _ => return Err(EngineError::MissingGuestContact),
            }
        }
        if self.booking_to_room.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let room = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let mut guard = room.write().await;
        if !guard.open {
            return Err(EngineError::RoomClosed(room_id));
        }
        if guests > guard.capacity {
            return Err(EngineError::CapacityExceeded(guard.capacity));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }

        if let Err(e) = check_no_conflict(&guard, &span) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let event = Event::BookingRequested {
            id,
            room_id,
            span,
            user_id,
            guest,
            guests,
            total_cents,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_TOTAL).increment(1);
        info!("booking {id} pending on room {room_id}");
        Ok(())
    }

    /// Attach a pending payment to a booking. One payment per booking.
    pub async fn record_payment(
        &self,
        payment_id: Ulid,
        booking_id: Ulid,
        amount_cents: i64,
        method: PaymentMethod,
    ) -> Result<(), EngineError> {
        if amount_cents < 0 {
            return Err(EngineError::LimitExceeded("amount must be non-negative"));
        }
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        policy::check_record_payment(booking)?;

        let event = Event::PaymentRecorded {
            booking_id,
            room_id,
            payment_id,
            amount_cents,
            method,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Payment completed at the gateway: the booking moves to `Confirmed`
    /// and subscribers see the event (confirmation notifications hang off
    /// the broadcast, not this call).
    pub async fn complete_payment(&self, booking_id: Ulid) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        policy::check_payment_completion(booking)?;

        let event = Event::PaymentCompleted { booking_id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::CONFIRMATIONS_TOTAL).increment(1);
        info!("booking {booking_id} confirmed");
        Ok(())
    }

    /// Gateway reported failure. The booking stays `Pending`; the reaper
    /// will release the dates if no fresh payment completes in time.
    pub async fn fail_payment(&self, booking_id: Ulid) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        policy::check_payment_failure(booking)?;

        let event = Event::PaymentFailed { booking_id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Staff-marked refund of a completed payment. Independent of booking
    /// cancellation, which never refunds by itself.
    pub async fn refund_payment(
        &self,
        booking_id: Ulid,
        actor: &Actor,
    ) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        policy::check_refund(booking, actor)?;

        let event = Event::PaymentRefunded { booking_id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Cancel a booking, subject to the authorization and lead-time
    /// guards. `now` is the caller's clock.
    pub async fn cancel_booking(
        &self,
        booking_id: Ulid,
        actor: &Actor,
        now: Ms,
    ) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        policy::check_cancel(booking, actor, now)?;

        let event = Event::BookingCancelled { booking_id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::CANCELLATIONS_TOTAL).increment(1);
        info!("booking {booking_id} cancelled");
        Ok(())
    }

    /// Administrative stay-conclusion: `Confirmed` → `Completed`.
    pub async fn complete_booking(
        &self,
        booking_id: Ulid,
        actor: &Actor,
    ) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        policy::check_complete(booking, actor)?;

        let event = Event::BookingCompleted { booking_id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Reaper-only cancellation of an unpaid `Pending` booking. Staleness
    /// is re-checked under the room write lock, so a payment completing
    /// between the scan and this call leaves the booking confirmed.
    pub async fn reap_stale_booking(&self, booking_id: Ulid) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        policy::check_reap(booking)?;

        let event = Event::BookingCancelled { booking_id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::CANCELLATIONS_TOTAL).increment(1);
        info!("booking {booking_id} reaped");
        Ok(())
    }

    /// Pending bookings whose payment has not completed within the TTL.
    /// Creation time comes from the ULID's embedded timestamp.
    pub fn collect_stale_pending(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        let mut stale = Vec::new();
        for entry in self.rooms.iter() {
            let room = entry.value().clone();
            if let Ok(guard) = room.try_read() {
                for b in &guard.bookings {
                    if b.status == BookingStatus::Pending
                        && !matches!(
                            &b.payment,
                            Some(p) if p.status == PaymentStatus::Completed
                        )
                        && now.saturating_sub(b.id.timestamp_ms() as Ms) > PENDING_PAYMENT_TTL_MS
                    {
                        stale.push((b.id, guard.id));
                    }
                }
            }
        }
        stale
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let room_ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        for id in room_ids {
            let room = match self.get_room(&id) {
                Some(r) => r,
                None => continue,
            };
            // Mutations hold room write locks across WAL appends, so
            // compaction must wait its turn rather than demand an
            // uncontended read.
            let guard = room.read().await;

            events.push(Event::RoomCreated {
                id: guard.id,
                name: guard.name.clone(),
                capacity: guard.capacity,
                rate_cents: guard.rate_cents,
                open: guard.open,
            });

            for b in &guard.bookings {
                events.push(Event::BookingRequested {
                    id: b.id,
                    room_id: guard.id,
                    span: b.span,
                    user_id: b.user_id,
                    guest: b.guest.clone(),
                    guests: b.guests,
                    total_cents: b.total_cents,
                });
                if let Some(p) = &b.payment {
                    events.push(Event::PaymentRecorded {
                        booking_id: b.id,
                        room_id: guard.id,
                        payment_id: p.id,
                        amount_cents: p.amount_cents,
                        method: p.method,
                    });
                    match p.status {
                        PaymentStatus::Completed => events.push(Event::PaymentCompleted {
                            booking_id: b.id,
                            room_id: guard.id,
                        }),
                        PaymentStatus::Failed => events.push(Event::PaymentFailed {
                            booking_id: b.id,
                            room_id: guard.id,
                        }),
                        PaymentStatus::Refunded => {
                            events.push(Event::PaymentCompleted {
                                booking_id: b.id,
                                room_id: guard.id,
                            });
                            events.push(Event::PaymentRefunded {
                                booking_id: b.id,
                                room_id: guard.id,
                            });
                        }
                        PaymentStatus::Pending => {}
                    }
                }
                // Payment events may have confirmed the booking; replay the
                // final status on top.
                match b.status {
                    BookingStatus::Cancelled => events.push(Event::BookingCancelled {
                        booking_id: b.id,
                        room_id: guard.id,
                    }),
                    BookingStatus::Completed => events.push(Event::BookingCompleted {
                        booking_id: b.id,
                        room_id: guard.id,
                    }),
                    BookingStatus::Pending | BookingStatus::Confirmed => {}
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
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
