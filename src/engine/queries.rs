use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{day_grid, free_within, is_available};
use super::conflict::{check_timestamp_bounds, validate_span};
use super::{Engine, EngineError};

impl Engine {
    /// Free spans of a room within `[query_start, query_end)`.
    /// An unknown room yields no spans.
    pub async fn compute_availability(
        &self,
        room_id: Ulid,
        query_start: Ms,
        query_end: Ms,
    ) -> Result<Vec<Span>, EngineError> {
        if query_start >= query_end {
            return Err(EngineError::InvalidDateRange);
        }
        let query = Span::new(query_start, query_end);
        check_timestamp_bounds(&query)?;
        if query.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let room = match self.get_room(&room_id) {
            Some(room) => room,
            None => return Ok(vec![]),
        };
        let guard = room.read().await;
        Ok(free_within(&guard, &query))
    }

    /// Boolean availability probe for a candidate stay. A closed room is
    /// never available, independent of its bookings.
    pub async fn is_room_available(
        &self,
        room_id: Ulid,
        span: Span,
    ) -> Result<bool, EngineError> {
        validate_span(&span)?;
        let room = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = room.read().await;
        Ok(guard.open && is_available(&span, guard.overlapping(&span)))
    }

    /// Per-day calendar for rendering a month (or any day-aligned window).
    /// A closed room shows every day as unavailable.
    pub async fn calendar(
        &self,
        room_id: Ulid,
        window_start: Ms,
        days: u32,
    ) -> Result<Vec<DayAvailability>, EngineError> {
        if days == 0 || days > MAX_CALENDAR_DAYS {
            return Err(EngineError::LimitExceeded("calendar window too wide"));
        }
        check_timestamp_bounds(&Span {
            start: window_start,
            end: window_start.saturating_add(days as Ms * DAY_MS),
        })?;
        let room = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = room.read().await;
        let mut grid = day_grid(&guard, window_start, days);
        if !guard.open {
            for cell in &mut grid {
                cell.available = false;
            }
        }
        Ok(grid)
    }

    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let rooms: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(rooms.len());
        for room in rooms {
            let guard = room.read().await;
            out.push(RoomInfo {
                id: guard.id,
                name: guard.name.clone(),
                capacity: guard.capacity,
                rate_cents: guard.rate_cents,
                open: guard.open,
            });
        }
        out
    }

    pub async fn get_bookings(&self, room_id: Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        let room = match self.get_room(&room_id) {
            Some(room) => room,
            None => return Ok(vec![]),
        };
        let guard = room.read().await;
        Ok(guard
            .bookings
            .iter()
            .map(|b| BookingInfo {
                id: b.id,
                room_id,
                start: b.span.start,
                end: b.span.end,
                status: b.status,
                user_id: b.user_id,
                guests: b.guests,
                total_cents: b.total_cents,
            })
            .collect())
    }

    pub async fn get_booking(&self, booking_id: Ulid) -> Result<BookingInfo, EngineError> {
        let room_id = self
            .room_for_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let room = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = room.read().await;
        let b = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        Ok(BookingInfo {
            id: b.id,
            room_id,
            start: b.span.start,
            end: b.span.end,
            status: b.status,
            user_id: b.user_id,
            guests: b.guests,
            total_cents: b.total_cents,
        })
    }

    pub async fn get_payment(&self, booking_id: Ulid) -> Result<PaymentInfo, EngineError> {
        let room_id = self
            .room_for_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let room = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = room.read().await;
        let b = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let p = b
            .payment
            .as_ref()
            .ok_or(EngineError::NotFound(booking_id))?;
        Ok(PaymentInfo {
            id: p.id,
            booking_id,
            amount_cents: p.amount_cents,
            method: p.method,
            status: p.status,
        })
    }
}
