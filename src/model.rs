use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open stay interval `[check_in, check_out)`.
///
/// The check-out instant is excluded, so a stay ending at noon and a stay
/// starting at noon on the same room do not conflict.
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

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Booking lifecycle. `Cancelled` and `Completed` are terminal;
/// `Confirmed` can still move to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Card,
    Cash,
    Transfer,
}

/// Contact details for a booking made without a registered user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// One-to-one payment attached to a booking. Created only after the
/// booking exists; its completion confirms the booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Ulid,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
}

/// A booking on a room. Cancelled bookings stay in the room's list (for
/// history and payment lookup) but never occupy dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub span: Span,
    pub status: BookingStatus,
    /// None for guest bookings; `guest` carries the contact instead.
    pub user_id: Option<Ulid>,
    pub guest: Option<GuestContact>,
    pub guests: u32,
    pub total_cents: i64,
    pub payment: Option<Payment>,
}

impl Booking {
    /// True while the booking occupies its dates for conflict purposes.
    pub fn blocks_dates(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            BookingStatus::Cancelled | BookingStatus::Completed
        )
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: Option<String>,
    /// Max guests per booking (>= 1).
    pub capacity: u32,
    /// Nightly rate in integer cents.
    pub rate_cents: i64,
    /// Administrative availability override. A closed room accepts no new
    /// bookings; existing bookings are untouched.
    pub open: bool,
    /// All bookings (any status), sorted by `span.start`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(id: Ulid, name: Option<String>, capacity: u32, rate_cents: i64, open: bool) -> Self {
        Self {
            id,
            name,
            capacity,
            rate_cents,
            open,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Return only bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format and
/// the notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        name: Option<String>,
        capacity: u32,
        rate_cents: i64,
        open: bool,
    },
    RoomUpdated {
        id: Ulid,
        name: Option<String>,
        capacity: u32,
        rate_cents: i64,
        open: bool,
    },
    RoomDeleted {
        id: Ulid,
    },
    /// Availability confirmed; booking enters `Pending`.
    BookingRequested {
        id: Ulid,
        room_id: Ulid,
        span: Span,
        user_id: Option<Ulid>,
        guest: Option<GuestContact>,
        guests: u32,
        total_cents: i64,
    },
    PaymentRecorded {
        booking_id: Ulid,
        room_id: Ulid,
        payment_id: Ulid,
        amount_cents: i64,
        method: PaymentMethod,
    },
    /// Payment completed; booking moves `Pending` → `Confirmed`.
    PaymentCompleted {
        booking_id: Ulid,
        room_id: Ulid,
    },
    PaymentFailed {
        booking_id: Ulid,
        room_id: Ulid,
    },
    PaymentRefunded {
        booking_id: Ulid,
        room_id: Ulid,
    },
    BookingCancelled {
        booking_id: Ulid,
        room_id: Ulid,
    },
    /// Stay concluded; booking moves `Confirmed` → `Completed`.
    BookingCompleted {
        booking_id: Ulid,
        room_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: Option<String>,
    pub capacity: u32,
    pub rate_cents: i64,
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub status: BookingStatus,
    pub user_id: Option<Ulid>,
    pub guests: u32,
    pub total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInfo {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
}

/// Per-day calendar cell: the day `[day_start, day_start + DAY_MS)` and
/// whether it is free of non-cancelled bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayAvailability {
    pub day_start: Ms,
    pub available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(start: Ms, end: Ms, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            span: Span::new(start, end),
            status,
            user_id: Some(Ulid::new()),
            guest: None,
            guests: 2,
            total_cents: 10_000,
            payment: None,
        }
    }

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
    }

    #[test]
    fn booking_ordering() {
        let mut room = RoomState::new(Ulid::new(), None, 2, 9_900, true);
        room.insert_booking(booking(300, 400, BookingStatus::Confirmed));
        room.insert_booking(booking(100, 200, BookingStatus::Pending));
        room.insert_booking(booking(200, 300, BookingStatus::Cancelled));
        assert_eq!(room.bookings[0].span.start, 100);
        assert_eq!(room.bookings[1].span.start, 200);
        assert_eq!(room.bookings[2].span.start, 300);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut room = RoomState::new(Ulid::new(), None, 2, 9_900, true);
        room.insert_booking(booking(100, 200, BookingStatus::Confirmed));
        room.insert_booking(booking(450, 600, BookingStatus::Confirmed));
        room.insert_booking(booking(1000, 1100, BookingStatus::Confirmed));

        let query = Span::new(500, 800);
        let hits: Vec<_> = room.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        // Booking ending exactly at query.start is NOT overlapping (half-open)
        let mut room = RoomState::new(Ulid::new(), None, 2, 9_900, true);
        room.insert_booking(booking(100, 200, BookingStatus::Confirmed));
        let query = Span::new(200, 300);
        assert!(room.overlapping(&query).next().is_none());
    }

    #[test]
    fn blocks_dates_excludes_cancelled_only() {
        assert!(booking(0, 100, BookingStatus::Pending).blocks_dates());
        assert!(booking(0, 100, BookingStatus::Confirmed).blocks_dates());
        assert!(booking(0, 100, BookingStatus::Completed).blocks_dates());
        assert!(!booking(0, 100, BookingStatus::Cancelled).blocks_dates());
    }

    #[test]
    fn terminal_states() {
        assert!(booking(0, 100, BookingStatus::Cancelled).is_terminal());
        assert!(booking(0, 100, BookingStatus::Completed).is_terminal());
        assert!(!booking(0, 100, BookingStatus::Pending).is_terminal());
        assert!(!booking(0, 100, BookingStatus::Confirmed).is_terminal());
    }

    #[test]
    fn booking_lookup_by_id() {
        let mut room = RoomState::new(Ulid::new(), None, 2, 9_900, true);
        let b = booking(100, 200, BookingStatus::Pending);
        let id = b.id;
        room.insert_booking(b);
        assert!(room.booking(id).is_some());
        assert!(room.booking(Ulid::new()).is_none());

        room.booking_mut(id).unwrap().status = BookingStatus::Confirmed;
        assert_eq!(room.booking(id).unwrap().status, BookingStatus::Confirmed);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingRequested {
            id: Ulid::new(),
            room_id: Ulid::new(),
            span: Span::new(1000, 2000),
            user_id: None,
            guest: Some(GuestContact {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                phone: "+1-555-0100".into(),
            }),
            guests: 2,
            total_cents: 19_800,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
