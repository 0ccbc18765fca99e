use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Requested dates overlap an existing non-cancelled booking.
    Conflict(Ulid),
    /// Check-out is not strictly after check-in.
    InvalidDateRange,
    /// Room is administratively closed to new bookings.
    RoomClosed(Ulid),
    /// Guest count exceeds the room's capacity.
    CapacityExceeded(u32),
    /// Booking without a user account needs guest contact details.
    MissingGuestContact,
    /// Actor lacks rights to mutate the booking.
    Unauthorized,
    AlreadyCancelled(Ulid),
    AlreadyCompleted(Ulid),
    /// Transition requires a `Pending` booking.
    NotPending(Ulid),
    /// Transition requires a `Confirmed` booking.
    NotConfirmed(Ulid),
    /// Payment completion requires a `Pending` payment.
    PaymentNotPending(Ulid),
    /// Refund requires a `Completed` payment.
    PaymentNotCompleted(Ulid),
    /// Owner-initiated cancellation inside the 24h window.
    CancellationWindowExpired(Ulid),
    /// Room still has pending or confirmed bookings.
    HasActiveBookings(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            EngineError::InvalidDateRange => {
                write!(f, "invalid date range: check-out must be after check-in")
            }
            EngineError::RoomClosed(id) => write!(f, "room {id} is closed to new bookings"),
            EngineError::CapacityExceeded(cap) => {
                write!(f, "guest count exceeds room capacity {cap}")
            }
            EngineError::MissingGuestContact => {
                write!(f, "guest booking requires contact name, email and phone")
            }
            EngineError::Unauthorized => write!(f, "actor may not modify this booking"),
            EngineError::AlreadyCancelled(id) => write!(f, "booking {id} is already cancelled"),
            EngineError::AlreadyCompleted(id) => write!(f, "booking {id} is already completed"),
            EngineError::NotPending(id) => write!(f, "booking {id} is not pending"),
            EngineError::NotConfirmed(id) => write!(f, "booking {id} is not confirmed"),
            EngineError::PaymentNotPending(id) => {
                write!(f, "payment for booking {id} is not pending")
            }
            EngineError::PaymentNotCompleted(id) => {
                write!(f, "payment for booking {id} is not completed")
            }
            EngineError::CancellationWindowExpired(id) => {
                write!(f, "booking {id} is within 24h of check-in; cannot cancel")
            }
            EngineError::HasActiveBookings(id) => {
                write!(f, "cannot delete room {id}: has active bookings")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
