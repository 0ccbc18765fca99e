use crate::model::Ms;

/// Hard caps protecting the in-memory store from unbounded growth.
pub const MAX_ROOMS: usize = 100_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_GUESTS_PER_BOOKING: u32 = 64;

/// Timestamps must be plausible unix milliseconds: 2000-01-01 .. 2100-01-01.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single stay may not exceed one year.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * DAY_MS;

/// Availability queries are capped at a two-year window.
pub const MAX_QUERY_WINDOW_MS: Ms = 2 * 366 * DAY_MS;
pub const MAX_CALENDAR_DAYS: u32 = 732;

pub const DAY_MS: Ms = 86_400_000;

/// Minimum lead time before check-in for an owner-initiated cancellation.
/// Staff and admins bypass this.
pub const CANCEL_LEAD_TIME_MS: Ms = 24 * 3_600_000;

/// Pending bookings whose payment has not completed within this window are
/// cancelled by the reaper, releasing the dates.
pub const PENDING_PAYMENT_TTL_MS: Ms = 30 * 60_000;
