use crate::model::*;

use super::EngineError;

/// Entry-point validation for a requested stay. The pure availability
/// predicate assumes a normalized span; inverted or absurd ranges are
/// rejected here before any conflict check runs.
pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.start >= span.end {
        return Err(EngineError::InvalidDateRange);
    }
    check_timestamp_bounds(span)?;
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// Both endpoints must be plausible unix-millisecond instants. Query
/// windows share this with booking spans; keeping timestamps bounded
/// also keeps day-grid arithmetic clear of overflow.
pub(crate) fn check_timestamp_bounds(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// Reject `span` if it overlaps any non-cancelled booking on the room.
/// Errors carry the id of the first conflicting booking found.
pub(crate) fn check_no_conflict(room: &RoomState, span: &Span) -> Result<(), EngineError> {
    for b in room.overlapping(span) {
        if b.blocks_dates() {
            return Err(EngineError::Conflict(b.id));
        }
    }
    Ok(())
}
