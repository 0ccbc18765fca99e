use crate::limits::DAY_MS;
use crate::model::*;

// ── Availability Resolver ─────────────────────────────────────────

/// Core availability predicate: is the room free for `requested`?
///
/// Cancelled bookings never count; every other status occupies its span.
/// Adjacent stays (checkout == next check-in) do not conflict because
/// spans are half-open. Pure function of its inputs.
///
/// Callers validate `requested.start < requested.end` first
/// (`validate_span` → `InvalidDateRange`); behavior on an inverted span
/// is unspecified.
pub fn is_available<'a>(
    requested: &Span,
    bookings: impl IntoIterator<Item = &'a Booking>,
) -> bool {
    bookings
        .into_iter()
        .filter(|b| b.blocks_dates())
        .all(|b| !b.span.overlaps(requested))
}

/// Occupied spans of a room within `query`: non-cancelled booking spans,
/// clamped to the window, sorted and merged into disjoint intervals.
pub fn occupied_within(room: &RoomState, query: &Span) -> Vec<Span> {
    let mut occupied: Vec<Span> = room
        .overlapping(query)
        .filter(|b| b.blocks_dates())
        .map(|b| {
            Span::new(
                b.span.start.max(query.start),
                b.span.end.min(query.end),
            )
        })
        .collect();
    occupied.sort_by_key(|s| s.start);
    merge_overlapping(&occupied)
}

/// Free spans of a room within `query`: the window minus occupied spans.
pub fn free_within(room: &RoomState, query: &Span) -> Vec<Span> {
    let occupied = occupied_within(room, query);
    if occupied.is_empty() {
        return vec![*query];
    }
    subtract_intervals(&[*query], &occupied)
}

/// Per-day calendar grid starting at `window_start` (expected to be a day
/// boundary in the caller's timezone). A day is unavailable iff it
/// intersects any non-cancelled booking.
pub fn day_grid(room: &RoomState, window_start: Ms, days: u32) -> Vec<DayAvailability> {
    let window = Span::new(window_start, window_start + days as Ms * DAY_MS);
    let occupied = occupied_within(room, &window);

    let mut grid = Vec::with_capacity(days as usize);
    let mut oi = 0;
    for d in 0..days as Ms {
        let day = Span::new(window_start + d * DAY_MS, window_start + (d + 1) * DAY_MS);
        while oi < occupied.len() && occupied[oi].end <= day.start {
            oi += 1;
        }
        let available = oi >= occupied.len() || !occupied[oi].overlaps(&day);
        grid.push(DayAvailability {
            day_start: day.start,
            available,
        });
    }
    grid
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Subtract sorted disjoint `to_remove` intervals from sorted `base`.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
