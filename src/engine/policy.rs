use crate::auth::{can_manage, Actor};
use crate::limits::CANCEL_LEAD_TIME_MS;
use crate::model::*;

use super::EngineError;

// ── Booking State Machine guards ──────────────────────────────────
//
// Pure checks, no mutation. The engine evaluates the guard, writes the
// event, and applies the status change; a failed guard leaves the
// booking untouched.

/// Authorization guard, evaluated before any transition-specific guard.
pub(crate) fn authorize(actor: &Actor, booking: &Booking) -> Result<(), EngineError> {
    if can_manage(actor, booking) {
        Ok(())
    } else {
        Err(EngineError::Unauthorized)
    }
}

fn check_not_terminal(booking: &Booking) -> Result<(), EngineError> {
    match booking.status {
        BookingStatus::Cancelled => Err(EngineError::AlreadyCancelled(booking.id)),
        BookingStatus::Completed => Err(EngineError::AlreadyCompleted(booking.id)),
        _ => Ok(()),
    }
}

/// Cancellation guard: authorization, terminal-state, then the 24h
/// lead-time window for unprivileged owners. Privileged actors bypass
/// the window but not the terminal-state check.
pub(crate) fn check_cancel(booking: &Booking, actor: &Actor, now: Ms) -> Result<(), EngineError> {
    authorize(actor, booking)?;
    check_not_terminal(booking)?;
    if !actor.role.is_privileged() && booking.span.start - now < CANCEL_LEAD_TIME_MS {
        return Err(EngineError::CancellationWindowExpired(booking.id));
    }
    Ok(())
}

/// Reaper guard: only an unpaid `Pending` booking may be cancelled on the
/// engine's own authority. A payment completing after the stale scan
/// confirms the booking and wins the race.
pub(crate) fn check_reap(booking: &Booking) -> Result<(), EngineError> {
    if booking.status != BookingStatus::Pending {
        return Err(EngineError::NotPending(booking.id));
    }
    if let Some(p) = &booking.payment
        && p.status == PaymentStatus::Completed {
            return Err(EngineError::PaymentNotPending(booking.id));
        }
    Ok(())
}

/// A payment may only be attached to a live booking that has none yet.
pub(crate) fn check_record_payment(booking: &Booking) -> Result<(), EngineError> {
    check_not_terminal(booking)?;
    if booking.payment.is_some() {
        return Err(EngineError::AlreadyExists(booking.id));
    }
    Ok(())
}

/// Payment completion confirms the booking: requires a `Pending` booking
/// carrying a `Pending` payment.
pub(crate) fn check_payment_completion(booking: &Booking) -> Result<(), EngineError> {
    if booking.status != BookingStatus::Pending {
        return Err(EngineError::NotPending(booking.id));
    }
    match &booking.payment {
        None => Err(EngineError::NotFound(booking.id)),
        Some(p) if p.status != PaymentStatus::Pending => {
            Err(EngineError::PaymentNotPending(booking.id))
        }
        Some(_) => Ok(()),
    }
}

/// A failed gateway result may land on any booking whose payment is still
/// `Pending` (the booking itself may already have been reaped).
pub(crate) fn check_payment_failure(booking: &Booking) -> Result<(), EngineError> {
    match &booking.payment {
        None => Err(EngineError::NotFound(booking.id)),
        Some(p) if p.status != PaymentStatus::Pending => {
            Err(EngineError::PaymentNotPending(booking.id))
        }
        Some(_) => Ok(()),
    }
}

/// Refunds are staff-marked and require a completed payment. Cancellation
/// never refunds automatically.
pub(crate) fn check_refund(booking: &Booking, actor: &Actor) -> Result<(), EngineError> {
    if !actor.role.is_privileged() {
        return Err(EngineError::Unauthorized);
    }
    match &booking.payment {
        None => Err(EngineError::NotFound(booking.id)),
        Some(p) if p.status != PaymentStatus::Completed => {
            Err(EngineError::PaymentNotCompleted(booking.id))
        }
        Some(_) => Ok(()),
    }
}

/// Stay conclusion is an administrative transition from `Confirmed`.
pub(crate) fn check_complete(booking: &Booking, actor: &Actor) -> Result<(), EngineError> {
    if !actor.role.is_privileged() {
        return Err(EngineError::Unauthorized);
    }
    match booking.status {
        BookingStatus::Confirmed => Ok(()),
        BookingStatus::Cancelled => Err(EngineError::AlreadyCancelled(booking.id)),
        BookingStatus::Completed => Err(EngineError::AlreadyCompleted(booking.id)),
        BookingStatus::Pending => Err(EngineError::NotConfirmed(booking.id)),
    }
}
