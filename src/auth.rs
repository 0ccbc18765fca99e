use ulid::Ulid;

use crate::model::Booking;

/// Privilege levels. `Staff` and above bypass the cancellation window and
/// may complete stays; `Customer` may only touch their own bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Customer,
    Staff,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn is_privileged(&self) -> bool {
        *self >= Role::Staff
    }
}

/// Whoever is asking for a transition. Guest callers (no account) carry
/// only an email.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Option<Ulid>,
    pub email: Option<String>,
    pub role: Role,
}

impl Actor {
    pub fn user(user_id: Ulid) -> Self {
        Self {
            user_id: Some(user_id),
            email: None,
            role: Role::Customer,
        }
    }

    pub fn guest(email: impl Into<String>) -> Self {
        Self {
            user_id: None,
            email: Some(email.into()),
            role: Role::Customer,
        }
    }

    pub fn staff(role: Role) -> Self {
        Self {
            user_id: None,
            email: None,
            role,
        }
    }

    /// Internal actor for engine-initiated transitions.
    pub fn system() -> Self {
        Self::staff(Role::SuperAdmin)
    }
}

/// Single capability check for booking mutations: ownership, exact
/// guest-email match, or privilege. Every transition guard goes through
/// here rather than re-deriving role logic per call site.
pub fn can_manage(actor: &Actor, booking: &Booking) -> bool {
    if actor.role.is_privileged() {
        return true;
    }
    if let Some(owner) = booking.user_id
        && actor.user_id == Some(owner) {
            return true;
        }
    if booking.user_id.is_none()
        && let (Some(contact), Some(email)) = (&booking.guest, &actor.email) {
            // Exact, case-sensitive match.
            return &contact.email == email;
        }
    false
}
