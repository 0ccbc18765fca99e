//! Reservation core for a hotel property: a pure availability resolver
//! over half-open stay intervals, a guarded booking state machine
//! (`Pending` → `Confirmed` → `Completed`, with policy-gated
//! cancellation), and an event-sourced engine that keeps rooms in memory,
//! WAL-logs every accepted mutation and broadcasts changes per room.
//!
//! HTTP shaping, persistence beyond the WAL, email delivery and payment
//! gateways are the embedding application's business.

pub mod auth;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod wal;
