use super::*;
use crate::auth::{Actor, Role};
use crate::limits::{CANCEL_LEAD_TIME_MS, DAY_MS, MIN_VALID_TIMESTAMP_MS};

const H: Ms = 3_600_000; // 1 hour in ms

/// A fixed "today" far enough inside the valid timestamp range.
const NOW: Ms = MIN_VALID_TIMESTAMP_MS + 9_000 * DAY_MS;

fn day(n: Ms) -> Ms {
    NOW + n * DAY_MS
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("roomledger_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn new_engine(name: &str) -> Engine {
    let notify = Arc::new(NotifyHub::new());
    Engine::new(test_wal_path(name), notify).unwrap()
}

fn contact() -> GuestContact {
    GuestContact {
        name: "Ada Lovelace".into(),
        email: "ada@example.com".into(),
        phone: "+44-20-5550-0100".into(),
    }
}

async fn seed_room(engine: &Engine, capacity: u32) -> Ulid {
    let id = Ulid::new();
    engine
        .create_room(id, Some("Seaview".into()), capacity, 14_900, true)
        .await
        .unwrap();
    id
}

async fn seed_booking(engine: &Engine, room_id: Ulid, start: Ms, end: Ms, owner: Ulid) -> Ulid {
    let id = Ulid::new();
    engine
        .request_booking(id, room_id, Span::new(start, end), Some(owner), None, 2, 29_800)
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn create_and_list_rooms() {
    let engine = new_engine("create_list.wal");
    let id = seed_room(&engine, 2).await;

    let rooms = engine.list_rooms().await;
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].id, id);
    assert_eq!(rooms[0].capacity, 2);
    assert!(rooms[0].open);
}

#[tokio::test]
async fn duplicate_room_rejected() {
    let engine = new_engine("dup_room.wal");
    let id = seed_room(&engine, 2).await;
    let err = engine.create_room(id, None, 2, 10_000, true).await;
    assert!(matches!(err, Err(EngineError::AlreadyExists(_))));
}

#[tokio::test]
async fn zero_capacity_room_rejected() {
    let engine = new_engine("zero_cap.wal");
    let err = engine.create_room(Ulid::new(), None, 0, 10_000, true).await;
    assert!(matches!(err, Err(EngineError::LimitExceeded(_))));
}

#[tokio::test]
async fn booking_conflict_and_adjacency() {
    let engine = new_engine("conflict_adjacent.wal");
    let rid = seed_room(&engine, 4).await;
    seed_booking(&engine, rid, day(1), day(5), Ulid::new()).await;

    // Overlap rejected
    let err = engine
        .request_booking(
            Ulid::new(),
            rid,
            Span::new(day(4), day(6)),
            Some(Ulid::new()),
            None,
            2,
            29_800,
        )
        .await;
    assert!(matches!(err, Err(EngineError::Conflict(_))));

    // Checkout day reusable as check-in day
    engine
        .request_booking(
            Ulid::new(),
            rid,
            Span::new(day(5), day(8)),
            Some(Ulid::new()),
            None,
            2,
            44_700,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn inverted_range_rejected() {
    let engine = new_engine("inverted.wal");
    let rid = seed_room(&engine, 2).await;
    let err = engine
        .request_booking(
            Ulid::new(),
            rid,
            Span { start: day(5), end: day(2) },
            Some(Ulid::new()),
            None,
            1,
            0,
        )
        .await;
    assert!(matches!(err, Err(EngineError::InvalidDateRange)));
}

#[tokio::test]
async fn closed_room_rejects_new_bookings() {
    let engine = new_engine("closed_room.wal");
    let rid = Ulid::new();
    engine
        .create_room(rid, None, 2, 9_900, false)
        .await
        .unwrap();
    let err = engine
        .request_booking(
            Ulid::new(),
            rid,
            Span::new(day(1), day(2)),
            Some(Ulid::new()),
            None,
            1,
            9_900,
        )
        .await;
    assert!(matches!(err, Err(EngineError::RoomClosed(_))));
    assert!(!engine
        .is_room_available(rid, Span::new(day(1), day(2)))
        .await
        .unwrap());
}

#[tokio::test]
async fn guest_count_checked_against_capacity() {
    let engine = new_engine("capacity.wal");
    let rid = seed_room(&engine, 2).await;
    let err = engine
        .request_booking(
            Ulid::new(),
            rid,
            Span::new(day(1), day(2)),
            Some(Ulid::new()),
            None,
            3,
            9_900,
        )
        .await;
    assert!(matches!(err, Err(EngineError::CapacityExceeded(2))));
}

#[tokio::test]
async fn guest_booking_requires_contact() {
    let engine = new_engine("guest_contact.wal");
    let rid = seed_room(&engine, 2).await;

    let err = engine
        .request_booking(
            Ulid::new(),
            rid,
            Span::new(day(1), day(2)),
            None,
            None,
            1,
            9_900,
        )
        .await;
    assert!(matches!(err, Err(EngineError::MissingGuestContact)));

    // With full contact details the guest booking is accepted
    engine
        .request_booking(
            Ulid::new(),
            rid,
            Span::new(day(1), day(2)),
            None,
            Some(contact()),
            1,
            9_900,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn payment_completion_confirms_booking() {
    let engine = new_engine("confirm.wal");
    let rid = seed_room(&engine, 2).await;
    let owner = Ulid::new();
    let bid = seed_booking(&engine, rid, day(3), day(6), owner).await;

    assert_eq!(
        engine.get_booking(bid).await.unwrap().status,
        BookingStatus::Pending
    );

    engine
        .record_payment(Ulid::new(), bid, 29_800, PaymentMethod::Card)
        .await
        .unwrap();
    engine.complete_payment(bid).await.unwrap();

    assert_eq!(
        engine.get_booking(bid).await.unwrap().status,
        BookingStatus::Confirmed
    );
    assert_eq!(
        engine.get_payment(bid).await.unwrap().status,
        PaymentStatus::Completed
    );

    // Confirming twice is rejected: the booking is no longer pending
    let err = engine.complete_payment(bid).await;
    assert!(matches!(err, Err(EngineError::NotPending(_))));
}

#[tokio::test]
async fn one_payment_per_booking() {
    let engine = new_engine("one_payment.wal");
    let rid = seed_room(&engine, 2).await;
    let bid = seed_booking(&engine, rid, day(3), day(6), Ulid::new()).await;

    engine
        .record_payment(Ulid::new(), bid, 29_800, PaymentMethod::Card)
        .await
        .unwrap();
    let err = engine
        .record_payment(Ulid::new(), bid, 29_800, PaymentMethod::Cash)
        .await;
    assert!(matches!(err, Err(EngineError::AlreadyExists(_))));
}

#[tokio::test]
async fn failed_payment_leaves_booking_pending() {
    let engine = new_engine("failed_payment.wal");
    let rid = seed_room(&engine, 2).await;
    let bid = seed_booking(&engine, rid, day(3), day(6), Ulid::new()).await;

    engine
        .record_payment(Ulid::new(), bid, 29_800, PaymentMethod::Card)
        .await
        .unwrap();
    engine.fail_payment(bid).await.unwrap();

    assert_eq!(
        engine.get_booking(bid).await.unwrap().status,
        BookingStatus::Pending
    );
    assert_eq!(
        engine.get_payment(bid).await.unwrap().status,
        PaymentStatus::Failed
    );

    // A failed payment can't complete
    let err = engine.complete_payment(bid).await;
    assert!(matches!(err, Err(EngineError::PaymentNotPending(_))));
}

#[tokio::test]
async fn owner_cancel_respects_window_admin_bypasses() {
    let engine = new_engine("cancel_window.wal");
    let rid = seed_room(&engine, 2).await;
    let owner = Ulid::new();
    // Check-in 10 hours from NOW — inside the 24h window
    let bid = seed_booking(&engine, rid, NOW + 10 * H, NOW + 34 * H, owner).await;

    let err = engine.cancel_booking(bid, &Actor::user(owner), NOW).await;
    assert!(matches!(
        err,
        Err(EngineError::CancellationWindowExpired(_))
    ));
    assert_eq!(
        engine.get_booking(bid).await.unwrap().status,
        BookingStatus::Pending
    );

    engine
        .cancel_booking(bid, &Actor::staff(Role::Admin), NOW)
        .await
        .unwrap();
    assert_eq!(
        engine.get_booking(bid).await.unwrap().status,
        BookingStatus::Cancelled
    );

    // Re-cancelling is rejected and state is unchanged
    let err = engine
        .cancel_booking(bid, &Actor::staff(Role::Admin), NOW)
        .await;
    assert!(matches!(err, Err(EngineError::AlreadyCancelled(_))));
}

#[tokio::test]
async fn owner_cancel_outside_window_frees_dates() {
    let engine = new_engine("cancel_free.wal");
    let rid = seed_room(&engine, 2).await;
    let owner = Ulid::new();
    let span = Span::new(NOW + 2 * CANCEL_LEAD_TIME_MS, NOW + 2 * CANCEL_LEAD_TIME_MS + 3 * DAY_MS);
    let bid = seed_booking(&engine, rid, span.start, span.end, owner).await;

    assert!(!engine.is_room_available(rid, span).await.unwrap());
    engine
        .cancel_booking(bid, &Actor::user(owner), NOW)
        .await
        .unwrap();
    assert!(engine.is_room_available(rid, span).await.unwrap());
}

#[tokio::test]
async fn stranger_cannot_cancel() {
    let engine = new_engine("stranger.wal");
    let rid = seed_room(&engine, 2).await;
    let bid = seed_booking(&engine, rid, day(10), day(12), Ulid::new()).await;

    let err = engine
        .cancel_booking(bid, &Actor::user(Ulid::new()), NOW)
        .await;
    assert!(matches!(err, Err(EngineError::Unauthorized)));
}

#[tokio::test]
async fn complete_stay_is_staff_only_from_confirmed() {
    let engine = new_engine("complete_stay.wal");
    let rid = seed_room(&engine, 2).await;
    let owner = Ulid::new();
    let bid = seed_booking(&engine, rid, day(3), day(6), owner).await;

    // Not yet confirmed
    let err = engine.complete_booking(bid, &Actor::staff(Role::Staff)).await;
    assert!(matches!(err, Err(EngineError::NotConfirmed(_))));

    engine
        .record_payment(Ulid::new(), bid, 29_800, PaymentMethod::Transfer)
        .await
        .unwrap();
    engine.complete_payment(bid).await.unwrap();

    // Owner can't conclude their own stay
    let err = engine.complete_booking(bid, &Actor::user(owner)).await;
    assert!(matches!(err, Err(EngineError::Unauthorized)));

    engine
        .complete_booking(bid, &Actor::staff(Role::Staff))
        .await
        .unwrap();
    assert_eq!(
        engine.get_booking(bid).await.unwrap().status,
        BookingStatus::Completed
    );
}

#[tokio::test]
async fn refund_after_admin_cancellation() {
    let engine = new_engine("refund.wal");
    let rid = seed_room(&engine, 2).await;
    let bid = seed_booking(&engine, rid, day(3), day(6), Ulid::new()).await;

    engine
        .record_payment(Ulid::new(), bid, 29_800, PaymentMethod::Card)
        .await
        .unwrap();
    engine.complete_payment(bid).await.unwrap();
    engine
        .cancel_booking(bid, &Actor::staff(Role::Admin), NOW)
        .await
        .unwrap();

    // Cancellation did not refund by itself
    assert_eq!(
        engine.get_payment(bid).await.unwrap().status,
        PaymentStatus::Completed
    );

    engine
        .refund_payment(bid, &Actor::staff(Role::Admin))
        .await
        .unwrap();
    assert_eq!(
        engine.get_payment(bid).await.unwrap().status,
        PaymentStatus::Refunded
    );
}

#[tokio::test]
async fn delete_room_refused_with_active_bookings() {
    let engine = new_engine("delete_active.wal");
    let rid = seed_room(&engine, 2).await;
    let bid = seed_booking(&engine, rid, day(3), day(6), Ulid::new()).await;

    let err = engine.delete_room(rid).await;
    assert!(matches!(err, Err(EngineError::HasActiveBookings(_))));

    engine
        .cancel_booking(bid, &Actor::staff(Role::Admin), NOW)
        .await
        .unwrap();
    engine.delete_room(rid).await.unwrap();
    assert!(engine.get_room(&rid).is_none());
    assert!(engine.room_for_booking(&bid).is_none());
}

#[tokio::test]
async fn availability_queries_through_engine() {
    let engine = new_engine("avail_query.wal");
    let rid = seed_room(&engine, 2).await;
    seed_booking(&engine, rid, day(2), day(5), Ulid::new()).await;

    let free = engine
        .compute_availability(rid, day(0), day(10))
        .await
        .unwrap();
    assert_eq!(
        free,
        vec![Span::new(day(0), day(2)), Span::new(day(5), day(10))]
    );

    let grid = engine.calendar(rid, day(0), 7).await.unwrap();
    let avail: Vec<bool> = grid.iter().map(|d| d.available).collect();
    assert_eq!(avail, vec![true, true, false, false, false, true, true]);

    // Unknown room has no free spans
    let free = engine
        .compute_availability(Ulid::new(), day(0), day(10))
        .await
        .unwrap();
    assert!(free.is_empty());
}

#[tokio::test]
async fn query_windows_bounded_to_plausible_timestamps() {
    let engine = new_engine("query_bounds.wal");
    let rid = seed_room(&engine, 2).await;

    // A window_start near i64::MAX must be rejected, not overflow
    let err = engine.calendar(rid, Ms::MAX - DAY_MS, 3).await;
    assert!(matches!(err, Err(EngineError::LimitExceeded(_))));

    let err = engine.compute_availability(rid, Ms::MIN, day(1)).await;
    assert!(matches!(err, Err(EngineError::LimitExceeded(_))));

    let err = engine
        .compute_availability(rid, day(0), Ms::MAX - DAY_MS)
        .await;
    assert!(matches!(err, Err(EngineError::LimitExceeded(_))));
}

#[tokio::test]
async fn compaction_waits_for_in_flight_writers() {
    let engine = Arc::new(new_engine("compact_contended.wal"));
    let rid = seed_room(&engine, 2).await;

    // Hold the room's write lock, as a mutation does across its WAL append
    let room = engine.get_room(&rid).unwrap();
    let guard = room.write_owned().await;

    let eng = engine.clone();
    let compact = tokio::spawn(async move { eng.compact_wal().await });
    let eng = engine.clone();
    let list = tokio::spawn(async move { eng.list_rooms().await });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!compact.is_finished());
    assert!(!list.is_finished());

    drop(guard);
    compact.await.unwrap().unwrap();
    assert_eq!(list.await.unwrap().len(), 1);
}

#[tokio::test]
async fn confirmation_event_reaches_subscribers() {
    let engine = new_engine("notify_confirm.wal");
    let rid = seed_room(&engine, 2).await;
    let mut rx = engine.notify.subscribe(rid);
    let bid = seed_booking(&engine, rid, day(3), day(6), Ulid::new()).await;

    // Drain the request event
    let requested = rx.recv().await.unwrap();
    assert!(matches!(requested, Event::BookingRequested { .. }));

    engine
        .record_payment(Ulid::new(), bid, 29_800, PaymentMethod::Card)
        .await
        .unwrap();
    assert!(matches!(
        rx.recv().await.unwrap(),
        Event::PaymentRecorded { .. }
    ));

    engine.complete_payment(bid).await.unwrap();
    let confirmed = rx.recv().await.unwrap();
    assert_eq!(
        confirmed,
        Event::PaymentCompleted {
            booking_id: bid,
            room_id: rid
        }
    );
}

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");
    let rid = Ulid::new();
    let owner = Ulid::new();
    let bid = Ulid::new();

    {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        engine
            .create_room(rid, Some("Garden 3".into()), 2, 11_000, true)
            .await
            .unwrap();
        engine
            .request_booking(
                bid,
                rid,
                Span::new(day(3), day(6)),
                Some(owner),
                None,
                2,
                33_000,
            )
            .await
            .unwrap();
        engine
            .record_payment(Ulid::new(), bid, 33_000, PaymentMethod::Card)
            .await
            .unwrap();
        engine.complete_payment(bid).await.unwrap();
    }

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    let info = engine.get_booking(bid).await.unwrap();
    assert_eq!(info.status, BookingStatus::Confirmed);
    assert_eq!(info.room_id, rid);
    assert!(!engine
        .is_room_available(rid, Span::new(day(4), day(5)))
        .await
        .unwrap());
}

#[tokio::test]
async fn deleted_room_bookings_forgotten_after_restart() {
    let path = test_wal_path("restart_deleted.wal");
    let rid = Ulid::new();
    let bid = Ulid::new();

    {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        engine.create_room(rid, None, 2, 9_900, true).await.unwrap();
        engine
            .request_booking(
                bid,
                rid,
                Span::new(day(1), day(2)),
                Some(Ulid::new()),
                None,
                1,
                9_900,
            )
            .await
            .unwrap();
        engine
            .cancel_booking(bid, &Actor::staff(Role::Admin), NOW)
            .await
            .unwrap();
        engine.delete_room(rid).await.unwrap();
        assert!(engine.room_for_booking(&bid).is_none());
    }

    // Replay must forget the deleted room's bookings too
    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    assert!(engine.room_for_booking(&bid).is_none());
    let err = engine.get_booking(bid).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(id) if id == bid));
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compact_state.wal");
    let rid = Ulid::new();
    let keep = Ulid::new();

    {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        engine.create_room(rid, None, 2, 9_900, true).await.unwrap();

        // Churn: book and cancel repeatedly, then keep one confirmed booking
        for i in 0..5 {
            let tmp = Ulid::new();
            engine
                .request_booking(
                    tmp,
                    rid,
                    Span::new(day(i), day(i + 1)),
                    Some(Ulid::new()),
                    None,
                    1,
                    9_900,
                )
                .await
                .unwrap();
            engine
                .cancel_booking(tmp, &Actor::staff(Role::Admin), NOW)
                .await
                .unwrap();
        }
        engine
            .request_booking(
                keep,
                rid,
                Span::new(day(10), day(12)),
                Some(Ulid::new()),
                None,
                1,
                19_800,
            )
            .await
            .unwrap();
        engine
            .record_payment(Ulid::new(), keep, 19_800, PaymentMethod::Card)
            .await
            .unwrap();
        engine.complete_payment(keep).await.unwrap();
        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    let info = engine.get_booking(keep).await.unwrap();
    assert_eq!(info.status, BookingStatus::Confirmed);
    assert_eq!(
        engine.get_payment(keep).await.unwrap().status,
        PaymentStatus::Completed
    );
    // Cancelled churn kept its status through compaction too
    let all = engine.get_bookings(rid).await.unwrap();
    assert_eq!(all.len(), 6);
}
