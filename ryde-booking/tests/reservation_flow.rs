use std::sync::Arc;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;
use ryde_booking::orchestrator::{sign, MockPaymentProvider, WebhookOutcome};
use ryde_booking::scheduler::{TripDraft, TripPatch};
use ryde_booking::{
    BookingError, BookingRules, BookingStatus, BookingStore, InMemoryStore, NewBooking, PaymentEffect,
    PaymentOrchestrator, PaymentSource, PaymentStatus, ReservationCoordinator, TransitionError, TripScheduler,
};
use ryde_catalog::{Bus, LedgerError, Park, Route, Trip};
use ryde_core::identity::{Actor, Role};
use ryde_core::payment::{PaymentOutcome, ProviderError, ProviderStatus};
use ryde_core::search::TripSearchRequest;
use ryde_core::CoreError;

const PRICE: i64 = 5_000_00;
const SECRET: &str = "sk_test_webhook";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 5, 1, 8, 0, 0).unwrap()
}

fn passenger() -> Actor {
    Actor::new(Uuid::new_v4(), "rider@mail.ng", Role::Passenger)
}

struct Fixture {
    store: Arc<InMemoryStore>,
    provider: Arc<MockPaymentProvider>,
    coordinator: Arc<ReservationCoordinator>,
    orchestrator: PaymentOrchestrator,
    scheduler: TripScheduler,
    admin: Actor,
    park: Park,
    bus: Bus,
    route: Route,
    trip: Trip,
}

async fn fixture(total_seats: u32, departs_in: Duration) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let admin = Actor::new(Uuid::new_v4(), "admin@park.ng", Role::ParkAdmin);
    let park = Park { id: Uuid::new_v4(), name: "Jibowu".into(), admin_id: Some(admin.user_id) };
    let bus = Bus { id: Uuid::new_v4(), park_id: park.id, number_plate: "LAG-482-KJ".into(), total_seats };
    let route = Route { id: Uuid::new_v4(), origin_park_id: park.id, destination_park_id: Uuid::new_v4(), distance_km: 128.0 };
    let trip = Trip {
        id: Uuid::new_v4(),
        route_id: route.id,
        bus_id: bus.id,
        departure_time: now() + departs_in,
        seat_price: PRICE,
        total_seats,
        available_seats: total_seats,
        created_at: now(),
    };
    store.add_park(park.clone()).await;
    store.add_bus(bus.clone()).await;
    store.add_route(route.clone()).await;
    store.add_trip(trip.clone()).await;

    let rules = BookingRules::default();
    let provider = Arc::new(MockPaymentProvider::new());
    let coordinator = Arc::new(ReservationCoordinator::new(store.clone(), store.clone(), rules.clone()));
    let orchestrator = PaymentOrchestrator::new(provider.clone(), coordinator.clone(), SECRET, "http://localhost/payment/callback");
    let scheduler = TripScheduler::new(store.clone(), store.clone(), rules);

    Fixture { store, provider, coordinator, orchestrator, scheduler, admin, park, bus, route, trip }
}

impl Fixture {
    async fn book(&self, actor: &Actor, seats: &[u32]) -> Result<ryde_booking::BookingView, BookingError> {
        let request = NewBooking {
            trip_id: self.trip.id,
            seat_numbers: seats.to_vec(),
            expected_price: PRICE * seats.len() as i64,
        };
        self.coordinator.create_booking(actor, request, now()).await
    }

    async fn available(&self) -> u32 {
        self.coordinator.availability(self.trip.id).await.unwrap().available_seats
    }

    async fn webhook(&self, event: &str, reference: &str, amount: i64) -> Result<WebhookOutcome, BookingError> {
        self.webhook_at(event, reference, amount, now()).await
    }

    async fn webhook_at(
        &self,
        event: &str,
        reference: &str,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<WebhookOutcome, BookingError> {
        let body = serde_json::json!({
            "event": event,
            "data": { "reference": reference, "amount": amount, "status": "success" }
        })
        .to_string();
        let signature = sign(SECRET, body.as_bytes());
        self.orchestrator.handle_webhook(body.as_bytes(), Some(&signature), at).await
    }
}

#[tokio::test]
async fn test_overlapping_requests_first_wins() {
    let fx = fixture(18, Duration::days(1)).await;

    let first = fx.book(&passenger(), &[1, 2, 3]).await.unwrap();
    assert_eq!(first.status, BookingStatus::Pending);
    assert_eq!(first.price, 3 * PRICE);

    let err = fx.book(&passenger(), &[3, 4]).await.unwrap_err();
    assert!(matches!(err, BookingError::Ledger(LedgerError::SeatsUnavailable { ref conflicting }) if conflicting == &vec![3]));
    assert_eq!(fx.available().await, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overlapping_reservations_never_double_assign() {
    let fx = fixture(10, Duration::days(2)).await;

    let mut handles = Vec::new();
    for i in 0..40u32 {
        let coordinator = fx.coordinator.clone();
        let trip_id = fx.trip.id;
        handles.push(tokio::spawn(async move {
            let request = NewBooking {
                trip_id,
                seat_numbers: vec![i % 10 + 1, (i + 3) % 10 + 1],
                expected_price: 2 * PRICE,
            };
            coordinator.create_booking(&passenger(), request, now()).await
        }));
    }

    let mut sold = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(view) => sold.extend(view.seat_numbers),
            Err(BookingError::Ledger(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    let mut unique = sold.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), sold.len(), "a seat was sold twice");

    let seat_map = fx.coordinator.availability(fx.trip.id).await.unwrap();
    assert_eq!(seat_map.taken_seats, unique);
    assert_eq!(seat_map.available_seats as usize, 10 - sold.len());
}

#[tokio::test]
async fn test_stale_price_is_rejected() {
    let fx = fixture(18, Duration::days(1)).await;
    let request = NewBooking { trip_id: fx.trip.id, seat_numbers: vec![1, 2], expected_price: PRICE };

    let err = fx.coordinator.create_booking(&passenger(), request, now()).await.unwrap_err();
    assert!(matches!(err, BookingError::Pricing(_)));
    assert_eq!(fx.available().await, 18);
}

#[tokio::test]
async fn test_failed_payment_releases_seats() {
    let fx = fixture(18, Duration::days(1)).await;
    let booking = fx.book(&passenger(), &[5, 6]).await.unwrap();
    assert_eq!(fx.available().await, 16);

    let outcome = fx.webhook("charge.failed", &booking.payment_reference, booking.price).await.unwrap();
    match outcome {
        WebhookOutcome::Applied(updated, effect) => {
            assert_eq!(effect, PaymentEffect::Cancelled { released: 2 });
            assert_eq!(updated.status, BookingStatus::Cancelled);
            assert_eq!(updated.payment_status, PaymentStatus::Failed);
        }
        WebhookOutcome::Ignored(event) => panic!("event {} ignored", event),
    }
    assert_eq!(fx.available().await, 18);
}

#[tokio::test]
async fn test_webhook_after_callback_is_a_no_op() {
    let fx = fixture(18, Duration::days(1)).await;
    let booking = fx.book(&passenger(), &[7]).await.unwrap();
    fx.provider.settle(&booking.payment_reference, ProviderStatus::Success, Some(booking.price));

    let (confirmed, effect) = fx.orchestrator.handle_callback(&booking.payment_reference, now()).await.unwrap();
    assert_eq!(effect, PaymentEffect::Confirmed);
    assert_eq!(confirmed.status, BookingStatus::Confirmed);

    match fx.webhook("charge.success", &booking.payment_reference, booking.price).await.unwrap() {
        WebhookOutcome::Applied(again, effect) => {
            assert_eq!(effect, PaymentEffect::Unchanged);
            assert_eq!(again.status, BookingStatus::Confirmed);
        }
        WebhookOutcome::Ignored(event) => panic!("event {} ignored", event),
    }
    assert_eq!(fx.available().await, 17);
}

#[tokio::test]
async fn test_cancel_inside_cutoff_is_rejected() {
    let fx = fixture(18, Duration::hours(10)).await;
    let rider = passenger();
    let booking = fx.book(&rider, &[1]).await.unwrap();
    fx.coordinator
        .apply_payment_result(&booking.payment_reference, PaymentOutcome::Successful, PaymentSource::Webhook, now())
        .await
        .unwrap();

    let err = fx.coordinator.cancel_booking(&rider, booking.id, now()).await.unwrap_err();
    assert!(matches!(
        err,
        BookingError::Transition(TransitionError::TooCloseToDeparture { hours_left: 10, cutoff_hours: 12 })
    ));
    assert_eq!(fx.available().await, 17);
}

#[tokio::test]
async fn test_paid_booking_cancelled_by_owner_or_park_admin() {
    let fx = fixture(18, Duration::days(3)).await;
    let rider = passenger();

    let mine = fx.book(&rider, &[1, 2]).await.unwrap();
    let theirs = fx.book(&rider, &[3]).await.unwrap();
    for reference in [&mine.payment_reference, &theirs.payment_reference] {
        fx.coordinator
            .apply_payment_result(reference, PaymentOutcome::Successful, PaymentSource::Webhook, now())
            .await
            .unwrap();
    }

    let stranger = passenger();
    let err = fx.coordinator.cancel_booking(&stranger, mine.id, now()).await.unwrap_err();
    assert!(matches!(err, BookingError::Core(CoreError::NotFound(_))));

    let cancelled = fx.coordinator.cancel_booking(&rider, mine.id, now()).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    let cancelled = fx.coordinator.cancel_booking(&fx.admin, theirs.id, now()).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(fx.available().await, 18);

    let err = fx.coordinator.cancel_booking(&rider, mine.id, now()).await.unwrap_err();
    assert!(matches!(err, BookingError::Transition(TransitionError::AlreadyCancelled)));
}

#[tokio::test]
async fn test_unpaid_booking_expires_on_read_and_sweep() {
    let fx = fixture(18, Duration::days(1)).await;
    let rider = passenger();
    let read = fx.book(&rider, &[1, 2]).await.unwrap();
    let swept = fx.book(&rider, &[3]).await.unwrap();

    let later = now() + Duration::minutes(31);
    let view = fx.coordinator.booking_for(&rider, read.id, later).await.unwrap();
    assert_eq!(view.status, BookingStatus::Cancelled);
    assert_eq!(view.payment_status, PaymentStatus::Failed);
    assert_eq!(fx.available().await, 16);

    let report = fx.coordinator.sweep(later).await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(fx.available().await, 18);
    let stored = fx.store.booking(swept.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Cancelled);

    // late success for an expired booking changes nothing
    let (_, effect) = fx
        .coordinator
        .apply_payment_result(&swept.payment_reference, PaymentOutcome::Successful, PaymentSource::Webhook, later)
        .await
        .unwrap();
    assert_eq!(effect, PaymentEffect::Unchanged);
}

#[tokio::test]
async fn test_confirmed_booking_completes_after_departure() {
    let fx = fixture(18, Duration::hours(2)).await;
    let rider = passenger();
    let booking = fx.book(&rider, &[9]).await.unwrap();
    fx.coordinator
        .apply_payment_result(&booking.payment_reference, PaymentOutcome::Successful, PaymentSource::Poll, now())
        .await
        .unwrap();

    let views = fx.coordinator.bookings_for(&rider, now() + Duration::hours(3)).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].status, BookingStatus::Completed);
}

#[tokio::test]
async fn test_foreign_bookings_look_missing() {
    let fx = fixture(18, Duration::days(1)).await;
    let booking = fx.book(&passenger(), &[4]).await.unwrap();

    let stranger = passenger();
    assert!(matches!(
        fx.coordinator.booking_for(&stranger, booking.id, now()).await,
        Err(BookingError::Core(CoreError::NotFound(_)))
    ));
    assert!(matches!(
        fx.coordinator.booking_by_reference_for(&stranger, &booking.payment_reference, now()).await,
        Err(BookingError::Core(CoreError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_initialize_sends_booking_to_provider() {
    let fx = fixture(18, Duration::days(1)).await;
    let rider = passenger();
    let booking = fx.book(&rider, &[1, 2]).await.unwrap();

    let session = fx.orchestrator.initialize(&rider, booking.id, now()).await.unwrap();
    assert_eq!(session.reference, booking.payment_reference);

    let sent = fx.provider.initialized();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].amount, 2 * PRICE);
    assert_eq!(sent[0].email, "rider@mail.ng");
    assert_eq!(sent[0].metadata["booking_id"], serde_json::json!(booking.id));
}

#[tokio::test]
async fn test_initialize_rejects_settled_booking() {
    let fx = fixture(18, Duration::days(1)).await;
    let rider = passenger();
    let booking = fx.book(&rider, &[1]).await.unwrap();
    fx.coordinator
        .apply_payment_result(&booking.payment_reference, PaymentOutcome::Successful, PaymentSource::Webhook, now())
        .await
        .unwrap();

    let err = fx.orchestrator.initialize(&rider, booking.id, now()).await.unwrap_err();
    assert!(matches!(err, BookingError::Transition(TransitionError::NotPending)));
}

#[tokio::test]
async fn test_initialize_cancels_booking_that_lost_its_seats() {
    let fx = fixture(10, Duration::days(1)).await;
    let rider = passenger();
    let booking = fx.book(&rider, &[1, 2]).await.unwrap();

    {
        let mut lock = fx.store.lock_trip(fx.trip.id).await.unwrap();
        lock.ledger_mut().release(booking.id);
        lock.ledger_mut().reserve(Uuid::new_v4(), &[2]).unwrap();
        lock.commit().await.unwrap();
    }

    let err = fx.orchestrator.initialize(&rider, booking.id, now()).await.unwrap_err();
    assert!(matches!(err, BookingError::Ledger(LedgerError::SeatsUnavailable { ref conflicting }) if conflicting == &vec![1, 2]));

    let stored = fx.store.booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert_eq!(fx.available().await, 9);
    assert!(fx.provider.initialized().is_empty());
}

#[tokio::test]
async fn test_provider_failure_during_initialize_releases_seats() {
    let fx = fixture(18, Duration::days(1)).await;
    let rider = passenger();
    let booking = fx.book(&rider, &[1, 2, 3]).await.unwrap();
    fx.provider.reject_initialize(true);

    let err = fx.orchestrator.initialize(&rider, booking.id, now()).await.unwrap_err();
    assert!(matches!(err, BookingError::Provider(ProviderError::Rejected(_))));

    let stored = fx.store.booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert_eq!(stored.payment_status, PaymentStatus::Failed);
    assert_eq!(fx.available().await, 18);
}

#[tokio::test]
async fn test_callback_outage_and_webhook_agree_in_either_order() {
    let fx = fixture(18, Duration::days(1)).await;
    let rider = passenger();
    let outage_first = fx.book(&rider, &[8]).await.unwrap();
    let webhook_first = fx.book(&rider, &[9]).await.unwrap();

    // outage during the callback, then the webhook
    fx.provider.make_unreachable(&outage_first.payment_reference);
    let err = fx.orchestrator.handle_callback(&outage_first.payment_reference, now()).await.unwrap_err();
    assert!(matches!(err, BookingError::Provider(ProviderError::Network(_))));
    let stored = fx.store.booking(outage_first.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Pending);
    assert_eq!(fx.available().await, 16);
    fx.webhook("charge.success", &outage_first.payment_reference, PRICE).await.unwrap();

    // webhook, then the same outage during the callback
    fx.webhook("charge.success", &webhook_first.payment_reference, PRICE).await.unwrap();
    fx.provider.make_unreachable(&webhook_first.payment_reference);
    let err = fx.orchestrator.handle_callback(&webhook_first.payment_reference, now()).await.unwrap_err();
    assert!(matches!(err, BookingError::Provider(ProviderError::Network(_))));

    for id in [outage_first.id, webhook_first.id] {
        let stored = fx.store.booking(id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(stored.payment_status, PaymentStatus::Successful);
    }
    assert_eq!(fx.available().await, 16);
}

#[tokio::test]
async fn test_success_after_departure_does_not_confirm() {
    let fx = fixture(18, Duration::hours(1)).await;
    let rider = passenger();
    let booking = fx.book(&rider, &[2, 3]).await.unwrap();
    let after_departure = now() + Duration::hours(2);

    match fx
        .webhook_at("charge.success", &booking.payment_reference, booking.price, after_departure)
        .await
        .unwrap()
    {
        WebhookOutcome::Applied(updated, effect) => {
            assert_eq!(effect, PaymentEffect::Unchanged);
            assert_eq!(updated.status, BookingStatus::Cancelled);
            assert_eq!(updated.payment_status, PaymentStatus::Failed);
        }
        WebhookOutcome::Ignored(event) => panic!("event {} ignored", event),
    }

    let view = fx.coordinator.booking_for(&rider, booking.id, after_departure).await.unwrap();
    assert_ne!(view.status, BookingStatus::Completed);
    assert_eq!(view.status, BookingStatus::Cancelled);
    assert_eq!(fx.available().await, 18);
}

#[tokio::test]
async fn test_success_after_hold_lapsed_expires_booking() {
    let fx = fixture(18, Duration::days(1)).await;
    let booking = fx.book(&passenger(), &[4]).await.unwrap();
    let lapsed = now() + Duration::minutes(31);

    let (updated, effect) = fx
        .coordinator
        .apply_payment_result(&booking.payment_reference, PaymentOutcome::Successful, PaymentSource::Callback, lapsed)
        .await
        .unwrap();
    assert_eq!(effect, PaymentEffect::Unchanged);
    assert_eq!(updated.status, BookingStatus::Cancelled);
    assert_eq!(fx.available().await, 18);

    // the expiry is persisted even though the admin call reports nothing to apply
    let other = fx.book(&passenger(), &[5]).await.unwrap();
    let err = fx
        .coordinator
        .admin_update_payment(&fx.admin, other.id, PaymentOutcome::Successful, lapsed)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Transition(TransitionError::AlreadyFinalized)));
    let stored = fx.store.booking(other.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert_eq!(fx.available().await, 18);
}

#[tokio::test]
async fn test_in_flight_and_underpaid_results() {
    let fx = fixture(18, Duration::days(1)).await;
    let rider = passenger();
    let booking = fx.book(&rider, &[1]).await.unwrap();

    let view = fx.orchestrator.verify_payment(&rider, &booking.payment_reference, now()).await.unwrap();
    assert_eq!(view.status, BookingStatus::Pending);

    fx.provider.settle(&booking.payment_reference, ProviderStatus::Success, Some(booking.price - 100));
    let view = fx.orchestrator.verify_payment(&rider, &booking.payment_reference, now()).await.unwrap();
    assert_eq!(view.status, BookingStatus::Cancelled);
    assert_eq!(fx.available().await, 18);
}

#[tokio::test]
async fn test_webhook_signature_and_unknown_events() {
    let fx = fixture(18, Duration::days(1)).await;
    let body = br#"{"event":"charge.success","data":{"reference":"REF-NOPE"}}"#;

    assert!(matches!(
        fx.orchestrator.handle_webhook(body, None, now()).await,
        Err(BookingError::InvalidSignature)
    ));
    assert!(matches!(
        fx.orchestrator.handle_webhook(body, Some("deadbeef"), now()).await,
        Err(BookingError::InvalidSignature)
    ));
    assert!(matches!(
        fx.webhook("charge.success", "REF-NOPE", PRICE).await,
        Err(BookingError::Core(CoreError::NotFound(_)))
    ));
    assert!(matches!(
        fx.webhook("transfer.success", "REF-NOPE", PRICE).await,
        Ok(WebhookOutcome::Ignored(_))
    ));
}

#[tokio::test]
async fn test_admin_payment_reconciliation() {
    let fx = fixture(18, Duration::days(1)).await;
    let rider = passenger();
    let booking = fx.book(&rider, &[1]).await.unwrap();

    let err = fx
        .coordinator
        .admin_update_payment(&rider, booking.id, PaymentOutcome::Successful, now())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Core(CoreError::Forbidden(_))));

    let view = fx
        .coordinator
        .admin_update_payment(&fx.admin, booking.id, PaymentOutcome::Successful, now())
        .await
        .unwrap();
    assert_eq!(view.status, BookingStatus::Confirmed);

    let err = fx
        .coordinator
        .admin_update_payment(&fx.admin, booking.id, PaymentOutcome::Failed, now())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Transition(TransitionError::AlreadyFinalized)));
}

#[tokio::test]
async fn test_batch_scheduling_reports_conflicts_per_entry() {
    let fx = fixture(18, Duration::hours(26)).await;
    // fixture trip departs 2030-05-02 10:00 UTC
    let draft = |hour: u32, minute: u32| TripDraft {
        route_id: fx.route.id,
        bus_id: fx.bus.id,
        departure_time: Utc.with_ymd_and_hms(2030, 5, 2, hour, minute, 0).unwrap(),
        seat_price: PRICE,
    };

    let outcome = fx
        .scheduler
        .create_trips(&fx.admin, fx.park.id, vec![draft(11, 30), draft(13, 0)], now())
        .await
        .unwrap();
    assert_eq!(outcome.created_trips.len(), 1);
    assert_eq!(outcome.created_trips[0].available_seats, 18);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].trip_index, 0);

    let err = fx
        .scheduler
        .create_trips(&passenger(), fx.park.id, vec![draft(18, 0)], now())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Core(CoreError::Forbidden(_))));

    let past = TripDraft { departure_time: now() - Duration::hours(1), ..draft(0, 0) };
    let outcome = fx.scheduler.create_trips(&fx.admin, fx.park.id, vec![past], now()).await.unwrap();
    assert!(outcome.created_trips.is_empty());
}

#[tokio::test]
async fn test_trip_update_keeps_seats_consistent() {
    let fx = fixture(18, Duration::days(1)).await;
    fx.book(&passenger(), &[14]).await.unwrap();

    let small = Bus { id: Uuid::new_v4(), park_id: fx.park.id, number_plate: "ABJ-11".into(), total_seats: 12 };
    let large = Bus { id: Uuid::new_v4(), park_id: fx.park.id, number_plate: "ABJ-22".into(), total_seats: 30 };
    fx.store.add_bus(small.clone()).await;
    fx.store.add_bus(large.clone()).await;

    let err = fx
        .scheduler
        .update_trip(&fx.admin, fx.trip.id, TripPatch { bus_id: Some(small.id), ..Default::default() }, now())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Ledger(LedgerError::BusTooSmall { .. })));

    let updated = fx
        .scheduler
        .update_trip(
            &fx.admin,
            fx.trip.id,
            TripPatch { bus_id: Some(large.id), seat_price: Some(6_000_00), ..Default::default() },
            now(),
        )
        .await
        .unwrap();
    assert_eq!(updated.total_seats, 30);
    assert_eq!(updated.available_seats, 29);
    assert_eq!(updated.seat_price, 6_000_00);
}

#[tokio::test]
async fn test_concurrent_moves_into_one_slot_admit_one() {
    let fx = fixture(18, Duration::days(1)).await;
    // fixture trip departs 2030-05-02 08:00 UTC
    let second = Trip {
        id: Uuid::new_v4(),
        departure_time: Utc.with_ymd_and_hms(2030, 5, 2, 14, 0, 0).unwrap(),
        ..fx.trip.clone()
    };
    fx.store.add_trip(second.clone()).await;

    let move_to = |hour: u32, minute: u32| TripPatch {
        departure_time: Some(Utc.with_ymd_and_hms(2030, 5, 2, hour, minute, 0).unwrap()),
        ..Default::default()
    };
    let (first, other) = tokio::join!(
        fx.scheduler.update_trip(&fx.admin, fx.trip.id, move_to(20, 0), now()),
        fx.scheduler.update_trip(&fx.admin, second.id, move_to(20, 30), now()),
    );

    let outcomes = [first.is_ok(), other.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    for result in [first, other] {
        if let Err(e) = result {
            assert!(matches!(e, BookingError::ScheduleConflict { .. }));
        }
    }

    let a = fx.store.trip(fx.trip.id).await.unwrap().unwrap();
    let b = fx.store.trip(second.id).await.unwrap().unwrap();
    assert!((a.departure_time - b.departure_time).num_minutes().abs() >= 120);
}

#[tokio::test]
async fn test_trip_with_active_bookings_cannot_be_deleted() {
    let fx = fixture(18, Duration::days(1)).await;
    let booking = fx.book(&passenger(), &[1]).await.unwrap();

    let err = fx.scheduler.delete_trip(&fx.admin, fx.trip.id).await.unwrap_err();
    assert!(matches!(err, BookingError::TripInUse { active: 1 }));

    fx.coordinator
        .apply_payment_result(&booking.payment_reference, PaymentOutcome::Failed, PaymentSource::Webhook, now())
        .await
        .unwrap();
    fx.scheduler.delete_trip(&fx.admin, fx.trip.id).await.unwrap();
    assert!(fx.store.trip(fx.trip.id).await.unwrap().is_none());
    assert!(fx.store.booking(booking.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_search_filters_by_route_and_date() {
    let fx = fixture(18, Duration::hours(4)).await;
    let same_day = |raw: &str| TripSearchRequest {
        origin_park_id: Some(fx.park.id),
        destination_park_id: Some(fx.route.destination_park_id),
        date: Some(raw.to_string()),
    };

    let found = fx.scheduler.search(&same_day("2030-05-01"), now()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].trip_id, fx.trip.id);

    // after departure the trip no longer shows for today
    let found = fx.scheduler.search(&same_day("2030-05-01"), now() + Duration::hours(5)).await.unwrap();
    assert!(found.is_empty());

    assert!(fx.scheduler.search(&same_day("01/05/2030"), now()).await.unwrap().is_empty());
    assert!(fx.scheduler.search(&same_day("2030-05-02"), now()).await.unwrap().is_empty());
}
