use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};

use bus_ticketing::AppError;
use bus_ticketing::entities::booking::{self, BookingStatus, PaymentStatus};
use bus_ticketing::entities::booking_seat;
use bus_ticketing::entities::stop::StopType;
use bus_ticketing::services::booking::{self as bookings, NewBooking};
use bus_ticketing::services::cleanup::{self, EXPIRED_REASON};
use bus_ticketing::services::seat::{self as seats, SeatState};

mod common;
use common::{SEAT_PRICE, TestApp};

fn request(schedule_id: i32, seat_ids: Vec<i32>) -> NewBooking {
    NewBooking {
        schedule_id,
        seat_ids,
        payment_method: None,
        pickup_stop_id: None,
        dropoff_stop_id: None,
        total_price: None,
    }
}

/// Push the booking's creation time into the past.
async fn age_booking(app: &TestApp, booking_id: i32, minutes: i64) {
    booking::ActiveModel {
        id: Set(booking_id),
        booked_at: Set((Utc::now() - Duration::minutes(minutes)).into()),
        ..Default::default()
    }
    .update(app.db())
    .await
    .unwrap();
}

#[tokio::test]
async fn test_booking_holds_seats_and_prices_them() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let trip = app.create_trip("29B-11111", 10).await;
    let seat_list = app.seats_of(trip.id).await;
    assert_eq!(seat_list.len(), 10);
    assert_eq!(seat_list[0].seat_number, "A01");

    let detail = bookings::create_booking(
        app.db(),
        customer.id,
        request(trip.id, vec![seat_list[0].id, seat_list[1].id]),
    )
    .await
    .unwrap();

    assert_eq!(detail.status, BookingStatus::Pending);
    assert_eq!(detail.total_price, 2 * SEAT_PRICE);
    assert_eq!(detail.payment_method, "payos");
    assert_eq!(detail.seats.len(), 2);
    assert_eq!(detail.user.id, customer.id);
    assert_eq!(detail.trip.id, trip.id);

    let map = seats::seat_map(app.db(), trip.id, Utc::now(), app.state.config.booking_timeout())
        .await
        .unwrap();
    assert_eq!(map.total, 10);
    assert_eq!(map.available, 8);
    let first = &map.floors[0].seats[0];
    assert_eq!(first.status, SeatState::Pending);
    assert!(first.remaining_seconds.is_some());
}

#[tokio::test]
async fn test_client_total_overrides_schedule_price() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let seat_list = app.seats_of(trip.id).await;

    let mut req = request(trip.id, vec![seat_list[0].id, seat_list[1].id]);
    req.total_price = Some(450_000);
    req.payment_method = Some("cash".to_string());

    let detail = bookings::create_booking(app.db(), customer.id, req).await.unwrap();
    assert_eq!(detail.total_price, 450_000);
    assert_eq!(detail.payment_method, "cash");
}

#[tokio::test]
async fn test_seat_cannot_be_booked_twice() {
    let app = TestApp::new().await;
    let first = app.create_user("first@example.com").await;
    let second = app.create_user("second@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let seat_list = app.seats_of(trip.id).await;

    bookings::create_booking(app.db(), first.id, request(trip.id, vec![seat_list[0].id]))
        .await
        .unwrap();

    let err = bookings::create_booking(
        app.db(),
        second.id,
        request(trip.id, vec![seat_list[1].id, seat_list[0].id]),
    )
    .await
    .unwrap_err();

    match err {
        AppError::Conflict(message) => assert!(message.contains("A01"), "{}", message),
        other => panic!("expected conflict, got {:?}", other),
    }

    // the failed attempt must not hold the free seat either
    let held = booking_seat::Entity::find().count(app.db()).await.unwrap();
    assert_eq!(held, 1);
}

#[tokio::test]
async fn test_unique_seat_index_catches_stale_holder() {
    let app = TestApp::new().await;
    let first = app.create_user("first@example.com").await;
    let second = app.create_user("second@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let seat_list = app.seats_of(trip.id).await;

    let held = bookings::create_booking(app.db(), first.id, request(trip.id, vec![seat_list[0].id]))
        .await
        .unwrap();

    // flip the status behind the service's back so the holder check passes
    // and only the unique index on booking_seat.seat_id stands in the way
    booking::ActiveModel {
        id: Set(held.id),
        status: Set(BookingStatus::Cancelled),
        ..Default::default()
    }
    .update(app.db())
    .await
    .unwrap();

    let err = bookings::create_booking(
        app.db(),
        second.id,
        request(trip.id, vec![seat_list[1].id, seat_list[0].id]),
    )
    .await
    .unwrap_err();
    match err {
        AppError::Conflict(message) => assert_eq!(message, "Seats A01 are already booked"),
        other => panic!("expected conflict, got {:?}", other),
    }

    assert_eq!(booking::Entity::find().count(app.db()).await.unwrap(), 1);
    assert_eq!(booking_seat::Entity::find().count(app.db()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_bookings_have_one_winner() {
    let app = TestApp::new().await;
    let first = app.create_user("first@example.com").await;
    let second = app.create_user("second@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let seat_list = app.seats_of(trip.id).await;

    let (a, b) = tokio::join!(
        bookings::create_booking(app.db(), first.id, request(trip.id, vec![seat_list[0].id])),
        bookings::create_booking(app.db(), second.id, request(trip.id, vec![seat_list[0].id])),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::Conflict(_)))));
    assert_eq!(booking_seat::Entity::find().count(app.db()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_disabling_and_booking_a_seat_cannot_both_win() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let seat_list = app.seats_of(trip.id).await;

    let (disabled, booked) = tokio::join!(
        seats::set_seat_enabled(app.db(), seat_list[0].id, false),
        bookings::create_booking(app.db(), customer.id, request(trip.id, vec![seat_list[0].id])),
    );

    match (disabled, booked) {
        (Ok(s), Err(AppError::BadRequest(_))) => assert!(!s.enabled),
        (Err(AppError::Conflict(_)), Ok(detail)) => assert_eq!(detail.seats.len(), 1),
        (d, b) => panic!("unexpected outcome: {:?} / {:?}", d.map(|s| s.enabled), b.map(|b| b.id)),
    }
}

#[tokio::test]
async fn test_seats_must_belong_to_schedule() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let other = app.create_trip("29B-22222", 4).await;
    let foreign = app.seats_of(other.id).await;

    let err = bookings::create_booking(app.db(), customer.id, request(trip.id, vec![foreign[0].id]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = bookings::create_booking(app.db(), customer.id, request(9999, vec![foreign[0].id]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_disabled_seat_is_not_bookable() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let seat_list = app.seats_of(trip.id).await;

    seats::set_seat_enabled(app.db(), seat_list[2].id, false).await.unwrap();

    let err = bookings::create_booking(app.db(), customer.id, request(trip.id, vec![seat_list[2].id]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // a held seat cannot be switched off
    bookings::create_booking(app.db(), customer.id, request(trip.id, vec![seat_list[0].id]))
        .await
        .unwrap();
    let err = seats::set_seat_enabled(app.db(), seat_list[0].id, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_stops_must_match_their_role() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let seat_list = app.seats_of(trip.id).await;
    let pickup = app.create_stop(1, "Giap Bat", StopType::Pickup).await;
    let dropoff = app.create_stop(6, "Mien Dong", StopType::Dropoff).await;

    let mut req = request(trip.id, vec![seat_list[0].id]);
    req.pickup_stop_id = Some(dropoff.id);
    let err = bookings::create_booking(app.db(), customer.id, req).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let mut req = request(trip.id, vec![seat_list[0].id]);
    req.pickup_stop_id = Some(pickup.id);
    req.dropoff_stop_id = Some(dropoff.id);
    let detail = bookings::create_booking(app.db(), customer.id, req).await.unwrap();
    assert_eq!(detail.pickup_stop.map(|s| s.id), Some(pickup.id));
    assert_eq!(detail.dropoff_stop.map(|s| s.id), Some(dropoff.id));
}

#[tokio::test]
async fn test_customer_cancel_frees_seats() {
    let app = TestApp::new().await;
    let owner = app.create_user("owner@example.com").await;
    let stranger = app.create_user("stranger@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let seat_list = app.seats_of(trip.id).await;

    let detail = bookings::create_booking(app.db(), owner.id, request(trip.id, vec![seat_list[0].id]))
        .await
        .unwrap();

    let err = bookings::cancel_booking(app.db(), stranger.id, detail.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let cancelled = bookings::cancel_booking(app.db(), owner.id, detail.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(cancelled.seats.is_empty());

    let err = bookings::cancel_booking(app.db(), owner.id, detail.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // the seat can be taken again
    bookings::create_booking(app.db(), stranger.id, request(trip.id, vec![seat_list[0].id]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_admin_cancel_and_complete() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let seat_list = app.seats_of(trip.id).await;

    let first = bookings::create_booking(app.db(), customer.id, request(trip.id, vec![seat_list[0].id]))
        .await
        .unwrap();
    let cancelled = bookings::cancel_booking_by_admin(app.db(), first.id, Some("Bus broke down".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("Bus broke down"));

    let second = bookings::create_booking(app.db(), customer.id, request(trip.id, vec![seat_list[1].id]))
        .await
        .unwrap();

    // pending bookings cannot be completed
    let err = bookings::complete_booking(app.db(), second.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    booking::ActiveModel {
        id: Set(second.id),
        status: Set(BookingStatus::Paid),
        payment_status: Set(Some(PaymentStatus::Paid)),
        ..Default::default()
    }
    .update(app.db())
    .await
    .unwrap();

    let completed = bookings::complete_booking(app.db(), second.id).await.unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);

    let err = bookings::cancel_booking_by_admin(app.db(), second.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_owner_check_on_read() {
    let app = TestApp::new().await;
    let owner = app.create_user("owner@example.com").await;
    let stranger = app.create_user("stranger@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let seat_list = app.seats_of(trip.id).await;

    let detail = bookings::create_booking(app.db(), owner.id, request(trip.id, vec![seat_list[0].id]))
        .await
        .unwrap();

    assert!(bookings::get_booking(app.db(), detail.id, Some(owner.id)).await.is_ok());
    assert!(bookings::get_booking(app.db(), detail.id, None).await.is_ok());
    assert!(matches!(
        bookings::get_booking(app.db(), detail.id, Some(stranger.id)).await,
        Err(AppError::Forbidden(_))
    ));

    let mine = bookings::list_user_bookings(app.db(), owner.id).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert!(bookings::list_user_bookings(app.db(), stranger.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_bookings_are_reclaimed() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let seat_list = app.seats_of(trip.id).await;
    let timeout = app.state.config.booking_timeout();

    let stale = bookings::create_booking(app.db(), customer.id, request(trip.id, vec![seat_list[0].id]))
        .await
        .unwrap();
    let fresh = bookings::create_booking(app.db(), customer.id, request(trip.id, vec![seat_list[1].id]))
        .await
        .unwrap();
    age_booking(&app, stale.id, 6).await;

    let report = cleanup::reclaim_expired(app.db(), Utc::now(), timeout).await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.cancelled, 1);
    assert_eq!(report.failed, 0);

    let expired = booking::Entity::find_by_id(stale.id).one(app.db()).await.unwrap().unwrap();
    assert_eq!(expired.status, BookingStatus::Cancelled);
    assert_eq!(expired.cancel_reason.as_deref(), Some(EXPIRED_REASON));
    // never reached the provider, so no payment status
    assert_eq!(expired.payment_status, None);

    let held = booking_seat::Entity::find()
        .filter(booking_seat::Column::BookingId.eq(stale.id))
        .count(app.db())
        .await
        .unwrap();
    assert_eq!(held, 0);

    let untouched = booking::Entity::find_by_id(fresh.id).one(app.db()).await.unwrap().unwrap();
    assert_eq!(untouched.status, BookingStatus::Pending);

    let map = seats::seat_map(app.db(), trip.id, Utc::now(), timeout).await.unwrap();
    assert_eq!(map.floors[0].seats[0].status, SeatState::Available);

    // a second run finds nothing left to do
    let again = cleanup::reclaim_expired(app.db(), Utc::now(), timeout).await.unwrap();
    assert_eq!(again.scanned, 0);
}

#[tokio::test]
async fn test_pending_summary_buckets() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let trip = app.create_trip("29B-11111", 4).await;
    let seat_list = app.seats_of(trip.id).await;

    let mut ids = Vec::new();
    for s in seat_list.iter().take(3) {
        let detail = bookings::create_booking(app.db(), customer.id, request(trip.id, vec![s.id]))
            .await
            .unwrap();
        ids.push(detail.id);
    }
    age_booking(&app, ids[1], 4).await;
    age_booking(&app, ids[2], 10).await;

    let summary = cleanup::pending_summary(
        app.db(),
        Utc::now(),
        app.state.config.booking_warning(),
        app.state.config.booking_timeout(),
    )
    .await
    .unwrap();

    assert_eq!(summary.total_pending, 3);
    assert_eq!(summary.near_expiry, 1);
    assert_eq!(summary.expired, 1);
    assert_eq!(summary.timeout_minutes, 5);
}
