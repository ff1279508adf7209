use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use serde_json::{Value, json};

use bus_ticketing::AppError;
use bus_ticketing::entities::booking::{self, BookingStatus, PaymentStatus};
use bus_ticketing::entities::booking_seat;
use bus_ticketing::services::booking::{self as bookings, BookingDetail, NewBooking};
use bus_ticketing::services::payment::{self as payments, PaymentLinkView, PaymentOutcome, ReturnQuery};
use bus_ticketing::services::schedule::local_day_bounds;
use bus_ticketing::services::statistics;
use bus_ticketing::utils::signature;

mod common;
use common::{CHECKSUM_KEY, SEAT_PRICE, TestApp};

async fn pending_booking(app: &TestApp, user_id: i32, total_price: Option<i64>) -> BookingDetail {
    let trip = app.create_trip("51B-12345", 4).await;
    let seat_list = app.seats_of(trip.id).await;
    bookings::create_booking(
        app.db(),
        user_id,
        NewBooking {
            schedule_id: trip.id,
            seat_ids: vec![seat_list[0].id, seat_list[1].id],
            payment_method: None,
            pickup_stop_id: None,
            dropoff_stop_id: None,
            total_price,
        },
    )
    .await
    .unwrap()
}

async fn link_for(app: &TestApp, user_id: i32, booking_id: i32) -> PaymentLinkView {
    payments::create_payment_link(
        app.db(),
        app.gateway.as_ref(),
        &app.state.config,
        user_id,
        booking_id,
    )
    .await
    .unwrap()
}

fn webhook(order_code: i64, code: &str) -> Value {
    let body = json!({
        "code": "00",
        "desc": "success",
        "success": true,
        "data": {
            "orderCode": order_code,
            "amount": 2 * SEAT_PRICE,
            "description": "BK1",
            "paymentLinkId": format!("plink-{}", order_code),
            "code": code,
            "desc": "success"
        }
    });
    signature::attach(body, CHECKSUM_KEY).unwrap()
}

async fn reload(app: &TestApp, id: i32) -> booking::Model {
    booking::Entity::find_by_id(id).one(app.db()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_payment_link_is_issued_once() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let detail = pending_booking(&app, customer.id, None).await;

    let link = link_for(&app, customer.id, detail.id).await;
    assert_eq!(link.amount, 2 * SEAT_PRICE);
    assert_eq!(link.order_code / 1_000_000, detail.id as i64);
    assert_eq!(link.payment_request_id, format!("plink-{}", link.order_code));

    let stored = reload(&app, detail.id).await;
    assert_eq!(stored.order_code, Some(link.order_code));
    assert_eq!(stored.payment_status, Some(PaymentStatus::Pending));
    assert_eq!(stored.status, BookingStatus::Pending);

    let again = link_for(&app, customer.id, detail.id).await;
    assert_eq!(again.order_code, link.order_code);
    assert_eq!(again.checkout_url, link.checkout_url);
    assert_eq!(app.gateway.calls(), 1);
}

#[tokio::test]
async fn test_payment_link_guards() {
    let app = TestApp::new().await;
    let owner = app.create_user("owner@example.com").await;
    let stranger = app.create_user("stranger@example.com").await;
    let detail = pending_booking(&app, owner.id, None).await;

    let err = payments::create_payment_link(
        app.db(),
        app.gateway.as_ref(),
        &app.state.config,
        stranger.id,
        detail.id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    booking::ActiveModel {
        id: Set(detail.id),
        booked_at: Set((Utc::now() - Duration::minutes(6)).into()),
        ..Default::default()
    }
    .update(app.db())
    .await
    .unwrap();

    let err = payments::create_payment_link(
        app.db(),
        app.gateway.as_ref(),
        &app.state.config,
        owner.id,
        detail.id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(app.gateway.calls(), 0);
}

#[tokio::test]
async fn test_free_booking_cannot_be_paid() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let detail = pending_booking(&app, customer.id, Some(0)).await;

    let err = payments::create_payment_link(
        app.db(),
        app.gateway.as_ref(),
        &app.state.config,
        customer.id,
        detail.id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_paid_webhook_confirms_booking() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let detail = pending_booking(&app, customer.id, None).await;
    let link = link_for(&app, customer.id, detail.id).await;

    payments::handle_webhook(app.db(), CHECKSUM_KEY, &webhook(link.order_code, "00"))
        .await
        .unwrap();

    let stored = reload(&app, detail.id).await;
    assert_eq!(stored.status, BookingStatus::Paid);
    assert_eq!(stored.payment_status, Some(PaymentStatus::Paid));
    assert!(stored.payment_completed_at.is_some());

    // redelivery changes nothing
    payments::handle_webhook(app.db(), CHECKSUM_KEY, &webhook(link.order_code, "00"))
        .await
        .unwrap();
    assert_eq!(reload(&app, detail.id).await.status, BookingStatus::Paid);
}

#[tokio::test]
async fn test_failed_webhook_releases_seats() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let detail = pending_booking(&app, customer.id, None).await;
    let link = link_for(&app, customer.id, detail.id).await;

    payments::handle_webhook(app.db(), CHECKSUM_KEY, &webhook(link.order_code, "01"))
        .await
        .unwrap();

    let stored = reload(&app, detail.id).await;
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert_eq!(stored.payment_status, Some(PaymentStatus::Failed));
    assert_eq!(booking_seat::Entity::find().count(app.db()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_webhook_rejects_bad_input() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let detail = pending_booking(&app, customer.id, None).await;
    let link = link_for(&app, customer.id, detail.id).await;

    let mut tampered = webhook(link.order_code, "00");
    tampered["data"]["amount"] = json!(1);
    let err = payments::handle_webhook(app.db(), CHECKSUM_KEY, &tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = payments::handle_webhook(app.db(), "wrong-key", &webhook(link.order_code, "00"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = payments::handle_webhook(app.db(), CHECKSUM_KEY, &webhook(987_654_321, "00"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert_eq!(reload(&app, detail.id).await.status, BookingStatus::Pending);
}

#[tokio::test]
async fn test_late_payment_on_cancelled_booking_is_recorded() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let detail = pending_booking(&app, customer.id, None).await;
    let link = link_for(&app, customer.id, detail.id).await;

    bookings::cancel_booking_by_admin(app.db(), detail.id, None).await.unwrap();

    let status = payments::apply_outcome(app.db(), detail.id, PaymentOutcome::Paid)
        .await
        .unwrap();
    assert_eq!(status, BookingStatus::Cancelled);

    let stored = reload(&app, detail.id).await;
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert_eq!(stored.payment_status, Some(PaymentStatus::Paid));
    assert_eq!(stored.order_code, Some(link.order_code));
}

#[tokio::test]
async fn test_return_callback_checks_payment_request() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let detail = pending_booking(&app, customer.id, None).await;
    let link = link_for(&app, customer.id, detail.id).await;

    let forged = ReturnQuery {
        order_code: Some(link.order_code),
        payment_request_id: Some("someone-else".to_string()),
        status: Some("PAID".to_string()),
    };
    let err = payments::handle_return(app.db(), &forged).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(reload(&app, detail.id).await.status, BookingStatus::Pending);

    let genuine = ReturnQuery {
        order_code: Some(link.order_code),
        payment_request_id: Some(link.payment_request_id.clone()),
        status: Some("PAID".to_string()),
    };
    let (booking_id, outcome) = payments::handle_return(app.db(), &genuine).await.unwrap();
    assert_eq!(booking_id, detail.id);
    assert_eq!(outcome, PaymentOutcome::Paid);
    assert_eq!(reload(&app, detail.id).await.status, BookingStatus::Paid);
}

#[tokio::test]
async fn test_cancel_callback_cancels_pending_booking() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let detail = pending_booking(&app, customer.id, None).await;
    let link = link_for(&app, customer.id, detail.id).await;

    let booking_id = payments::handle_cancel(app.db(), Some(link.order_code)).await.unwrap();
    assert_eq!(booking_id, detail.id);

    let stored = reload(&app, detail.id).await;
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert_eq!(stored.payment_status, Some(PaymentStatus::Failed));

    assert!(matches!(
        payments::handle_cancel(app.db(), None).await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn test_paid_booking_counts_on_its_local_day() {
    let app = TestApp::new().await;
    let customer = app.create_user("a@example.com").await;
    let detail = pending_booking(&app, customer.id, None).await;
    let link = link_for(&app, customer.id, detail.id).await;
    payments::handle_webhook(app.db(), CHECKSUM_KEY, &webhook(link.order_code, "00"))
        .await
        .unwrap();

    let offset = app.state.config.local_offset().unwrap();
    let today = Utc::now().with_timezone(&offset).date_naive();
    let (midnight, _) = local_day_bounds(today, offset).unwrap();

    // 01:00 local is still the previous day in UTC
    booking::ActiveModel {
        id: Set(detail.id),
        booked_at: Set((midnight + Duration::hours(1)).into()),
        ..Default::default()
    }
    .update(app.db())
    .await
    .unwrap();

    let days = statistics::revenue_by_day(app.db(), today - Duration::days(1), today, offset)
        .await
        .unwrap();
    assert_eq!(days.len(), 2);
    assert_eq!(days[0].date, today - Duration::days(1));
    assert_eq!((days[0].bookings, days[0].revenue), (0, 0));
    assert_eq!(days[1].date, today);
    assert_eq!((days[1].bookings, days[1].revenue), (1, 2 * SEAT_PRICE));

    let overview = statistics::overview(app.db(), Utc::now()).await.unwrap();
    assert_eq!(overview.revenue, 2 * SEAT_PRICE);
    assert_eq!(overview.bookings.paid, 1);
}
