use chrono::{Duration, DurationRound, NaiveDate, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

use bus_ticketing::AppError;
use bus_ticketing::entities::{schedule, schedule_pattern};
use bus_ticketing::entities::schedule::ScheduleStatus;
use bus_ticketing::response::Pagination;
use bus_ticketing::services::booking::{self as bookings, NewBooking};
use bus_ticketing::services::route as routes;
use bus_ticketing::services::schedule::{
    self as schedules, NewSchedule, ScheduleFilter, SearchQuery, UpdateSchedule,
};
use bus_ticketing::services::schedule_pattern::{self as patterns, GenerateRequest, PatternInput};

mod common;
use common::TestApp;

fn pattern(name: &str, route_id: i32, bus_type_id: i32) -> PatternInput {
    PatternInput {
        name: name.to_string(),
        route_id,
        bus_type_id,
        departure_times: vec!["20:00".to_string(), "08:00".to_string()],
        days_of_week: vec![1, 2, 3, 4, 5, 6, 7],
        base_price: 300_000,
        is_active: None,
    }
}

fn local_today(app: &TestApp) -> NaiveDate {
    let offset = app.state.config.local_offset().unwrap();
    Utc::now().with_timezone(&offset).date_naive()
}

#[tokio::test]
async fn test_pattern_generates_week_of_trips() {
    let app = TestApp::new().await;
    let r = app.create_route().await;
    let b = app.create_bus("51B-00001", 6, 2).await;
    let offset = app.state.config.local_offset().unwrap();

    let p = patterns::create_pattern(app.db(), pattern("Night coach", r.id, b.bus_type_id))
        .await
        .unwrap();
    assert_eq!(p.departure_times, vec!["08:00", "20:00"]);

    let start = local_today(&app) + Duration::days(1);
    let request = || GenerateRequest {
        from_date: start,
        to_date: start + Duration::days(6),
        bus_id: b.id,
        driver_id: None,
    };

    let report = patterns::generate_schedules(app.db(), p.id, request(), offset)
        .await
        .unwrap();
    assert_eq!(report.created.len(), 14);
    assert_eq!(report.skipped, 0);

    let detail = schedules::get_schedule(app.db(), report.created[0]).await.unwrap();
    assert!(detail.auto_generated);
    assert_eq!(detail.pattern_id, Some(p.id));
    assert_eq!(detail.trip.price, 300_000);
    assert_eq!(detail.total_seats, 6);
    assert_eq!(detail.available_seats, 6);

    // the bus is already busy at every one of those times
    let again = patterns::generate_schedules(app.db(), p.id, request(), offset)
        .await
        .unwrap();
    assert!(again.created.is_empty());
    assert_eq!(again.skipped, 14);

    let listed = schedules::list_schedules(
        app.db(),
        ScheduleFilter {
            route_id: None,
            status: None,
            pattern_id: Some(p.id),
        },
        Pagination {
            page: None,
            per_page: Some(5),
        },
    )
    .await
    .unwrap();
    assert_eq!(listed.total, 14);
    assert_eq!(listed.items.len(), 5);

    let err = patterns::delete_pattern(app.db(), p.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_generation_rejects_bad_requests() {
    let app = TestApp::new().await;
    let r = app.create_route().await;
    let b = app.create_bus("51B-00001", 6, 1).await;
    let other = app.create_bus("51B-00002", 6, 1).await;
    let offset = app.state.config.local_offset().unwrap();
    let start = local_today(&app) + Duration::days(1);

    let p = patterns::create_pattern(app.db(), pattern("Day coach", r.id, b.bus_type_id))
        .await
        .unwrap();

    let err = patterns::generate_schedules(
        app.db(),
        p.id,
        GenerateRequest {
            from_date: start,
            to_date: start,
            bus_id: other.id,
            driver_id: None,
        },
        offset,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = patterns::generate_schedules(
        app.db(),
        p.id,
        GenerateRequest {
            from_date: start,
            to_date: start + Duration::days(100),
            bus_id: b.id,
            driver_id: None,
        },
        offset,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let mut bad = pattern("Broken", r.id, b.bus_type_id);
    bad.departure_times = vec!["25:00".to_string()];
    assert!(matches!(
        patterns::create_pattern(app.db(), bad).await,
        Err(AppError::BadRequest(_))
    ));

    assert!(matches!(
        patterns::create_pattern(app.db(), pattern("Day coach", r.id, b.bus_type_id)).await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_route_deactivation_disables_patterns() {
    let app = TestApp::new().await;
    let r = app.create_route().await;
    let b = app.create_bus("51B-00001", 6, 1).await;
    let offset = app.state.config.local_offset().unwrap();

    let first = patterns::create_pattern(app.db(), pattern("Morning", r.id, b.bus_type_id))
        .await
        .unwrap();
    patterns::create_pattern(app.db(), pattern("Evening", r.id, b.bus_type_id))
        .await
        .unwrap();
    let mut dormant = pattern("Holiday", r.id, b.bus_type_id);
    dormant.is_active = Some(false);
    patterns::create_pattern(app.db(), dormant).await.unwrap();

    let change = routes::set_route_status(app.db(), r.id, false).await.unwrap();
    assert!(!change.route.is_active);
    assert_eq!(change.affected_patterns_count, 2);

    let still_active = schedule_pattern::Entity::find()
        .filter(schedule_pattern::Column::IsActive.eq(true))
        .count(app.db())
        .await
        .unwrap();
    assert_eq!(still_active, 0);

    let start = local_today(&app) + Duration::days(1);
    let err = patterns::generate_schedules(
        app.db(),
        first.id,
        GenerateRequest {
            from_date: start,
            to_date: start,
            bus_id: b.id,
            driver_id: None,
        },
        offset,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // reactivation does not bring the patterns back
    let change = routes::set_route_status(app.db(), r.id, true).await.unwrap();
    assert!(change.route.is_active);
    assert_eq!(change.affected_patterns_count, 0);
    assert!(!patterns::get_pattern(app.db(), first.id).await.unwrap().is_active);

    // inactive routes disappear from the public list
    routes::set_route_status(app.db(), r.id, false).await.unwrap();
    assert!(routes::list_routes(app.db(), false).await.unwrap().is_empty());
    assert_eq!(routes::list_routes(app.db(), true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_search_by_local_date() {
    let app = TestApp::new().await;
    let trip = app.create_trip("29B-11111", 4).await;
    let offset = app.state.config.local_offset().unwrap();
    let travel_day = trip.departure_time.with_timezone(&offset).date_naive();

    let search = |date: NaiveDate, arrival_province_id: i32| SearchQuery {
        departure_province_id: 1,
        arrival_province_id,
        date,
    };

    let found = schedules::search_schedules(app.db(), search(travel_day, 6), offset, Utc::now())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].trip.id, trip.id);
    assert_eq!(found[0].available_seats, 4);

    let seat_list = app.seats_of(trip.id).await;
    let customer = app.create_user("a@example.com").await;
    bookings::create_booking(
        app.db(),
        customer.id,
        NewBooking {
            schedule_id: trip.id,
            seat_ids: vec![seat_list[0].id],
            payment_method: None,
            pickup_stop_id: None,
            dropoff_stop_id: None,
            total_price: None,
        },
    )
    .await
    .unwrap();

    let found = schedules::search_schedules(app.db(), search(travel_day, 6), offset, Utc::now())
        .await
        .unwrap();
    assert_eq!(found[0].available_seats, 3);

    let next_day = travel_day + Duration::days(1);
    assert!(schedules::search_schedules(app.db(), search(next_day, 6), offset, Utc::now())
        .await
        .unwrap()
        .is_empty());
    assert!(schedules::search_schedules(app.db(), search(travel_day, 3), offset, Utc::now())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_schedule_with_bookings_is_protected() {
    let app = TestApp::new().await;
    let trip = app.create_trip("29B-11111", 4).await;
    let spare = app.create_trip("29B-22222", 4).await;
    let seat_list = app.seats_of(trip.id).await;
    let customer = app.create_user("a@example.com").await;

    bookings::create_booking(
        app.db(),
        customer.id,
        NewBooking {
            schedule_id: trip.id,
            seat_ids: vec![seat_list[0].id],
            payment_method: None,
            pickup_stop_id: None,
            dropoff_stop_id: None,
            total_price: None,
        },
    )
    .await
    .unwrap();

    let err = schedules::update_schedule(
        app.db(),
        trip.id,
        UpdateSchedule {
            driver_id: None,
            departure_time: None,
            price: None,
            status: Some(ScheduleStatus::Cancelled),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = schedules::delete_schedule(app.db(), trip.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    schedules::delete_schedule(app.db(), spare.id).await.unwrap();
    assert!(schedule::Entity::find_by_id(spare.id).one(app.db()).await.unwrap().is_none());
    assert!(app.seats_of(spare.id).await.is_empty());
}

#[tokio::test]
async fn test_moving_a_trip_keeps_the_bus_single_booked() {
    let app = TestApp::new().await;
    let r = app.create_route().await;
    let b = app.create_bus("51B-00001", 4, 1).await;
    let base = (Utc::now() + Duration::days(3))
        .duration_trunc(Duration::minutes(1))
        .unwrap();

    let trip = |departure_time| NewSchedule {
        route_id: r.id,
        bus_id: b.id,
        driver_id: None,
        departure_time,
        price: 200_000,
    };
    let morning = schedules::create_schedule(app.db(), trip(base)).await.unwrap();
    let evening = schedules::create_schedule(app.db(), trip(base + Duration::hours(12)))
        .await
        .unwrap();

    let move_to = |departure| UpdateSchedule {
        driver_id: None,
        departure_time: Some(departure),
        price: None,
        status: None,
    };

    let err = schedules::update_schedule(app.db(), evening.id, move_to(base))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // keeping its own slot is not a clash
    let same = schedules::update_schedule(app.db(), morning.id, move_to(base))
        .await
        .unwrap();
    assert_eq!(same.departure_time, base);

    let moved = schedules::update_schedule(app.db(), evening.id, move_to(base + Duration::hours(6)))
        .await
        .unwrap();
    assert_eq!(moved.departure_time, base + Duration::hours(6));
    assert_eq!(
        moved.arrival_time,
        base + Duration::hours(6) + Duration::minutes(1800)
    );
}
