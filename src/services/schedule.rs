use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::entities::schedule::{self, ScheduleStatus};
use crate::entities::{booking, booking_seat, bus, bus_type, driver, province, route, seat};
use crate::error::{AppError, AppResult};
use crate::response::{Page, Pagination};

// ============ Shared views ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvinceInfo {
    pub id: i32,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSummary {
    pub id: i32,
    pub departure_province: ProvinceInfo,
    pub arrival_province: ProvinceInfo,
    pub distance_km: f64,
    pub estimated_duration_minutes: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSummary {
    pub id: i32,
    pub license_plate: String,
    pub bus_type: String,
    pub seat_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripSummary {
    pub id: i32,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub price: i64,
    pub status: ScheduleStatus,
    pub route: RouteSummary,
    pub bus: BusSummary,
}

/// Small reference tables loaded once per request.
pub(crate) struct Catalog {
    provinces: HashMap<i32, province::Model>,
    bus_types: HashMap<i32, bus_type::Model>,
}

impl Catalog {
    pub(crate) async fn load<C: ConnectionTrait>(conn: &C) -> AppResult<Self> {
        let provinces = province::Entity::find()
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let bus_types = bus_type::Entity::find()
            .all(conn)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();
        Ok(Self { provinces, bus_types })
    }

    fn province(&self, id: i32) -> AppResult<ProvinceInfo> {
        self.provinces
            .get(&id)
            .map(|p| ProvinceInfo {
                id: p.id,
                name: p.name.clone(),
                code: p.code.clone(),
            })
            .ok_or_else(|| AppError::Internal(format!("Province {} not found", id)))
    }

    pub(crate) fn route_summary(&self, r: &route::Model) -> AppResult<RouteSummary> {
        Ok(RouteSummary {
            id: r.id,
            departure_province: self.province(r.departure_province_id)?,
            arrival_province: self.province(r.arrival_province_id)?,
            distance_km: r.distance_km,
            estimated_duration_minutes: r.estimated_duration_minutes,
            is_active: r.is_active,
        })
    }

    pub(crate) fn bus_summary(&self, b: &bus::Model) -> BusSummary {
        BusSummary {
            id: b.id,
            license_plate: b.license_plate.clone(),
            bus_type: self
                .bus_types
                .get(&b.bus_type_id)
                .map(|t| t.name.clone())
                .unwrap_or_default(),
            seat_count: b.seat_count,
        }
    }
}

/// Build trip summaries for a batch of schedules, keeping their order.
pub(crate) async fn load_trips<C: ConnectionTrait>(
    conn: &C,
    catalog: &Catalog,
    schedules: &[schedule::Model],
) -> AppResult<Vec<TripSummary>> {
    let route_ids: HashSet<i32> = schedules.iter().map(|s| s.route_id).collect();
    let bus_ids: HashSet<i32> = schedules.iter().map(|s| s.bus_id).collect();

    let routes: HashMap<i32, route::Model> = route::Entity::find()
        .filter(route::Column::Id.is_in(route_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();
    let buses: HashMap<i32, bus::Model> = bus::Entity::find()
        .filter(bus::Column::Id.is_in(bus_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|b| (b.id, b))
        .collect();

    schedules
        .iter()
        .map(|s| {
            let r = routes
                .get(&s.route_id)
                .ok_or_else(|| AppError::Internal("Route not found".to_string()))?;
            let b = buses
                .get(&s.bus_id)
                .ok_or_else(|| AppError::Internal("Bus not found".to_string()))?;
            Ok(TripSummary {
                id: s.id,
                departure_time: s.departure_time.with_timezone(&Utc),
                arrival_time: s.arrival_time.with_timezone(&Utc),
                price: s.price,
                status: s.status,
                route: catalog.route_summary(r)?,
                bus: catalog.bus_summary(b),
            })
        })
        .collect()
}

pub(crate) async fn load_trip<C: ConnectionTrait>(
    conn: &C,
    schedule: &schedule::Model,
) -> AppResult<TripSummary> {
    let catalog = Catalog::load(conn).await?;
    load_trips(conn, &catalog, std::slice::from_ref(schedule))
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("Trip summary missing".to_string()))
}

/// Enabled seats without an active holder, per schedule.
pub(crate) async fn available_seat_counts<C: ConnectionTrait>(
    conn: &C,
    schedule_ids: &[i32],
) -> AppResult<HashMap<i32, i64>> {
    let seats = seat::Entity::find()
        .filter(seat::Column::ScheduleId.is_in(schedule_ids.to_vec()))
        .filter(seat::Column::Enabled.eq(true))
        .all(conn)
        .await?;

    // booking_seat rows only exist while their booking is not cancelled
    let held: HashSet<i32> = booking_seat::Entity::find()
        .filter(booking_seat::Column::SeatId.is_in(seats.iter().map(|s| s.id).collect::<Vec<_>>()))
        .all(conn)
        .await?
        .into_iter()
        .map(|bs| bs.seat_id)
        .collect();

    let mut counts: HashMap<i32, i64> = schedule_ids.iter().map(|id| (*id, 0)).collect();
    for s in seats.iter().filter(|s| !held.contains(&s.id)) {
        *counts.entry(s.schedule_id).or_default() += 1;
    }
    Ok(counts)
}

// ============ Seat layout ============

/// Seat numbers and floor labels for a bus: `A01..` on floor 1 and, for
/// two-floor buses, `B01..` on floor 2 with the seats split evenly.
pub fn seat_layout(seat_count: i32, floors: i32) -> Vec<(String, String)> {
    let seat_count = seat_count.max(0);
    let floors = floors.clamp(1, 2);
    let lower = if floors == 2 { (seat_count + 1) / 2 } else { seat_count };
    let upper = seat_count - lower;

    let mut layout = Vec::with_capacity(seat_count as usize);
    for i in 1..=lower {
        layout.push((format!("A{:02}", i), "1".to_string()));
    }
    for i in 1..=upper {
        layout.push((format!("B{:02}", i), "2".to_string()));
    }
    layout
}

/// Everything needed to insert one trip and its seats.
pub(crate) struct TripPlan<'a> {
    pub route: &'a route::Model,
    pub bus: &'a bus::Model,
    pub floors: i32,
    pub driver_id: Option<i32>,
    pub departure: DateTime<Utc>,
    pub price: i64,
    pub pattern_id: Option<i32>,
}

pub(crate) async fn insert_trip<C: ConnectionTrait>(
    conn: &C,
    plan: TripPlan<'_>,
    now: DateTime<Utc>,
) -> AppResult<schedule::Model> {
    let arrival = plan.departure + Duration::minutes(plan.route.estimated_duration_minutes as i64);

    let created = schedule::ActiveModel {
        route_id: Set(plan.route.id),
        bus_id: Set(plan.bus.id),
        driver_id: Set(plan.driver_id),
        departure_time: Set(plan.departure.into()),
        arrival_time: Set(arrival.into()),
        price: Set(plan.price),
        status: Set(ScheduleStatus::Scheduled),
        pattern_id: Set(plan.pattern_id),
        auto_generated: Set(plan.pattern_id.is_some()),
        created_at: Set(now.into()),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    let seats: Vec<seat::ActiveModel> = seat_layout(plan.bus.seat_count, plan.floors)
        .into_iter()
        .map(|(seat_number, floor)| seat::ActiveModel {
            schedule_id: Set(created.id),
            seat_number: Set(seat_number),
            floor: Set(floor),
            enabled: Set(true),
            ..Default::default()
        })
        .collect();

    if !seats.is_empty() {
        seat::Entity::insert_many(seats).exec(conn).await?;
    }

    Ok(created)
}

/// True when the bus already runs a non-cancelled trip at `departure`,
/// ignoring the schedule `except` when it is the one being moved.
pub(crate) async fn bus_is_taken<C: ConnectionTrait>(
    conn: &C,
    bus_id: i32,
    departure: DateTime<Utc>,
    except: Option<i32>,
) -> AppResult<bool> {
    let departure: sea_orm::prelude::DateTimeWithTimeZone = departure.into();
    let mut finder = schedule::Entity::find()
        .filter(schedule::Column::BusId.eq(bus_id))
        .filter(schedule::Column::DepartureTime.eq(departure))
        .filter(schedule::Column::Status.ne(ScheduleStatus::Cancelled));
    if let Some(id) = except {
        finder = finder.filter(schedule::Column::Id.ne(id));
    }
    let count = finder.count(conn).await?;
    Ok(count > 0)
}

pub(crate) async fn active_bus_with_floors<C: ConnectionTrait>(
    conn: &C,
    bus_id: i32,
) -> AppResult<(bus::Model, i32)> {
    let (b, t) = bus::Entity::find_by_id(bus_id)
        .find_also_related(bus_type::Entity)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Bus not found".to_string()))?;

    if !b.is_active {
        return Err(AppError::BadRequest("Bus is inactive".to_string()));
    }
    if b.seat_count <= 0 {
        return Err(AppError::BadRequest("Bus has no seats".to_string()));
    }

    let floors = t.map(|t| t.floors).unwrap_or(1);
    Ok((b, floors))
}

pub(crate) async fn ensure_active_driver<C: ConnectionTrait>(
    conn: &C,
    driver_id: Option<i32>,
) -> AppResult<()> {
    if let Some(id) = driver_id {
        let d = driver::Entity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))?;
        if !d.is_active {
            return Err(AppError::BadRequest("Driver is inactive".to_string()));
        }
    }
    Ok(())
}

// ============ Admin operations ============

#[derive(Debug, Deserialize)]
pub struct NewSchedule {
    pub route_id: i32,
    pub bus_id: i32,
    pub driver_id: Option<i32>,
    pub departure_time: DateTime<Utc>,
    pub price: i64,
}

pub async fn create_schedule(
    db: &DatabaseConnection,
    payload: NewSchedule,
) -> AppResult<TripSummary> {
    let now = Utc::now();

    if payload.price <= 0 {
        return Err(AppError::BadRequest("Price must be positive".to_string()));
    }
    if payload.departure_time <= now {
        return Err(AppError::BadRequest(
            "Departure time must be in the future".to_string(),
        ));
    }

    let txn = db.begin().await?;

    let r = route::Entity::find_by_id(payload.route_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Route not found".to_string()))?;
    if !r.is_active {
        return Err(AppError::BadRequest("Route is inactive".to_string()));
    }

    let (b, floors) = active_bus_with_floors(&txn, payload.bus_id).await?;
    ensure_active_driver(&txn, payload.driver_id).await?;

    if bus_is_taken(&txn, b.id, payload.departure_time, None).await? {
        return Err(AppError::Conflict(
            "Bus already has a trip at this departure time".to_string(),
        ));
    }

    let created = insert_trip(
        &txn,
        TripPlan {
            route: &r,
            bus: &b,
            floors,
            driver_id: payload.driver_id,
            departure: payload.departure_time,
            price: payload.price,
            pattern_id: None,
        },
        now,
    )
    .await?;

    txn.commit().await?;

    tracing::info!(schedule_id = created.id, route_id = r.id, bus_id = b.id, "Schedule created");
    load_trip(db, &created).await
}

#[derive(Debug, Deserialize)]
pub struct UpdateSchedule {
    pub driver_id: Option<i32>,
    pub departure_time: Option<DateTime<Utc>>,
    pub price: Option<i64>,
    pub status: Option<ScheduleStatus>,
}

pub async fn update_schedule(
    db: &DatabaseConnection,
    id: i32,
    payload: UpdateSchedule,
) -> AppResult<TripSummary> {
    let txn = db.begin().await?;

    let existing = schedule::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))?;

    let mut active: schedule::ActiveModel = existing.clone().into();

    if let Some(price) = payload.price {
        if price <= 0 {
            return Err(AppError::BadRequest("Price must be positive".to_string()));
        }
        active.price = Set(price);
    }

    if payload.driver_id.is_some() {
        ensure_active_driver(&txn, payload.driver_id).await?;
        active.driver_id = Set(payload.driver_id);
    }

    if let Some(departure) = payload.departure_time {
        if departure <= Utc::now() {
            return Err(AppError::BadRequest(
                "Departure time must be in the future".to_string(),
            ));
        }
        if bus_is_taken(&txn, existing.bus_id, departure, Some(existing.id)).await? {
            return Err(AppError::Conflict(
                "Bus already has a trip at this departure time".to_string(),
            ));
        }
        let r = route::Entity::find_by_id(existing.route_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Route not found".to_string()))?;
        active.departure_time = Set(departure.into());
        active.arrival_time =
            Set((departure + Duration::minutes(r.estimated_duration_minutes as i64)).into());
    }

    if let Some(status) = payload.status {
        if status == ScheduleStatus::Cancelled {
            let active_bookings = booking::Entity::find()
                .filter(booking::Column::ScheduleId.eq(id))
                .filter(booking::Column::Status.ne(booking::BookingStatus::Cancelled))
                .count(&txn)
                .await?;
            if active_bookings > 0 {
                return Err(AppError::Conflict(format!(
                    "Cannot cancel schedule with {} active bookings",
                    active_bookings
                )));
            }
        }
        active.status = Set(status);
    }

    let updated = active.update(&txn).await?;
    txn.commit().await?;

    load_trip(db, &updated).await
}

pub async fn delete_schedule(db: &DatabaseConnection, id: i32) -> AppResult<()> {
    let txn = db.begin().await?;

    schedule::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))?;

    let bookings = booking::Entity::find()
        .filter(booking::Column::ScheduleId.eq(id))
        .count(&txn)
        .await?;
    if bookings > 0 {
        return Err(AppError::Conflict(
            "Cannot delete a schedule that has bookings".to_string(),
        ));
    }

    seat::Entity::delete_many()
        .filter(seat::Column::ScheduleId.eq(id))
        .exec(&txn)
        .await?;
    schedule::Entity::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ScheduleFilter {
    pub route_id: Option<i32>,
    pub status: Option<ScheduleStatus>,
    pub pattern_id: Option<i32>,
}

pub async fn list_schedules(
    db: &DatabaseConnection,
    filter: ScheduleFilter,
    pagination: Pagination,
) -> AppResult<Page<TripSummary>> {
    let (page, per_page, offset) = pagination.normalize();

    let mut finder = schedule::Entity::find();
    if let Some(route_id) = filter.route_id {
        finder = finder.filter(schedule::Column::RouteId.eq(route_id));
    }
    if let Some(status) = filter.status {
        finder = finder.filter(schedule::Column::Status.eq(status));
    }
    if let Some(pattern_id) = filter.pattern_id {
        finder = finder.filter(schedule::Column::PatternId.eq(pattern_id));
    }
    let finder = finder.order_by_desc(schedule::Column::DepartureTime);

    let total = finder.clone().count(db).await?;
    let schedules = finder.limit(per_page).offset(offset).all(db).await?;

    let catalog = Catalog::load(db).await?;
    let items = load_trips(db, &catalog, &schedules).await?;

    Ok(Page {
        items,
        page,
        per_page,
        total,
    })
}

// ============ Public queries ============

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub departure_province_id: i32,
    pub arrival_province_id: i32,
    pub date: NaiveDate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleListing {
    #[serde(flatten)]
    pub trip: TripSummary,
    pub available_seats: i64,
}

/// UTC bounds of a local calendar day.
pub fn local_day_bounds(
    date: NaiveDate,
    offset: FixedOffset,
) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    let start = offset
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()
        .ok_or_else(|| AppError::BadRequest("Invalid date".to_string()))?
        .with_timezone(&Utc);
    Ok((start, start + Duration::days(1)))
}

pub async fn search_schedules(
    db: &DatabaseConnection,
    query: SearchQuery,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> AppResult<Vec<ScheduleListing>> {
    let (day_start, day_end) = local_day_bounds(query.date, offset)?;
    let from = day_start.max(now);

    let route_ids: Vec<i32> = route::Entity::find()
        .filter(route::Column::DepartureProvinceId.eq(query.departure_province_id))
        .filter(route::Column::ArrivalProvinceId.eq(query.arrival_province_id))
        .filter(route::Column::IsActive.eq(true))
        .all(db)
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();

    if route_ids.is_empty() || from >= day_end {
        return Ok(Vec::new());
    }

    let from: sea_orm::prelude::DateTimeWithTimeZone = from.into();
    let until: sea_orm::prelude::DateTimeWithTimeZone = day_end.into();

    let schedules = schedule::Entity::find()
        .filter(schedule::Column::RouteId.is_in(route_ids))
        .filter(schedule::Column::Status.eq(ScheduleStatus::Scheduled))
        .filter(schedule::Column::DepartureTime.gt(from))
        .filter(schedule::Column::DepartureTime.lt(until))
        .order_by_asc(schedule::Column::DepartureTime)
        .all(db)
        .await?;

    let ids: Vec<i32> = schedules.iter().map(|s| s.id).collect();
    let available = available_seat_counts(db, &ids).await?;
    let catalog = Catalog::load(db).await?;

    Ok(load_trips(db, &catalog, &schedules)
        .await?
        .into_iter()
        .map(|trip| ScheduleListing {
            available_seats: available.get(&trip.id).copied().unwrap_or(0),
            trip,
        })
        .collect())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DriverSummary {
    pub id: i32,
    pub full_name: String,
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleDetail {
    #[serde(flatten)]
    pub trip: TripSummary,
    pub driver: Option<DriverSummary>,
    pub pattern_id: Option<i32>,
    pub auto_generated: bool,
    pub total_seats: u64,
    pub available_seats: i64,
}

pub async fn get_schedule(db: &DatabaseConnection, id: i32) -> AppResult<ScheduleDetail> {
    let s = schedule::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))?;

    let driver = match s.driver_id {
        Some(driver_id) => driver::Entity::find_by_id(driver_id)
            .one(db)
            .await?
            .map(|d| DriverSummary {
                id: d.id,
                full_name: d.full_name,
                phone: d.phone,
            }),
        None => None,
    };

    let total_seats = seat::Entity::find()
        .filter(seat::Column::ScheduleId.eq(id))
        .count(db)
        .await?;
    let available = available_seat_counts(db, &[id]).await?;

    Ok(ScheduleDetail {
        trip: load_trip(db, &s).await?,
        driver,
        pattern_id: s.pattern_id,
        auto_generated: s.auto_generated,
        total_seats,
        available_seats: available.get(&id).copied().unwrap_or(0),
    })
}
